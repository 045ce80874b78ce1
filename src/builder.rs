//! Builder for configuring and constructing an `AuralisEngine`.

use crate::analysis::{
    Analyzer, AnalyzerConfig, DynamicsConfig, LiveAnalysisState, TempoStrategy,
};
use crate::{AuralisEngine, Result};
use std::sync::Arc;

/// Every setting starts at the [`AnalyzerConfig`] default; the configuration
/// is validated when [`build`](Self::build) runs, before any thread is spawned.
///
/// # Example
///
/// ```no_run
/// use auralis::prelude::*;
///
/// let engine = AuralisEngine::builder()
///     .sample_rate(48000.0)
///     .tick_rate(60.0)
///     .bpm_range(80.0, 160.0)
///     .build()?;
///
/// let frame = engine.latest();
/// # Ok::<(), auralis::Error>(())
/// ```
pub struct AuralisEngineBuilder {
    config: AnalyzerConfig,
    queue_capacity: usize,
    result_capacity: usize,
}

impl Default for AuralisEngineBuilder {
    fn default() -> Self {
        Self {
            config: AnalyzerConfig::default(),
            queue_capacity: 64,
            result_capacity: 256,
        }
    }
}

impl AuralisEngineBuilder {
    /// Replace the whole analysis configuration.
    pub fn config(mut self, config: AnalyzerConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: 44100
    pub fn sample_rate(mut self, sample_rate: f32) -> Self {
        self.config.sample_rate = sample_rate;
        self
    }

    /// Default: 30
    pub fn tick_rate(mut self, tick_rate: f32) -> Self {
        self.config.tick_rate = tick_rate;
        self
    }

    /// Samples handed to YIN per tick. Default: 2048
    pub fn pitch_buffer_size(mut self, size: usize) -> Self {
        self.config.pitch.buffer_size = size;
        self
    }

    /// Default: 0.1
    pub fn base_threshold(mut self, threshold: f32) -> Self {
        self.config.pitch.base_threshold = threshold;
        self
    }

    /// Default: 40
    pub fn mel_bands(mut self, bands: usize) -> Self {
        self.config.onset.mel_bands = bands;
        self
    }

    /// Default: 70..190
    pub fn bpm_range(mut self, min_bpm: f32, max_bpm: f32) -> Self {
        self.config.tempo.min_bpm = min_bpm;
        self.config.tempo.max_bpm = max_bpm;
        self
    }

    /// ODF history length in ticks. Default: 256
    pub fn odf_capacity(mut self, capacity: usize) -> Self {
        self.config.tempo.odf_capacity = capacity;
        self
    }

    pub fn tempo_strategy(mut self, strategy: TempoStrategy) -> Self {
        self.config.tempo.strategy = strategy;
        self
    }

    /// Envelope, per-band transient and drop tuning.
    pub fn dynamics(mut self, dynamics: DynamicsConfig) -> Self {
        self.config.dynamics = dynamics;
        self
    }

    /// Frames that may wait for the analysis thread. Default: 64
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Tick outputs kept for `recv`; older uncollected outputs are dropped. Default: 256
    pub fn result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity.max(1);
        self
    }

    pub fn build(self) -> Result<AuralisEngine> {
        let analyzer = Analyzer::new(self.config.clone())?;

        let (command_tx, command_rx) = crossbeam_channel::bounded(self.queue_capacity);
        let (result_tx, result_rx) = crossbeam_channel::bounded(self.result_capacity);
        let state = Arc::new(LiveAnalysisState::new());
        let state2 = Arc::clone(&state);

        let worker = std::thread::Builder::new()
            .name("auralis-analysis".into())
            .spawn(move || {
                crate::analysis::run_analysis_thread(command_rx, result_tx, state2, analyzer);
            })?;

        tracing::debug!(
            sample_rate = self.config.sample_rate,
            tick_rate = self.config.tick_rate,
            queue = self.queue_capacity,
            "engine started"
        );

        Ok(AuralisEngine::from_parts(
            self.config,
            command_tx,
            result_rx,
            state,
            worker,
        ))
    }
}
