//! Analysis handle for convenient API access

use crate::chroma::{detect_key, KeyEstimate};
use crate::config::AnalyzerConfig;
use crate::frame::{FeatureFrame, RawFrame};
use crate::framer::DEFAULT_FFT_SIZE;
use crate::live::LiveAnalysisState;
use crate::pitch::{PitchDetector, PitchResult};
use std::sync::Arc;

/// Read-side view of a running analysis engine.
///
/// Render and UI threads read the latest [`FeatureFrame`] from here without
/// blocking the analysis thread. Offline helpers run single components on a
/// buffer with the handle's configuration.
#[derive(Clone)]
pub struct AnalysisHandle {
    config: AnalyzerConfig,
    live: Option<Arc<LiveAnalysisState>>,
}

impl AnalysisHandle {
    /// Create a handle with no live state (offline helpers only)
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config, live: None }
    }

    /// Create a handle with live state attached
    pub fn with_live(config: AnalyzerConfig, live: Arc<LiveAnalysisState>) -> Self {
        Self {
            config,
            live: Some(live),
        }
    }

    /// Whether live analysis is attached.
    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    /// Whether the analysis thread is still accepting frames.
    pub fn is_running(&self) -> bool {
        self.live.as_ref().is_some_and(|state| state.is_running())
    }

    /// Latest successfully analysed frame.
    ///
    /// Returns the neutral frame if live analysis is not attached.
    pub fn latest_frame(&self) -> Arc<FeatureFrame> {
        match &self.live {
            Some(state) => state.latest.load_full(),
            None => Arc::new(FeatureFrame::neutral(0, 0.0)),
        }
    }

    pub fn ticks_processed(&self) -> u64 {
        self.live.as_ref().map_or(0, |state| state.ticks_processed())
    }

    pub fn ticks_failed(&self) -> u64 {
        self.live.as_ref().map_or(0, |state| state.ticks_failed())
    }

    /// Detect pitch on a PCM buffer with the configured base threshold
    pub fn detect_pitch(&self, samples: &[f32]) -> PitchResult {
        let pitch = &self.config.pitch;
        let mut detector = PitchDetector::new(self.config.sample_rate, pitch.buffer_size / 2);
        detector.set_threshold(pitch.base_threshold);
        detector.set_global_minimum_bound(pitch.global_minimum_bound);
        detector.detect(samples)
    }

    /// Detect pitch with minimum confidence threshold
    ///
    /// Only returns results with confidence >= min_confidence.
    pub fn detect_pitch_with_confidence(
        &self,
        samples: &[f32],
        min_confidence: f32,
    ) -> Option<PitchResult> {
        Some(self.detect_pitch(samples)).filter(|r| r.confidence >= min_confidence)
    }

    /// Estimate the key of a 12-bin chroma vector
    pub fn detect_key(&self, chroma: &[f32; 12]) -> KeyEstimate {
        detect_key(chroma, self.config.chroma.key_threshold)
    }

    /// Convert a PCM window into a frame at the configured sample rate
    pub fn frame_from_pcm(&self, samples: &[f32]) -> RawFrame {
        RawFrame::from_pcm(samples, self.config.sample_rate, DEFAULT_FFT_SIZE)
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }
}
