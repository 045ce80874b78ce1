//! Live analysis worker.
//!
//! The analyzer runs on its own thread and is driven by an ordered command
//! channel: every [`AnalysisCommand::Frame`] becomes exactly one tick, in the
//! order it was sent. Results go back on a second channel, and the latest
//! successful frame is published via `ArcSwap` for lock-free reads from the
//! render thread.
//!
//! Hosts that only have PCM can feed a SPSC ring buffer from the audio
//! callback; [`run_tap_thread`] turns it into frames at the tick rate.

use crate::analyzer::Analyzer;
use crate::config::AnalyzerConfig;
use crate::error::Result;
use crate::frame::{FeatureFrame, RawFrame};
use crate::framer::{SpectrumFramer, DEFAULT_FFT_SIZE};
use arc_swap::ArcSwap;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use ringbuf::{
    traits::{Consumer, Observer},
    HeapCons,
};
use std::sync::Arc;

/// Work items for the analysis thread, processed strictly in FIFO order.
#[derive(Debug, Clone)]
pub enum AnalysisCommand {
    /// Analyse one frame (one tick).
    Frame(RawFrame),
    /// Clear all analysis state and restart the tick clock.
    Reset,
    /// Replace the configuration; state is rebuilt.
    Configure(AnalyzerConfig),
    /// The source sample rate changed.
    SetSampleRate(f32),
    /// Stop the thread. Commands queued behind this one are discarded.
    Shutdown,
}

/// Outcome of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub tick: u64,
    pub result: Result<FeatureFrame>,
}

/// Shared state between the analysis thread and `AnalysisHandle`.
///
/// All fields are lock-free for reads from any thread.
pub struct LiveAnalysisState {
    /// Latest successfully analysed frame.
    pub latest: ArcSwap<FeatureFrame>,
    ticks: AtomicU64,
    failed: AtomicU64,
    /// Set to false to signal the worker threads to stop.
    running: AtomicBool,
    /// Framing parameters the PCM tap follows.
    tap: ArcSwap<TapConfig>,
}

impl Default for LiveAnalysisState {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveAnalysisState {
    /// Create new state holding the neutral frame.
    pub fn new() -> Self {
        Self {
            latest: ArcSwap::from_pointee(FeatureFrame::neutral(0, 0.0)),
            ticks: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            running: AtomicBool::new(true),
            tap: ArcSwap::from_pointee(TapConfig::from_analyzer(&AnalyzerConfig::default())),
        }
    }

    /// Current framing parameters of the PCM tap.
    pub fn tap_config(&self) -> TapConfig {
        **self.tap.load()
    }

    /// Change the PCM tap's framing. The tap picks it up before framing the
    /// next samples it drains, discarding its window.
    pub fn set_tap_config(&self, config: TapConfig) {
        self.tap.store(Arc::new(config));
    }

    /// Signal the worker threads to stop.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Check if the worker threads should keep running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ticks processed since start, failed ones included.
    pub fn ticks_processed(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn ticks_failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    fn record(&self, output: &TickOutput) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        match &output.result {
            Ok(frame) => self.latest.store(Arc::new(frame.clone())),
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// Run the analysis loop.
///
/// Blocks until a [`AnalysisCommand::Shutdown`] arrives, `state.stop()` is
/// called, or every command sender is dropped. Tick outputs nobody collects
/// are dropped once `results` is full; [`LiveAnalysisState::latest`] is
/// always updated.
pub fn run_analysis_thread(
    commands: Receiver<AnalysisCommand>,
    results: Sender<TickOutput>,
    state: Arc<LiveAnalysisState>,
    mut analyzer: Analyzer,
) {
    tracing::debug!("analysis thread started");

    while state.is_running() {
        let Ok(command) = commands.recv() else {
            break;
        };

        match command {
            AnalysisCommand::Frame(frame) => {
                // A stop request discards whatever is still queued
                if !state.is_running() {
                    break;
                }
                let tick = analyzer.next_tick();
                let output = TickOutput {
                    tick,
                    result: analyzer.process(&frame),
                };
                state.record(&output);
                match results.try_send(output) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::trace!(tick, "result queue full, output dropped");
                    }
                    Err(TrySendError::Disconnected(_)) => {}
                }
            }
            AnalysisCommand::Reset => {
                analyzer.reset();
                state.latest.store(Arc::new(FeatureFrame::neutral(0, 0.0)));
            }
            AnalysisCommand::Configure(config) => {
                if let Err(e) = analyzer.reconfigure(config) {
                    tracing::warn!(error = %e, "configuration rejected");
                }
            }
            AnalysisCommand::SetSampleRate(sample_rate) => {
                if let Err(e) = analyzer.set_sample_rate(sample_rate) {
                    tracing::warn!(error = %e, "sample rate rejected");
                }
            }
            AnalysisCommand::Shutdown => break,
        }
    }

    state.stop();
    tracing::debug!(
        ticks = state.ticks_processed(),
        failed = state.ticks_failed(),
        "analysis thread stopped"
    );
}

/// Framing parameters for [`run_tap_thread`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapConfig {
    pub sample_rate: f32,
    pub tick_rate: f32,
    pub fft_size: usize,
    /// Samples copied into each frame's waveform.
    pub waveform_len: usize,
}

impl TapConfig {
    pub fn from_analyzer(config: &AnalyzerConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            tick_rate: config.tick_rate,
            fft_size: DEFAULT_FFT_SIZE,
            waveform_len: config.pitch.buffer_size,
        }
    }

    /// Samples between two emitted frames.
    pub fn hop(&self) -> usize {
        ((self.sample_rate / self.tick_rate).round() as usize).max(1)
    }
}

/// Sliding window of mono samples framed at one [`TapConfig`].
struct TapWindow {
    config: TapConfig,
    framer: SpectrumFramer,
    hop: usize,
    samples: Vec<f32>,
    pos: usize,
    hop_counter: usize,
    contiguous: Vec<f32>,
}

impl TapWindow {
    fn new(config: TapConfig) -> Self {
        let framer = SpectrumFramer::new(config.fft_size, config.waveform_len);
        let size = framer.history_len();
        Self {
            config,
            framer,
            hop: config.hop(),
            samples: vec![0.0; size],
            pos: 0,
            hop_counter: 0,
            contiguous: Vec::with_capacity(size),
        }
    }

    /// Push one sample; returns a frame every `hop` samples.
    fn push(&mut self, sample: f32) -> Option<RawFrame> {
        let size = self.samples.len();
        self.samples[self.pos % size] = sample;
        self.pos += 1;
        self.hop_counter += 1;

        if self.hop_counter < self.hop {
            return None;
        }
        self.hop_counter = 0;

        // Reconstruct contiguous window from circular buffer
        self.contiguous.clear();
        if self.pos >= size {
            let start = self.pos % size;
            self.contiguous.extend_from_slice(&self.samples[start..]);
            self.contiguous.extend_from_slice(&self.samples[..start]);
        } else {
            self.contiguous.extend_from_slice(&self.samples[..self.pos]);
        }

        Some(self.framer.frame(&self.contiguous, self.config.sample_rate))
    }
}

/// Run the PCM tap loop.
///
/// Drains stereo pairs from `consumer`, downmixes to mono and posts one
/// [`RawFrame`] per hop into `commands`, framed with
/// [`LiveAnalysisState::tap_config`]. A full command queue drops the frame
/// rather than stalling the tap. Blocks until `state.stop()` is called or the
/// command receiver is gone.
pub fn run_tap_thread(
    mut consumer: HeapCons<(f32, f32)>,
    commands: Sender<AnalysisCommand>,
    state: Arc<LiveAnalysisState>,
) {
    let mut window = TapWindow::new(state.tap_config());
    let mut drain_buf = [(0.0f32, 0.0f32); 1024];

    tracing::debug!(
        hop = window.hop,
        window_size = window.samples.len(),
        "audio tap started"
    );

    while state.is_running() {
        let available = consumer.occupied_len();

        if available == 0 {
            std::thread::sleep(std::time::Duration::from_millis(5));
            continue;
        }

        let to_read = available.min(drain_buf.len());
        let read = consumer.pop_slice(&mut drain_buf[..to_read]);

        // Checked after popping so samples pushed after a rate change are
        // never framed at the old rate
        let config = state.tap_config();
        if config != window.config {
            tracing::debug!(
                sample_rate = config.sample_rate,
                hop = config.hop(),
                "audio tap reframed"
            );
            window = TapWindow::new(config);
        }

        for &(l, r) in &drain_buf[..read] {
            let Some(frame) = window.push((l + r) * 0.5) else {
                continue;
            };
            match commands.try_send(AnalysisCommand::Frame(frame)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("analysis queue full, tap frame dropped");
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::debug!("audio tap stopped, analysis thread gone");
                    return;
                }
            }
        }
    }

    tracing::debug!("audio tap stopped");
}
