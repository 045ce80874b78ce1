//! AuralisEngine that owns the analysis thread

use crate::analysis::{
    run_tap_thread, AnalysisCommand, AnalysisHandle, AnalyzerConfig, Error as AnalysisError,
    FeatureFrame, LiveAnalysisState, RawFrame, TapConfig, TickOutput,
};
use crate::{AuralisEngineBuilder, Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use ringbuf::{traits::Split, HeapProd, HeapRb};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Real-time analysis engine.
///
/// Frames posted with [`submit`](Self::submit) are analysed on a dedicated
/// thread in the order they were posted; one [`TickOutput`] per frame comes
/// back through [`recv`](Self::recv), and the latest frame is always
/// available from [`latest`](Self::latest) without blocking.
///
/// Dropping the engine stops the thread. Frames still queued at that point
/// are discarded.
///
/// # Example
///
/// ```no_run
/// use auralis::prelude::*;
///
/// let engine = AuralisEngine::builder().build()?;
///
/// let pcm = vec![0.0f32; 2048];
/// engine.submit(RawFrame::from_pcm(&pcm, 44100.0, 2048))?;
///
/// let output = engine.recv()?;
/// println!("tick {}: {:?}", output.tick, output.result.map(|f| f.rhythmic.bpm));
/// # Ok::<(), auralis::Error>(())
/// ```
pub struct AuralisEngine {
    config: Mutex<AnalyzerConfig>,
    commands: Sender<AnalysisCommand>,
    results: Receiver<TickOutput>,
    state: Arc<LiveAnalysisState>,
    worker: Mutex<Option<JoinHandle<()>>>,
    tap: Mutex<Option<JoinHandle<()>>>,
}

impl AuralisEngine {
    pub fn builder() -> AuralisEngineBuilder {
        AuralisEngineBuilder::default()
    }

    /// Configuration the analysis thread is running with (or will be, once
    /// queued commands are processed).
    pub fn config(&self) -> AnalyzerConfig {
        self.config.lock().clone()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Post a frame without blocking.
    ///
    /// Returns `QueueFull` when the analysis thread is behind; the frame is
    /// dropped and the caller keeps going.
    pub fn submit(&self, frame: RawFrame) -> Result<()> {
        if !self.is_running() {
            return Err(AnalysisError::Disconnected.into());
        }
        match self.commands.try_send(AnalysisCommand::Frame(frame)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                tracing::warn!("analysis queue full, frame dropped");
                Err(AnalysisError::QueueFull.into())
            }
            Err(TrySendError::Disconnected(_)) => Err(AnalysisError::Disconnected.into()),
        }
    }

    /// Post a frame, waiting for queue space. For offline feeding.
    pub fn submit_blocking(&self, frame: RawFrame) -> Result<()> {
        self.send(AnalysisCommand::Frame(frame))
    }

    /// Wait for the next tick output.
    pub fn recv(&self) -> Result<TickOutput> {
        self.results
            .recv()
            .map_err(|_| AnalysisError::Disconnected.into())
    }

    /// Wait up to `timeout` for the next tick output.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<TickOutput>> {
        match self.results.recv_timeout(timeout) {
            Ok(output) => Ok(Some(output)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(AnalysisError::Disconnected.into()),
        }
    }

    pub fn try_recv(&self) -> Option<TickOutput> {
        self.results.try_recv().ok()
    }

    /// Collect every tick output currently waiting.
    pub fn drain(&self) -> Vec<TickOutput> {
        self.results.try_iter().collect()
    }

    /// Latest successfully analysed frame.
    pub fn latest(&self) -> Arc<FeatureFrame> {
        self.state.latest.load_full()
    }

    /// Read-side handle for render/UI threads.
    pub fn analysis(&self) -> AnalysisHandle {
        AnalysisHandle::with_live(self.config(), Arc::clone(&self.state))
    }

    /// Clear all analysis state, e.g. when the audio source changes.
    ///
    /// Ordered with frames: frames posted before the reset are analysed with
    /// the old state, frames posted after start from scratch at tick 0.
    pub fn reset(&self) -> Result<()> {
        self.send(AnalysisCommand::Reset)
    }

    /// Replace the configuration. All analysis state is rebuilt.
    pub fn configure(&self, config: AnalyzerConfig) -> Result<()> {
        config.validate()?;
        self.send(AnalysisCommand::Configure(config.clone()))?;
        self.state.set_tap_config(TapConfig::from_analyzer(&config));
        *self.config.lock() = config;
        Ok(())
    }

    /// The source sample rate changed. All analysis state is rebuilt.
    pub fn set_sample_rate(&self, sample_rate: f32) -> Result<()> {
        let config = AnalyzerConfig {
            sample_rate,
            ..self.config()
        };
        config.validate()?;
        self.send(AnalysisCommand::SetSampleRate(sample_rate))?;
        self.state.set_tap_config(TapConfig::from_analyzer(&config));
        *self.config.lock() = config;
        Ok(())
    }

    /// Start framing raw PCM into the analysis queue.
    ///
    /// Returns the producer side of a ring buffer of stereo pairs holding
    /// `capacity` pairs. Push from the audio callback; a background thread
    /// emits one frame per tick. It follows later [`configure`](Self::configure)
    /// and [`set_sample_rate`](Self::set_sample_rate) calls, so samples pushed
    /// after a rate change are framed at the new rate.
    pub fn enable_audio_tap(&self, capacity: usize) -> Result<HeapProd<(f32, f32)>> {
        let mut guard = self.tap.lock();
        if guard.is_some() {
            return Err(Error::TapAlreadyEnabled);
        }
        if !self.is_running() {
            return Err(AnalysisError::Disconnected.into());
        }

        let (producer, consumer) = HeapRb::<(f32, f32)>::new(capacity.max(1)).split();
        self.state.set_tap_config(TapConfig::from_analyzer(&self.config()));
        let commands = self.commands.clone();
        let state = Arc::clone(&self.state);

        let handle = std::thread::Builder::new()
            .name("auralis-tap".into())
            .spawn(move || {
                run_tap_thread(consumer, commands, state);
            })?;

        *guard = Some(handle);
        Ok(producer)
    }

    /// Stop the analysis thread and the audio tap. Queued frames are discarded.
    pub fn shutdown(&self) {
        self.state.stop();
        // Wakes a worker blocked on an empty queue; a full queue is
        // abandoned at the next frame anyway
        let _ = self.commands.try_send(AnalysisCommand::Shutdown);

        if let Some(handle) = self.tap.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker.lock().take() {
            let _ = handle.join();
            tracing::debug!(
                ticks = self.state.ticks_processed(),
                failed = self.state.ticks_failed(),
                "engine stopped"
            );
        }
    }

    fn send(&self, command: AnalysisCommand) -> Result<()> {
        if !self.is_running() {
            return Err(AnalysisError::Disconnected.into());
        }
        self.commands
            .send(command)
            .map_err(|_| AnalysisError::Disconnected.into())
    }

    /// Internal: create engine from builder
    pub(crate) fn from_parts(
        config: AnalyzerConfig,
        commands: Sender<AnalysisCommand>,
        results: Receiver<TickOutput>,
        state: Arc<LiveAnalysisState>,
        worker: JoinHandle<()>,
    ) -> Self {
        Self {
            config: Mutex::new(config),
            commands,
            results,
            state,
            worker: Mutex::new(Some(worker)),
            tap: Mutex::new(None),
        }
    }
}

impl Drop for AuralisEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
