//! Per-tick orchestration.
//!
//! [`Analyzer`] owns one instance of every component and turns each
//! [`RawFrame`] into one [`FeatureFrame`], strictly in call order. The data
//! flow per tick is:
//!
//! ```text
//! spectrum ──► SpectralAnalyzer ──► bands ──► DynamicsNormalizer
//!          ├─► OnsetDetector ──► ODF ──► TempoTracker
//!          └─► ChromaKeyAnalyzer ◄── PitchTracker ◄── waveform
//! ```
//!
//! A panic inside one tick is caught at the tick boundary and reported as
//! [`Error::TickFailed`]; the analyzer stays usable.

use crate::chroma::{ChromaKeyAnalyzer, NoteObservation};
use crate::config::AnalyzerConfig;
use crate::dynamics::DynamicsNormalizer;
use crate::error::{Error, Result};
use crate::frame::{FeatureFrame, MelodicFeatures, MusicalContext, RawFrame, NO_NOTE};
use crate::onset::OnsetDetector;
use crate::pitch::PitchTracker;
use crate::spectral::{rms, SpectralAnalyzer};
use crate::tempo::{TempoReport, TempoTracker};
use std::panic::{self, AssertUnwindSafe};

/// Run one tick's computation, converting a panic into [`Error::TickFailed`].
pub fn run_guarded<T>(tick: u64, f: impl FnOnce() -> T) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        tracing::warn!(tick, %reason, "analysis tick failed");
        Error::TickFailed { tick, reason }
    })
}

/// The real-time analysis engine core.
pub struct Analyzer {
    config: AnalyzerConfig,
    spectral: SpectralAnalyzer,
    dynamics: DynamicsNormalizer,
    onset: OnsetDetector,
    tempo: TempoTracker,
    pitch: PitchTracker,
    chroma: ChromaKeyAnalyzer,
    next_tick: u64,
    last_sample_rate: Option<f32>,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        tracing::debug!(
            sample_rate = config.sample_rate,
            tick_rate = config.tick_rate,
            strategy = ?config.tempo.strategy,
            "analyzer created"
        );
        Ok(Self {
            spectral: SpectralAnalyzer::new(config.spectral.clone()),
            dynamics: DynamicsNormalizer::new(&config.dynamics),
            onset: OnsetDetector::new(config.onset.clone()),
            tempo: TempoTracker::new(config.tempo.clone(), config.tick_rate),
            pitch: PitchTracker::new(config.pitch.clone(), config.sample_rate),
            chroma: ChromaKeyAnalyzer::new(config.chroma.clone()),
            config,
            next_tick: 0,
            last_sample_rate: None,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Index the next processed frame will get.
    pub fn next_tick(&self) -> u64 {
        self.next_tick
    }

    /// Rhythm state after the latest tick, including candidates and beat times.
    pub fn tempo_report(&self) -> &TempoReport {
        self.tempo.report()
    }

    /// Clear every envelope, history, smoother and cache and restart the tick clock.
    pub fn reset(&mut self) {
        self.spectral.reset();
        self.dynamics.reset();
        self.onset.reset();
        self.tempo.reset();
        self.chroma.reset();
        self.next_tick = 0;
        self.last_sample_rate = None;
        tracing::debug!("analyzer reset");
    }

    /// Replace the configuration. All state is rebuilt from scratch.
    pub fn reconfigure(&mut self, config: AnalyzerConfig) -> Result<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    /// Rebuild for a new source sample rate.
    pub fn set_sample_rate(&mut self, sample_rate: f32) -> Result<()> {
        let config = AnalyzerConfig {
            sample_rate,
            ..self.config.clone()
        };
        self.reconfigure(config)
    }

    /// Analyse one frame. The tick clock advances even when the tick fails.
    pub fn process(&mut self, frame: &RawFrame) -> Result<FeatureFrame> {
        let tick = self.next_tick;
        self.next_tick += 1;
        let time = tick as f64 / self.config.tick_rate as f64;

        let mut features = run_guarded(tick, || self.compute(frame, tick, time))?;
        features.sanitize();
        Ok(features)
    }

    fn compute(&mut self, frame: &RawFrame, tick: u64, time: f64) -> FeatureFrame {
        if frame.is_degenerate(self.config.silence_floor) {
            return self.idle(frame, tick, time);
        }

        let sample_rate = frame.sample_rate;
        if self.last_sample_rate != Some(sample_rate) {
            tracing::debug!(sample_rate, bins = frame.spectrum.len(), "source layout changed");
            self.last_sample_rate = Some(sample_rate);
        }

        let snapshot = self.spectral.analyze(&frame.spectrum, sample_rate);
        let volume = rms(&frame.waveform);
        let dynamics = self.dynamics.process(snapshot.bands, snapshot.energy, time);
        if dynamics.drop_triggered {
            tracing::debug!(tick, intensity = dynamics.drop_intensity, "drop");
        }

        let odf = self.onset.process(&frame.spectrum, sample_rate);
        let rhythmic = self.tempo.update(odf).rhythmic();

        let pitch = self.pitch.track(
            &frame.waveform,
            &frame.spectrum,
            sample_rate,
            volume,
            snapshot.features.flux,
        );
        let label = pitch.note_name().filter(|_| pitch.is_voiced());
        let note = NoteObservation {
            frequency: if pitch.is_voiced() { pitch.frequency } else { 0.0 },
            confidence: pitch.confidence,
            label: label.as_deref(),
        };
        let chroma = self
            .chroma
            .analyze(&frame.spectrum, sample_rate, &snapshot.features, &note);

        FeatureFrame {
            tick,
            time,
            volume,
            energy: snapshot.energy,
            bands: snapshot.bands,
            dynamic_bands: dynamics.dynamic_bands,
            transients: dynamics.transients,
            drop_intensity: dynamics.drop_intensity,
            spectral: snapshot.features,
            melodic: MelodicFeatures {
                dominant_frequency: note.frequency,
                dominant_note: label.clone().unwrap_or_else(|| NO_NOTE.to_string()),
                note_confidence: if pitch.is_voiced() { pitch.confidence } else { 0.0 },
                harmonic_content: chroma.harmonic_content,
                pitch_class: chroma.pitch_class,
            },
            rhythmic,
            timbre: chroma.timbre,
            context: MusicalContext {
                note_present: pitch.is_voiced(),
                note_stability: chroma.note_stability,
                key: chroma.key.root,
                mode: chroma.key.mode,
                tension: chroma.tension,
            },
        }
    }

    /// Silence or unusable input: keep the flux caches and the tempo clock
    /// moving, report the neutral frame.
    fn idle(&mut self, frame: &RawFrame, tick: u64, time: f64) -> FeatureFrame {
        if frame.sample_rate.is_finite() && frame.sample_rate > 0.0 {
            self.spectral.analyze(&frame.spectrum, frame.sample_rate);
            self.onset.process(&frame.spectrum, frame.sample_rate);
        }
        self.tempo.update(0.0);
        self.dynamics.idle();
        FeatureFrame::neutral(tick, time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Mode;

    const SR: f32 = 44100.0;

    fn sine_frame(freq: f32, amplitude: f32) -> RawFrame {
        let waveform: Vec<f32> = (0..2048)
            .map(|i| amplitude * (2.0 * std::f32::consts::PI * freq * i as f32 / SR).sin())
            .collect();
        RawFrame::from_pcm(&waveform, SR, 2048)
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = AnalyzerConfig {
            tick_rate: 0.0,
            ..AnalyzerConfig::default()
        };
        assert!(matches!(
            Analyzer::new(config),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_silence_is_neutral() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
        let silent = RawFrame::new(vec![0.0; 1024], vec![0.0; 2048], SR);
        for tick in 0..5 {
            let frame = analyzer.process(&silent).unwrap();
            assert_eq!(frame, FeatureFrame::neutral(tick, tick as f64 / 30.0));
            assert_eq!(frame.context.mode, Mode::Unknown);
        }
        let empty = analyzer.process(&RawFrame::default()).unwrap();
        assert_eq!(empty.tick, 5);
        assert_eq!(empty.volume, 0.0);
    }

    #[test]
    fn test_sine_frame() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
        let frame = analyzer.process(&sine_frame(440.0, 0.8)).unwrap();
        assert!(frame.volume > 0.5);
        assert!(frame.energy > 0.0);
        assert!(frame.context.note_present);
        assert_eq!(frame.melodic.dominant_note, "A4");
        assert!((frame.melodic.dominant_frequency - 440.0).abs() < 4.4);
        let loudest = frame
            .melodic
            .pitch_class
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);
        assert_eq!(loudest, Some(9));
        assert_eq!(frame.timbre.dominant_chroma, 9);
        assert_eq!(frame.rhythmic.bpm, 0.0);
    }

    #[test]
    fn test_reset_restarts_clock() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
        for _ in 0..3 {
            analyzer.process(&sine_frame(220.0, 0.5)).unwrap();
        }
        assert_eq!(analyzer.next_tick(), 3);
        analyzer.reset();
        assert_eq!(analyzer.next_tick(), 0);
        assert_eq!(analyzer.process(&sine_frame(220.0, 0.5)).unwrap().tick, 0);
    }

    #[test]
    fn test_set_sample_rate() {
        let mut analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
        analyzer.set_sample_rate(48000.0).unwrap();
        assert_eq!(analyzer.config().sample_rate, 48000.0);
        assert!(analyzer.set_sample_rate(-1.0).is_err());
        // A rejected rate leaves the previous configuration in place
        assert_eq!(analyzer.config().sample_rate, 48000.0);
    }

    #[test]
    fn test_guard_catches_panics() {
        let result: Result<()> = run_guarded(7, || panic!("boom"));
        assert_eq!(
            result,
            Err(Error::TickFailed {
                tick: 7,
                reason: "boom".into()
            })
        );
        assert_eq!(run_guarded(8, || 42), Ok(42));
    }
}
