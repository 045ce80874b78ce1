//! # Auralis Analysis
//!
//! Real-time music information retrieval for audio-reactive applications.
//!
//! Each analysis tick turns one [`RawFrame`] (a magnitude spectrum plus a
//! waveform snapshot) into one [`FeatureFrame`]:
//! - **Bands and spectral shape**: bass/mid/treble, centroid, spread, rolloff, flux
//! - **Dynamics**: adaptive band normalization, transient flags, drop detection
//! - **Onsets**: Mel-band median spectral flux
//! - **Tempo**: tempogram and autocorrelation estimators, DP beat tracking, beat phase, subdivision
//! - **Pitch**: YIN with adaptive threshold and a spectral-peak fallback
//! - **Harmony and timbre**: chroma, Krumhansl–Schmuckler key, tension, note stability
//!
//! All components are plain structs that own their state; [`Analyzer`] owns one
//! of each and processes ticks strictly in order. With the `live` feature the
//! analyzer runs on a worker thread fed by a channel or a PCM ring buffer.
//!
//! ## Example
//!
//! ```rust
//! use auralis_analysis::{Analyzer, AnalyzerConfig, RawFrame};
//!
//! let sample_rate = 44100.0;
//! let pcm: Vec<f32> = (0..2048)
//!     .map(|i| (2.0 * std::f32::consts::PI * 440.0 * i as f32 / sample_rate).sin())
//!     .collect();
//!
//! let mut analyzer = Analyzer::new(AnalyzerConfig::default()).unwrap();
//! let frame = analyzer.process(&RawFrame::from_pcm(&pcm, sample_rate, 2048)).unwrap();
//! assert_eq!(frame.melodic.dominant_note, "A4");
//! ```

pub mod analyzer;
pub mod chroma;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod frame;
pub mod framer;
pub mod history;
pub mod onset;
pub mod pitch;
pub mod spectral;
pub mod tempo;

#[cfg(feature = "live")]
pub mod live;

#[cfg(feature = "live")]
mod handle;

pub use analyzer::{run_guarded, Analyzer};
pub use chroma::{detect_key, ChromaKeyAnalyzer, ChromaSnapshot, KeyEstimate, NoteObservation};
pub use config::{
    AnalyzerConfig, ChromaConfig, DropConfig, DynamicsConfig, EnvelopeConfig, OnsetConfig,
    PitchConfig, SpectralConfig, TempoConfig, TempoStrategy, TransientConfig,
};
pub use dynamics::{
    AdaptiveEnvelope, DropDetector, DynamicsNormalizer, DynamicsSnapshot, TransientDetector,
};
pub use error::{Error, Result};
pub use frame::{
    BandLevels, FeatureFrame, MelodicFeatures, Mode, MusicalContext, PitchClass, RawFrame,
    RhythmicFeatures, SpectralFeatures, TimbreProfile, Transients, NO_NOTE,
};
pub use framer::{SpectrumFramer, DEFAULT_FFT_SIZE};
pub use history::History;
pub use onset::{MelFilterbank, OnsetDetector};
pub use pitch::{
    freq_to_midi, midi_to_freq, note_name, PitchDetector, PitchResult, PitchSource, PitchTracker,
};
pub use spectral::{SpectralAnalyzer, SpectralSnapshot};
pub use tempo::{
    AutocorrelationEstimator, EstimatorContext, TempoCandidate, TempoEstimate, TempoEstimator,
    TempoReport, TempoTracker, TempogramEstimator,
};

#[cfg(feature = "live")]
pub use handle::AnalysisHandle;
#[cfg(feature = "live")]
pub use live::{
    run_analysis_thread, run_tap_thread, AnalysisCommand, LiveAnalysisState, TapConfig,
    TickOutput,
};
