//! Analysis configuration.
//!
//! Every tuning constant of the pipeline lives here as a named field, grouped
//! per component, so adaptive-filter behaviour can be audited and tested in
//! isolation. `Default` gives the tuning used in production.

use crate::error::{Error, Result};

/// Top-level configuration for an [`Analyzer`](crate::Analyzer).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct AnalyzerConfig {
    /// Expected source sample rate in Hz. Frames carrying a different rate
    /// trigger a rebuild of sample-rate dependent state.
    pub sample_rate: f32,
    /// Analysis ticks per second (default: 30).
    pub tick_rate: f32,
    /// Peak spectrum magnitude and peak waveform amplitude below which a
    /// frame is treated as silence.
    pub silence_floor: f32,
    pub spectral: SpectralConfig,
    pub dynamics: DynamicsConfig,
    pub onset: OnsetConfig,
    pub tempo: TempoConfig,
    pub pitch: PitchConfig,
    pub chroma: ChromaConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100.0,
            tick_rate: 30.0,
            silence_floor: 1e-4,
            spectral: SpectralConfig::default(),
            dynamics: DynamicsConfig::default(),
            onset: OnsetConfig::default(),
            tempo: TempoConfig::default(),
            pitch: PitchConfig::default(),
            chroma: ChromaConfig::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Check the configuration for values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if !(self.tick_rate.is_finite() && self.tick_rate > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "tick rate must be positive, got {}",
                self.tick_rate
            )));
        }
        let tempo = &self.tempo;
        if tempo.min_bpm <= 0.0 || tempo.max_bpm <= tempo.min_bpm {
            return Err(Error::InvalidConfig(format!(
                "invalid BPM range: {}..{}",
                tempo.min_bpm, tempo.max_bpm
            )));
        }
        if tempo.odf_capacity == 0 || tempo.bpm_history == 0 || tempo.confidence_history == 0 {
            return Err(Error::InvalidConfig(
                "tempo history capacities must be non-zero".into(),
            ));
        }
        if tempo.min_history > tempo.odf_capacity {
            return Err(Error::InvalidConfig(format!(
                "min tempo history {} exceeds ODF capacity {}",
                tempo.min_history, tempo.odf_capacity
            )));
        }
        if self.onset.mel_bands == 0 {
            return Err(Error::InvalidConfig("mel band count must be non-zero".into()));
        }
        if self.pitch.buffer_size < 64 {
            return Err(Error::InvalidConfig(format!(
                "pitch buffer must hold at least 64 samples, got {}",
                self.pitch.buffer_size
            )));
        }
        if self.chroma.stability_window == 0 {
            return Err(Error::InvalidConfig("stability window must be non-zero".into()));
        }
        Ok(())
    }

    /// Duration of one tick in seconds.
    pub fn tick_seconds(&self) -> f64 {
        1.0 / self.tick_rate as f64
    }
}

/// Band edges and spectral-shape scaling.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SpectralConfig {
    /// Upper edge of the bass band (default: 250 Hz).
    pub bass_cutoff_hz: f32,
    /// Upper edge of the mid band (default: 4000 Hz).
    pub treble_cutoff_hz: f32,
    /// Cumulative-energy fraction that defines rolloff (default: 0.85).
    pub rolloff_fraction: f32,
    /// Gain applied to the median positive flux before clamping (default: 10).
    pub flux_scale: f32,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            bass_cutoff_hz: 250.0,
            treble_cutoff_hz: 4000.0,
            rolloff_fraction: 0.85,
            flux_scale: 10.0,
        }
    }
}

/// Adaptive min/max envelope rates.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct EnvelopeConfig {
    /// Blend rate toward a new extreme (default: 0.3).
    pub attack: f32,
    /// Per-tick decay of `max` toward `release_floor` (default: 0.01).
    pub release: f32,
    /// Level `max` decays toward when the signal stays below it (default: 0.1).
    pub release_floor: f32,
    /// Per-tick creep of `min` toward the signal (default: 0.002).
    pub creep: f32,
    /// Constant added to `min` on every creep step (default: 0.0005).
    pub creep_threshold: f32,
    /// Highest value `min` may take (default: 0.9).
    pub min_ceiling: f32,
    /// Minimum distance kept between `min` and `max` (default: 0.1).
    pub min_range: f32,
    /// Range below which values pass through un-normalized (default: 0.01).
    pub active_range: f32,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            attack: 0.3,
            release: 0.01,
            release_floor: 0.1,
            creep: 0.002,
            creep_threshold: 0.0005,
            min_ceiling: 0.9,
            min_range: 0.1,
            active_range: 0.01,
        }
    }
}

/// Per-register transient detector tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TransientConfig {
    /// Absolute floor of the adaptive threshold.
    pub threshold: f32,
    /// Multiplier applied to the rolling average and the running value.
    pub multiplier: f32,
    /// Exponential smoothing factor of the running value (closer to 1 = slower).
    pub decay: f32,
    /// Rolling history length (default: 10).
    pub history: usize,
}

impl TransientConfig {
    pub const BASS: Self = Self {
        threshold: 0.15,
        multiplier: 1.4,
        decay: 0.85,
        history: 10,
    };
    pub const MID: Self = Self {
        threshold: 0.12,
        multiplier: 1.3,
        decay: 0.8,
        history: 10,
    };
    pub const TREBLE: Self = Self {
        threshold: 0.08,
        multiplier: 1.25,
        decay: 0.7,
        history: 10,
    };
    pub const OVERALL: Self = Self {
        threshold: 0.1,
        multiplier: 1.35,
        decay: 0.8,
        history: 10,
    };
}

/// Sudden energy surge ("drop") detection.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct DropConfig {
    /// Minimum tick-to-tick rise of normalized energy (default: 0.3).
    pub threshold: f32,
    /// Seconds between two triggers (default: 2.0).
    pub cooldown_secs: f64,
    /// Multiplicative decay of the intensity per tick (default: 0.95).
    pub decay: f32,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            cooldown_secs: 2.0,
            decay: 0.95,
        }
    }
}

/// DynamicsNormalizer tuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct DynamicsConfig {
    pub envelope: EnvelopeConfig,
    pub bass: TransientConfig,
    pub mid: TransientConfig,
    pub treble: TransientConfig,
    pub overall: TransientConfig,
    pub drop: DropConfig,
}

impl Default for DynamicsConfig {
    fn default() -> Self {
        Self {
            envelope: EnvelopeConfig::default(),
            bass: TransientConfig::BASS,
            mid: TransientConfig::MID,
            treble: TransientConfig::TREBLE,
            overall: TransientConfig::OVERALL,
            drop: DropConfig::default(),
        }
    }
}

/// Mel filterbank used by the onset detection function.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct OnsetConfig {
    /// Number of triangular Mel filters (default: 40).
    pub mel_bands: usize,
    /// Lowest filter edge in Hz (default: 30).
    pub min_freq_hz: f32,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        Self {
            mel_bands: 40,
            min_freq_hz: 30.0,
        }
    }
}

/// Which tempo estimator drives the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum TempoStrategy {
    /// Hann-windowed DFT tempogram validated against the ODF autocorrelation.
    /// Falls back to [`TempoStrategy::Autocorrelation`] when it finds nothing.
    #[default]
    Tempogram,
    /// Plain autocorrelation peak picking.
    Autocorrelation,
}

/// TempoTracker tuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TempoConfig {
    pub strategy: TempoStrategy,
    /// ODF ring buffer capacity in ticks (default: 256).
    pub odf_capacity: usize,
    /// ODF samples required before any tempo is reported (default: 128).
    pub min_history: usize,
    pub min_bpm: f32,
    pub max_bpm: f32,
    /// Rolling BPM history length (default: 15).
    pub bpm_history: usize,
    /// BPM samples required before the median is reported (default: 5).
    pub min_bpm_samples: usize,
    /// Rolling confidence history length (default: 10).
    pub confidence_history: usize,
    /// `k` in `1 - stdev / (mean * k)` (default: 0.08).
    pub cv_scale: f32,
    /// Lag offset beyond which the competing autocorrelation peak is searched (default: 10).
    pub prominence_offset: usize,
    /// Recent ODF samples fed to the tempogram (default: 256).
    pub tempogram_window: usize,
    /// Zero-padded DFT length of the tempogram (default: 512).
    pub tempogram_size: usize,
    /// Tempogram candidates kept for validation (default: 3).
    pub max_candidates: usize,
    /// Correlation ratio that flips a candidate to double or half tempo (default: 1.2).
    pub octave_ratio: f32,
    /// ODF samples searched by the beat tracker (default: 180).
    pub beat_window: usize,
    /// Weight of the log-interval transition penalty (default: 5.0).
    pub tightness: f32,
    /// Distance from a tracked beat that still counts as "on the beat" (default: 0.05 s).
    pub beat_tolerance_secs: f64,
    /// Recent ODF samples scanned for sub-beat peaks (default: 64).
    pub subdivision_window: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        Self {
            strategy: TempoStrategy::Tempogram,
            odf_capacity: 256,
            min_history: 128,
            min_bpm: 70.0,
            max_bpm: 190.0,
            bpm_history: 15,
            min_bpm_samples: 5,
            confidence_history: 10,
            cv_scale: 0.08,
            prominence_offset: 10,
            tempogram_window: 256,
            tempogram_size: 512,
            max_candidates: 3,
            octave_ratio: 1.2,
            beat_window: 180,
            tightness: 5.0,
            beat_tolerance_secs: 0.05,
            subdivision_window: 64,
        }
    }
}

/// PitchTracker tuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PitchConfig {
    /// Waveform samples consumed per tick; the YIN window is half of this (default: 2048).
    pub buffer_size: usize,
    /// YIN threshold used when adaptation is off (default: 0.1).
    pub base_threshold: f32,
    /// Derive the threshold from signal quality each tick (default: true).
    pub adaptive_threshold: bool,
    /// Looser bound for the global-minimum fallback (default: 0.8).
    pub global_minimum_bound: f32,
    /// YIN confidence below which the spectral fallback is tried (default: 0.5).
    pub fallback_confidence: f32,
    pub fallback_min_hz: f32,
    pub fallback_max_hz: f32,
    /// Minimum peak magnitude accepted by the spectral fallback (default: 0.1).
    pub fallback_floor: f32,
}

impl Default for PitchConfig {
    fn default() -> Self {
        Self {
            buffer_size: 2048,
            base_threshold: 0.1,
            adaptive_threshold: true,
            global_minimum_bound: 0.8,
            fallback_confidence: 0.5,
            fallback_min_hz: 80.0,
            fallback_max_hz: 1000.0,
            fallback_floor: 0.1,
        }
    }
}

/// ChromaKeyAnalyzer tuning.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct ChromaConfig {
    pub min_hz: f32,
    pub max_hz: f32,
    /// Share of a bin's energy credited to its own pitch class (default: 0.7).
    pub center_weight: f32,
    /// Share credited to each neighbouring pitch class (default: 0.15).
    pub neighbor_weight: f32,
    /// Exponential smoothing factor across ticks (default: 0.85).
    pub smoothing: f32,
    /// Pearson correlation below which the mode is unknown (default: 0.6).
    pub key_threshold: f32,
    /// Dominant-note window length (default: 10).
    pub stability_window: usize,
    /// Note confidence required to enter the stability window (default: 0.3).
    pub note_confidence_floor: f32,
    /// Gain applied to the harmonic/fundamental energy ratio (default: 0.5).
    pub harmonic_scale: f32,
    /// Highest harmonic compared against the fundamental (default: 6).
    pub max_harmonic: usize,
}

impl Default for ChromaConfig {
    fn default() -> Self {
        Self {
            min_hz: 80.0,
            max_hz: 4000.0,
            center_weight: 0.7,
            neighbor_weight: 0.15,
            smoothing: 0.85,
            key_threshold: 0.6,
            stability_window: 10,
            note_confidence_floor: 0.3,
            harmonic_scale: 0.5,
            max_harmonic: 6,
        }
    }
}
