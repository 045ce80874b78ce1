//! Per-tick input and output values.
//!
//! A [`RawFrame`] is what the capture layer hands over once per tick; a
//! [`FeatureFrame`] is the immutable analysis result. Every field of a
//! `FeatureFrame` is always present and finite.

use std::fmt;

/// Pitch-class names with sharp notation, indexed by `midi % 12`.
pub const PITCH_CLASS_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// One tick of raw input from the capture layer.
///
/// The analysis core only ever reads from it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFrame {
    /// Normalized magnitudes (0..1), one per bin, spanning DC to Nyquist.
    pub spectrum: Vec<f32>,
    /// Centered amplitude samples (-1..1).
    pub waveform: Vec<f32>,
    /// Source sample rate in Hz.
    pub sample_rate: f32,
}

impl RawFrame {
    pub fn new(spectrum: Vec<f32>, waveform: Vec<f32>, sample_rate: f32) -> Self {
        Self {
            spectrum,
            waveform,
            sample_rate,
        }
    }

    /// Build from byte-quantized buffers: spectrum 0..255, waveform centered on 128.
    pub fn from_bytes(spectrum: &[u8], waveform: &[u8], sample_rate: f32) -> Self {
        Self {
            spectrum: spectrum.iter().map(|&v| v as f32 / 255.0).collect(),
            waveform: waveform.iter().map(|&v| (v as f32 - 128.0) / 128.0).collect(),
            sample_rate,
        }
    }

    /// Highest frequency represented by the spectrum.
    pub fn nyquist(&self) -> f32 {
        self.sample_rate * 0.5
    }

    /// Width of one spectrum bin in Hz (0 for an empty spectrum).
    pub fn bin_hz(&self) -> f32 {
        if self.spectrum.is_empty() {
            0.0
        } else {
            self.nyquist() / self.spectrum.len() as f32
        }
    }

    pub fn peak_magnitude(&self) -> f32 {
        self.spectrum
            .iter()
            .filter(|v| v.is_finite())
            .fold(0.0f32, |acc, v| acc.max(v.abs()))
    }

    pub fn peak_amplitude(&self) -> f32 {
        self.waveform
            .iter()
            .filter(|v| v.is_finite())
            .fold(0.0f32, |acc, v| acc.max(v.abs()))
    }

    /// True for frames with nothing to analyse: empty buffers, a non-positive
    /// sample rate, or both spectrum and waveform below `floor`.
    pub fn is_degenerate(&self, floor: f32) -> bool {
        if self.spectrum.is_empty() || !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return true;
        }
        self.peak_magnitude() < floor && self.peak_amplitude() < floor
    }
}

/// Twelve pitch classes, C = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PitchClass {
    #[default]
    C,
    CSharp,
    D,
    DSharp,
    E,
    F,
    FSharp,
    G,
    GSharp,
    A,
    ASharp,
    B,
}

impl PitchClass {
    pub const ALL: [PitchClass; 12] = [
        PitchClass::C,
        PitchClass::CSharp,
        PitchClass::D,
        PitchClass::DSharp,
        PitchClass::E,
        PitchClass::F,
        PitchClass::FSharp,
        PitchClass::G,
        PitchClass::GSharp,
        PitchClass::A,
        PitchClass::ASharp,
        PitchClass::B,
    ];

    /// Wraps around, so any index maps to a class.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 12]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        PITCH_CLASS_NAMES[self.index()]
    }
}

impl fmt::Display for PitchClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key mode reported by the key detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum Mode {
    Major,
    Minor,
    #[default]
    Unknown,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Major => "major",
            Mode::Minor => "minor",
            Mode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bass / mid / treble levels (0..1).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct BandLevels {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Per-register onset spikes for this tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct Transients {
    pub bass: bool,
    pub mid: bool,
    pub treble: bool,
    pub overall: bool,
}

impl Transients {
    pub fn any(&self) -> bool {
        self.bass || self.mid || self.treble || self.overall
    }
}

/// Spectral shape descriptors, all normalized to 0..1.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SpectralFeatures {
    pub centroid: f32,
    pub spread: f32,
    pub flux: f32,
    pub rolloff: f32,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MelodicFeatures {
    /// Hz, 0 when no pitch was found.
    pub dominant_frequency: f32,
    /// Note name with octave (e.g. "A4"), or "none".
    pub dominant_note: String,
    pub note_confidence: f32,
    pub harmonic_content: f32,
    /// Smoothed chroma: 12 non-negative values summing to 1.
    pub pitch_class: [f32; 12],
}

impl Default for MelodicFeatures {
    fn default() -> Self {
        Self {
            dominant_frequency: 0.0,
            dominant_note: NO_NOTE.to_string(),
            note_confidence: 0.0,
            harmonic_content: 0.0,
            pitch_class: [1.0 / 12.0; 12],
        }
    }
}

/// Label used when no note is present.
pub const NO_NOTE: &str = "none";

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct RhythmicFeatures {
    /// 0 while the tempo is unknown.
    pub bpm: f32,
    /// 0..100
    pub bpm_confidence: f32,
    /// 0..1 position between the bracketing beats.
    pub beat_phase: f32,
    pub is_beat: bool,
    /// 1, 2 or 4.
    pub subdivision: u32,
    /// 0..100
    pub groove: f32,
}

impl Default for RhythmicFeatures {
    fn default() -> Self {
        Self {
            bpm: 0.0,
            bpm_confidence: 0.0,
            beat_phase: 0.0,
            is_beat: false,
            subdivision: 1,
            groove: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct TimbreProfile {
    pub brightness: f32,
    pub warmth: f32,
    pub richness: f32,
    pub clarity: f32,
    pub attack: f32,
    /// Pitch class index 0..11.
    pub dominant_chroma: u8,
    pub harmonic_complexity: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct MusicalContext {
    pub note_present: bool,
    pub note_stability: f32,
    /// Root of the best-matching key; meaningful only with a known mode.
    pub key: PitchClass,
    pub mode: Mode,
    pub tension: f32,
}

/// The engine's per-tick output.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct FeatureFrame {
    /// Zero-based tick index since the last reset.
    pub tick: u64,
    /// Engine clock in seconds (`tick / tick_rate`).
    pub time: f64,
    /// Waveform RMS (0..1).
    pub volume: f32,
    /// Spectrum magnitude RMS (0..1).
    pub energy: f32,
    pub bands: BandLevels,
    /// Envelope-normalized bands.
    pub dynamic_bands: BandLevels,
    pub transients: Transients,
    /// 0..1, decays every tick.
    pub drop_intensity: f32,
    pub spectral: SpectralFeatures,
    pub melodic: MelodicFeatures,
    pub rhythmic: RhythmicFeatures,
    pub timbre: TimbreProfile,
    pub context: MusicalContext,
}

impl FeatureFrame {
    /// The neutral frame reported for silence and degenerate input.
    pub fn neutral(tick: u64, time: f64) -> Self {
        Self {
            tick,
            time,
            volume: 0.0,
            energy: 0.0,
            bands: BandLevels::default(),
            dynamic_bands: BandLevels::default(),
            transients: Transients::default(),
            drop_intensity: 0.0,
            spectral: SpectralFeatures::default(),
            melodic: MelodicFeatures::default(),
            rhythmic: RhythmicFeatures::default(),
            timbre: TimbreProfile {
                warmth: 1.0,
                clarity: 1.0,
                ..TimbreProfile::default()
            },
            context: MusicalContext::default(),
        }
    }

    /// Replace non-finite values with 0 and clamp every field to its range.
    pub(crate) fn sanitize(&mut self) {
        self.volume = unit(self.volume);
        self.energy = unit(self.energy);
        for bands in [&mut self.bands, &mut self.dynamic_bands] {
            bands.bass = unit(bands.bass);
            bands.mid = unit(bands.mid);
            bands.treble = unit(bands.treble);
        }
        self.drop_intensity = unit(self.drop_intensity);

        let s = &mut self.spectral;
        s.centroid = unit(s.centroid);
        s.spread = unit(s.spread);
        s.flux = unit(s.flux);
        s.rolloff = unit(s.rolloff);

        let m = &mut self.melodic;
        m.dominant_frequency = finite(m.dominant_frequency).max(0.0);
        m.note_confidence = unit(m.note_confidence);
        m.harmonic_content = unit(m.harmonic_content);
        for v in m.pitch_class.iter_mut() {
            *v = finite(*v).max(0.0);
        }
        let total: f32 = m.pitch_class.iter().sum();
        if total <= 0.0 {
            m.pitch_class = [1.0 / 12.0; 12];
        } else if (total - 1.0).abs() > 1e-6 {
            for v in m.pitch_class.iter_mut() {
                *v /= total;
            }
        }

        let r = &mut self.rhythmic;
        r.bpm = finite(r.bpm).max(0.0);
        r.bpm_confidence = finite(r.bpm_confidence).clamp(0.0, 100.0);
        r.beat_phase = unit(r.beat_phase);
        r.subdivision = r.subdivision.max(1);
        r.groove = finite(r.groove).clamp(0.0, 100.0);

        let t = &mut self.timbre;
        t.brightness = unit(t.brightness);
        t.warmth = unit(t.warmth);
        t.richness = unit(t.richness);
        t.clarity = unit(t.clarity);
        t.attack = unit(t.attack);
        t.dominant_chroma %= 12;
        t.harmonic_complexity = unit(t.harmonic_complexity);

        let c = &mut self.context;
        c.note_stability = unit(c.note_stability);
        c.tension = unit(c.tension);
    }
}

fn finite(v: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn unit(v: f32) -> f32 {
    finite(v).clamp(0.0, 1.0)
}
