//! Chroma, key, harmonic tension, note stability and timbre.
//!
//! The chroma vector folds A-weighted spectral energy between 80 Hz and
//! 4 kHz into twelve pitch classes and is smoothed across ticks. Key
//! detection is Krumhansl-Schmuckler: Pearson correlation of the smoothed
//! chroma against the 24 rotations of the Krumhansl-Kessler profiles.

use crate::config::ChromaConfig;
use crate::frame::{Mode, PitchClass, SpectralFeatures, TimbreProfile};
use crate::history::History;
use crate::spectral::a_weighting;

/// Krumhansl-Kessler major key profile, tonic first.
pub const MAJOR_PROFILE: [f32; 12] = [
    6.35, 2.23, 3.48, 2.33, 4.38, 4.09, 2.52, 5.19, 2.39, 3.66, 2.29, 2.88,
];

/// Krumhansl-Kessler minor key profile, tonic first.
pub const MINOR_PROFILE: [f32; 12] = [
    6.33, 2.68, 3.52, 5.38, 2.60, 3.53, 2.54, 4.75, 3.98, 2.69, 3.34, 3.17,
];

const UNIFORM: [f32; 12] = [1.0 / 12.0; 12];

/// Best-matching key for a chroma vector.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct KeyEstimate {
    pub root: PitchClass,
    /// `Unknown` when the best correlation is below the threshold.
    pub mode: Mode,
    /// Pearson correlation of the best match (-1..1).
    pub correlation: f32,
}

/// Pitch class of a frequency: rounded MIDI number mod 12.
pub fn pitch_class_of(freq: f32) -> Option<usize> {
    if freq <= 0.0 || !freq.is_finite() {
        return None;
    }
    let midi = (69.0 + 12.0 * (freq / 440.0).log2()).round() as i64;
    Some(midi.rem_euclid(12) as usize)
}

/// Relative variance below which a vector counts as flat.
const FLAT_VARIANCE: f32 = 1e-6;

/// Pearson correlation; 0 when either vector is flat.
fn pearson(a: &[f32; 12], b: &[f32; 12]) -> f32 {
    let mean_a = a.iter().sum::<f32>() / 12.0;
    let mean_b = b.iter().sum::<f32>() / 12.0;
    let (mut cov, mut var_a, mut var_b) = (0.0f32, 0.0f32, 0.0f32);
    let (mut energy_a, mut energy_b) = (0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        let (da, db) = (x - mean_a, y - mean_b);
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
        energy_a += x * x;
        energy_b += y * y;
    }
    // Rounding leaves a constant vector with a tiny nonzero variance
    if var_a <= FLAT_VARIANCE * energy_a || var_b <= FLAT_VARIANCE * energy_b {
        return 0.0;
    }
    cov / (var_a * var_b).sqrt()
}

/// Profile transposed so that `root` carries the tonic weight.
fn rotate(profile: &[f32; 12], root: usize) -> [f32; 12] {
    std::array::from_fn(|i| profile[(i + 12 - root) % 12])
}

/// Krumhansl-Schmuckler key detection. Ties keep the lowest root, major first.
pub fn detect_key(chroma: &[f32; 12], threshold: f32) -> KeyEstimate {
    let mut best = KeyEstimate {
        root: PitchClass::C,
        mode: Mode::Unknown,
        correlation: f32::NEG_INFINITY,
    };
    for (mode, profile) in [(Mode::Major, &MAJOR_PROFILE), (Mode::Minor, &MINOR_PROFILE)] {
        for root in 0..12 {
            let r = pearson(chroma, &rotate(profile, root));
            if r > best.correlation {
                best = KeyEstimate {
                    root: PitchClass::from_index(root),
                    mode,
                    correlation: r,
                };
            }
        }
    }
    if best.correlation < threshold {
        best.mode = Mode::Unknown;
    }
    best
}

/// Population variance of the chroma, scaled by 10 and clamped to 0..1.
pub fn harmonic_complexity(chroma: &[f32; 12]) -> f32 {
    let mean = chroma.iter().sum::<f32>() / 12.0;
    let variance = chroma.iter().map(|c| (c - mean) * (c - mean)).sum::<f32>() / 12.0;
    (10.0 * variance).clamp(0.0, 1.0)
}

/// Dissonant-interval energy (minor second, tritone, minor seventh) averaged
/// with harmonic complexity. Each pitch-class pair counts once per interval.
pub fn harmonic_tension(chroma: &[f32; 12]) -> f32 {
    let dissonance: f32 = (0..12)
        .map(|i| {
            // The tritone is its own inversion, so stepping up by 6 meets every pair twice
            let dissonant =
                chroma[(i + 1) % 12] + 0.5 * chroma[(i + 6) % 12] + chroma[(i + 10) % 12];
            chroma[i] * dissonant
        })
        .sum();
    ((dissonance + harmonic_complexity(chroma)) * 0.5).clamp(0.0, 1.0)
}

fn argmax(chroma: &[f32; 12]) -> usize {
    chroma
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &v)| {
            if v > best.1 {
                (i, v)
            } else {
                best
            }
        })
        .0
}

/// Timbre descriptors derived from spectral shape, harmonic content and chroma.
pub fn timbre(
    spectral: &SpectralFeatures,
    harmonic_content: f32,
    chroma: &[f32; 12],
) -> TimbreProfile {
    let brightness = spectral.centroid.clamp(0.0, 1.0);
    TimbreProfile {
        brightness,
        warmth: 1.0 - brightness,
        richness: harmonic_content.clamp(0.0, 1.0),
        clarity: (1.0 - spectral.spread).max(0.0),
        attack: spectral.flux,
        dominant_chroma: argmax(chroma) as u8,
        harmonic_complexity: harmonic_complexity(chroma),
    }
}

/// Output of one [`ChromaKeyAnalyzer::analyze`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct ChromaSnapshot {
    /// Smoothed chroma summing to 1.
    pub pitch_class: [f32; 12],
    pub key: KeyEstimate,
    pub harmonic_content: f32,
    pub tension: f32,
    pub note_stability: f32,
    pub timbre: TimbreProfile,
}

/// What the pitch tracker found this tick, as far as chroma analysis cares.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NoteObservation<'a> {
    /// Fundamental in Hz, 0 when unvoiced.
    pub frequency: f32,
    pub confidence: f32,
    /// Note label with octave (e.g. "A4").
    pub label: Option<&'a str>,
}

/// Stateful chroma smoother, key detector and note-stability window.
pub struct ChromaKeyAnalyzer {
    config: ChromaConfig,
    smoothed: Option<[f32; 12]>,
    notes: History<String>,
}

impl ChromaKeyAnalyzer {
    pub fn new(config: ChromaConfig) -> Self {
        Self {
            notes: History::new(config.stability_window),
            config,
            smoothed: None,
        }
    }

    pub fn reset(&mut self) {
        self.smoothed = None;
        self.notes.clear();
    }

    /// Smoothed chroma so far, uniform before the first non-silent frame.
    pub fn chroma(&self) -> [f32; 12] {
        self.smoothed.unwrap_or(UNIFORM)
    }

    /// Unsmoothed chroma of one spectrum, or `None` when no energy falls in range.
    pub fn frame_chroma(&self, spectrum: &[f32], sample_rate: f32) -> Option<[f32; 12]> {
        let n = spectrum.len();
        if n == 0 || !sample_rate.is_finite() || sample_rate <= 0.0 {
            return None;
        }
        let bin_hz = sample_rate * 0.5 / n as f32;
        let lo = (self.config.min_hz / bin_hz).ceil() as usize;
        let hi = ((self.config.max_hz / bin_hz).floor() as usize).min(n - 1);

        let mut chroma = [0.0f32; 12];
        for (i, &m) in spectrum.iter().enumerate().take(hi + 1).skip(lo) {
            if !m.is_finite() || m == 0.0 {
                continue;
            }
            let freq = i as f32 * bin_hz;
            let Some(class) = pitch_class_of(freq) else {
                continue;
            };
            let energy = m.abs() * a_weighting(freq);
            chroma[class] += self.config.center_weight * energy;
            chroma[(class + 1) % 12] += self.config.neighbor_weight * energy;
            chroma[(class + 11) % 12] += self.config.neighbor_weight * energy;
        }

        let total: f32 = chroma.iter().sum();
        if total <= 0.0 || !total.is_finite() {
            return None;
        }
        Some(chroma.map(|c| c / total))
    }

    /// Fold one spectrum into the smoothed chroma and return it.
    pub fn update_chroma(&mut self, spectrum: &[f32], sample_rate: f32) -> [f32; 12] {
        if let Some(frame) = self.frame_chroma(spectrum, sample_rate) {
            let alpha = self.config.smoothing;
            self.smoothed = Some(match self.smoothed {
                Some(prev) => std::array::from_fn(|i| alpha * prev[i] + (1.0 - alpha) * frame[i]),
                None => frame,
            });
        }
        self.chroma()
    }

    /// Energy at harmonics 2..=max over energy at the fundamental, scaled to 0..1.
    pub fn harmonic_content(&self, spectrum: &[f32], sample_rate: f32, fundamental: f32) -> f32 {
        let n = spectrum.len();
        if n < 3 || fundamental <= 0.0 || !fundamental.is_finite() || sample_rate <= 0.0 {
            return 0.0;
        }
        let bin_hz = sample_rate * 0.5 / n as f32;
        let window_energy = |freq: f32| -> Option<f32> {
            let center = (freq / bin_hz).round() as usize;
            if center + 1 >= n {
                return None;
            }
            Some(
                spectrum[center.saturating_sub(1)..=center + 1]
                    .iter()
                    .filter(|v| v.is_finite())
                    .map(|v| v * v)
                    .sum(),
            )
        };

        let Some(fundamental_energy) = window_energy(fundamental) else {
            return 0.0;
        };
        if fundamental_energy < 1e-3 {
            return 0.0;
        }
        let harmonics: f32 = (2..=self.config.max_harmonic)
            .filter_map(|h| window_energy(fundamental * h as f32))
            .sum();
        (self.config.harmonic_scale * harmonics / fundamental_energy).clamp(0.0, 1.0)
    }

    /// Record this tick's note and return the share of the window held by the most
    /// frequent label.
    pub fn note_stability(&mut self, note: &NoteObservation<'_>) -> f32 {
        if let Some(label) = note.label {
            if note.confidence > self.config.note_confidence_floor {
                self.notes.push(label.to_string());
            }
        }
        if self.notes.is_empty() {
            return 0.0;
        }
        let most_frequent = self
            .notes
            .iter()
            .map(|label| self.notes.iter().filter(|other| *other == label).count())
            .max()
            .unwrap_or(0);
        most_frequent as f32 / self.notes.len() as f32
    }

    /// Full per-tick chroma analysis.
    pub fn analyze(
        &mut self,
        spectrum: &[f32],
        sample_rate: f32,
        spectral: &SpectralFeatures,
        note: &NoteObservation<'_>,
    ) -> ChromaSnapshot {
        let pitch_class = self.update_chroma(spectrum, sample_rate);
        let key = detect_key(&pitch_class, self.config.key_threshold);
        let harmonic_content = self.harmonic_content(spectrum, sample_rate, note.frequency);
        let note_stability = self.note_stability(note);
        tracing::trace!(
            key = %key.root,
            mode = %key.mode,
            correlation = key.correlation,
            "key estimate"
        );

        ChromaSnapshot {
            tension: harmonic_tension(&pitch_class),
            timbre: timbre(spectral, harmonic_content, &pitch_class),
            pitch_class,
            key,
            harmonic_content,
            note_stability,
        }
    }
}
