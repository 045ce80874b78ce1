//! Band energies and spectral shape.
//!
//! Turns a magnitude spectrum (DC..Nyquist, `N` bins) into perceptually
//! weighted bass/mid/treble levels and four shape descriptors:
//!
//! - **Centroid**: magnitude-weighted mean frequency
//! - **Spread**: magnitude-weighted standard deviation around the centroid
//! - **Rolloff**: lowest frequency holding 85% of the cumulative magnitude
//! - **Flux**: median of the positive bin-wise increases since the last call
//!
//! All descriptors are divided by Nyquist so they land in 0..1.

use crate::config::SpectralConfig;
use crate::frame::{BandLevels, SpectralFeatures};
use crate::history::median;

/// Linear A-weighting gain for a frequency in Hz (IEC 61672, +2 dB at 1 kHz normalization).
pub fn a_weighting(freq: f32) -> f32 {
    if freq <= 0.0 {
        return 0.0;
    }
    let f2 = (freq as f64) * (freq as f64);
    let numerator = 12194.0f64.powi(2) * f2 * f2;
    let denominator = (f2 + 20.6f64.powi(2))
        * ((f2 + 107.7f64.powi(2)) * (f2 + 737.9f64.powi(2))).sqrt()
        * (f2 + 12194.0f64.powi(2));
    // 10^(2/20): the curve is 0 dB at 1 kHz after this gain
    (numerator / denominator * 1.258_925_4) as f32
}

/// Root-mean-square of a buffer, ignoring non-finite samples.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&v| clean(v)).map(|v| v * v).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

/// Sub-sample offset of the extremum (peak or trough) at the middle of three
/// equally spaced samples, clamped to -0.5..0.5.
pub fn parabolic_offset(left: f32, center: f32, right: f32) -> f32 {
    let denom = left - 2.0 * center + right;
    if denom.abs() < f32::EPSILON {
        return 0.0;
    }
    (0.5 * (left - right) / denom).clamp(-0.5, 0.5)
}

#[inline]
pub(crate) fn clean(v: f32) -> f32 {
    if v.is_finite() {
        v.abs()
    } else {
        0.0
    }
}

/// Output of one [`SpectralAnalyzer::analyze`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralSnapshot {
    pub bands: BandLevels,
    pub features: SpectralFeatures,
    /// Magnitude RMS over all bins.
    pub energy: f32,
}

/// Stateful spectral analyzer; the only state is the previous spectrum for flux.
pub struct SpectralAnalyzer {
    config: SpectralConfig,
    prev_spectrum: Vec<f32>,
    increases: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(config: SpectralConfig) -> Self {
        Self {
            config,
            prev_spectrum: Vec::new(),
            increases: Vec::new(),
        }
    }

    pub fn reset(&mut self) {
        self.prev_spectrum.clear();
        self.increases.clear();
    }

    /// Analyse one spectrum. Empty or all-zero input yields all-zero features.
    pub fn analyze(&mut self, spectrum: &[f32], sample_rate: f32) -> SpectralSnapshot {
        let flux = self.flux(spectrum);

        let n = spectrum.len();
        if n == 0 || !sample_rate.is_finite() || sample_rate <= 0.0 {
            return SpectralSnapshot::default();
        }
        let nyquist = sample_rate * 0.5;
        let bin_hz = nyquist / n as f32;

        let energy = rms(spectrum);
        let bands = self.band_levels(spectrum, bin_hz);

        let total: f32 = spectrum.iter().map(|&v| clean(v)).sum();
        if total <= 0.0 {
            return SpectralSnapshot {
                bands,
                features: SpectralFeatures {
                    flux,
                    ..SpectralFeatures::default()
                },
                energy,
            };
        }

        let centroid_hz = spectrum
            .iter()
            .enumerate()
            .map(|(i, &m)| i as f32 * bin_hz * clean(m))
            .sum::<f32>()
            / total;

        let variance = spectrum
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                let d = i as f32 * bin_hz - centroid_hz;
                clean(m) * d * d
            })
            .sum::<f32>()
            / total;

        let target = total * self.config.rolloff_fraction;
        let mut cumulative = 0.0f32;
        let mut rolloff_hz = (n - 1) as f32 * bin_hz;
        for (i, &m) in spectrum.iter().enumerate() {
            cumulative += clean(m);
            if cumulative >= target {
                rolloff_hz = i as f32 * bin_hz;
                break;
            }
        }

        SpectralSnapshot {
            bands,
            features: SpectralFeatures {
                centroid: (centroid_hz / nyquist).clamp(0.0, 1.0),
                spread: (variance.sqrt() / nyquist).clamp(0.0, 1.0),
                flux,
                rolloff: (rolloff_hz / nyquist).clamp(0.0, 1.0),
            },
            energy,
        }
    }

    /// A-weighted mean magnitude per band: `Σ w·m / Σ w`.
    fn band_levels(&self, spectrum: &[f32], bin_hz: f32) -> BandLevels {
        let mut sums = [0.0f32; 3];
        let mut weights = [0.0f32; 3];

        // The final bin (Nyquist) is excluded from the treble band.
        for (i, &m) in spectrum.iter().enumerate().take(spectrum.len() - 1) {
            let freq = i as f32 * bin_hz;
            let band = if freq < self.config.bass_cutoff_hz {
                0
            } else if freq < self.config.treble_cutoff_hz {
                1
            } else {
                2
            };
            let w = a_weighting(freq);
            sums[band] += w * clean(m);
            weights[band] += w;
        }

        let level = |b: usize| {
            if weights[b] > 0.0 {
                (sums[b] / weights[b]).clamp(0.0, 1.0)
            } else {
                0.0
            }
        };
        BandLevels {
            bass: level(0),
            mid: level(1),
            treble: level(2),
        }
    }

    /// Median positive bin increase, scaled and clamped. The first spectrum
    /// (or one whose length changed) has no reference and yields 0.
    fn flux(&mut self, spectrum: &[f32]) -> f32 {
        let comparable = self.prev_spectrum.len() == spectrum.len() && !spectrum.is_empty();

        let mut flux = 0.0;
        if comparable {
            self.increases.clear();
            self.increases.extend(
                spectrum
                    .iter()
                    .zip(&self.prev_spectrum)
                    .map(|(&cur, &prev)| clean(cur) - prev)
                    .filter(|&d| d > 0.0),
            );
            flux = (median(&self.increases) * self.config.flux_scale).clamp(0.0, 1.0);
        }

        self.prev_spectrum.clear();
        self.prev_spectrum.extend(spectrum.iter().map(|&v| clean(v)));
        flux
    }
}
