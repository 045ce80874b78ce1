//! Onset detection function (ODF).
//!
//! The magnitude spectrum is projected onto a triangular Mel filterbank; the
//! per-band energy increase since the previous tick is half-wave rectified
//! and aggregated with a median. An onset therefore has to show up in more
//! than half of the bands before it dominates the value.

use crate::config::OnsetConfig;
use crate::history::median;
use crate::spectral::clean;

pub fn hz_to_mel(hz: f32) -> f32 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

pub fn mel_to_hz(mel: f32) -> f32 {
    700.0 * (10f32.powf(mel / 2595.0) - 1.0)
}

/// One triangular filter: weights for bins `start..start + weights.len()`.
#[derive(Debug, Clone, PartialEq)]
struct MelFilter {
    start: usize,
    weights: Vec<f32>,
}

/// Triangular Mel-scale filterbank over a spectrum of `num_bins` bins.
#[derive(Debug, Clone, PartialEq)]
pub struct MelFilterbank {
    filters: Vec<MelFilter>,
    num_bins: usize,
    sample_rate: f32,
}

impl MelFilterbank {
    /// Build `num_bands` filters with Mel-spaced centres between `min_freq`
    /// and Nyquist for a spectrum of `num_bins` bins.
    pub fn new(num_bins: usize, num_bands: usize, sample_rate: f32, min_freq: f32) -> Self {
        let nyquist = sample_rate * 0.5;
        let mut filters = Vec::with_capacity(num_bands);

        if num_bins > 1 && num_bands > 0 && nyquist > min_freq {
            let mel_lo = hz_to_mel(min_freq.max(0.0));
            let mel_hi = hz_to_mel(nyquist);
            let step = (mel_hi - mel_lo) / (num_bands + 1) as f32;
            let last_bin = num_bins - 1;

            let edges: Vec<usize> = (0..num_bands + 2)
                .map(|i| {
                    let hz = mel_to_hz(mel_lo + step * i as f32);
                    ((hz / nyquist * num_bins as f32).round() as usize).min(last_bin)
                })
                .collect();

            for band in 0..num_bands {
                let (left, center, right) = (edges[band], edges[band + 1], edges[band + 2]);
                let weights = (left..=right)
                    .map(|bin| triangle(bin, left, center, right))
                    .collect();
                filters.push(MelFilter {
                    start: left,
                    weights,
                });
            }
        }

        Self {
            filters,
            num_bins,
            sample_rate,
        }
    }

    pub fn num_bands(&self) -> usize {
        self.filters.len()
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Project a spectrum onto the filterbank, writing one energy per band.
    pub fn apply(&self, spectrum: &[f32], out: &mut Vec<f32>) {
        out.clear();
        out.extend(self.filters.iter().map(|filter| {
            filter
                .weights
                .iter()
                .enumerate()
                .filter_map(|(k, w)| spectrum.get(filter.start + k).map(|&m| w * clean(m)))
                .sum::<f32>()
        }));
    }
}

/// Linear ramp 0 → 1 at `center` → 0. Degenerate edges collapse onto the centre.
fn triangle(bin: usize, left: usize, center: usize, right: usize) -> f32 {
    if bin == center {
        1.0
    } else if bin < center {
        (bin - left) as f32 / (center - left) as f32
    } else {
        (right - bin) as f32 / (right - center) as f32
    }
}

/// Multi-band spectral-flux onset detector.
pub struct OnsetDetector {
    config: OnsetConfig,
    filterbank: Option<MelFilterbank>,
    energies: Vec<f32>,
    prev_energies: Vec<f32>,
    fluxes: Vec<f32>,
}

impl OnsetDetector {
    pub fn new(config: OnsetConfig) -> Self {
        Self {
            config,
            filterbank: None,
            energies: Vec::new(),
            prev_energies: Vec::new(),
            fluxes: Vec::new(),
        }
    }

    /// Build the filterbank up front for a known spectrum size and rate.
    pub fn with_layout(config: OnsetConfig, num_bins: usize, sample_rate: f32) -> Self {
        let mut detector = Self::new(config);
        detector.ensure_filterbank(num_bins, sample_rate);
        detector
    }

    pub fn filterbank(&self) -> Option<&MelFilterbank> {
        self.filterbank.as_ref()
    }

    pub fn reset(&mut self) {
        self.energies.clear();
        self.prev_energies.clear();
        self.fluxes.clear();
    }

    /// ODF value for one spectrum. The first tick after a reset or a layout
    /// change has no reference and yields 0.
    pub fn process(&mut self, spectrum: &[f32], sample_rate: f32) -> f32 {
        if spectrum.len() < 2 {
            return 0.0;
        }
        self.ensure_filterbank(spectrum.len(), sample_rate);
        let Some(filterbank) = self.filterbank.as_ref() else {
            return 0.0;
        };

        filterbank.apply(spectrum, &mut self.energies);

        let mut odf = 0.0;
        if self.prev_energies.len() == self.energies.len() {
            self.fluxes.clear();
            self.fluxes.extend(
                self.energies
                    .iter()
                    .zip(&self.prev_energies)
                    .map(|(cur, prev)| (cur - prev).max(0.0)),
            );
            if self.fluxes.iter().any(|&f| f > 0.0) {
                odf = median(&self.fluxes);
            }
        }

        std::mem::swap(&mut self.prev_energies, &mut self.energies);
        odf
    }

    fn ensure_filterbank(&mut self, num_bins: usize, sample_rate: f32) {
        let stale = match &self.filterbank {
            Some(fb) => fb.num_bins() != num_bins || fb.sample_rate() != sample_rate,
            None => true,
        };
        if stale {
            tracing::debug!(
                num_bins,
                sample_rate,
                bands = self.config.mel_bands,
                "building mel filterbank"
            );
            self.filterbank = Some(MelFilterbank::new(
                num_bins,
                self.config.mel_bands,
                sample_rate,
                self.config.min_freq_hz,
            ));
            self.prev_energies.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44100.0;
    const BINS: usize = 1024;

    #[test]
    fn test_mel_round_trip() {
        for hz in [30.0, 440.0, 1000.0, 8000.0, 22050.0] {
            assert!((mel_to_hz(hz_to_mel(hz)) - hz).abs() / hz < 1e-3);
        }
        assert!((hz_to_mel(1000.0) - 1000.0).abs() < 1.0);
    }

    #[test]
    fn test_filterbank_shape() {
        let fb = MelFilterbank::new(BINS, 40, SR, 30.0);
        assert_eq!(fb.num_bands(), 40);
        for filter in &fb.filters {
            assert!(filter.weights.iter().all(|w| (0.0..=1.0).contains(w)));
            assert!(filter.weights.iter().any(|&w| w == 1.0), "every filter peaks at 1");
        }
        // Centres are increasing
        let starts: Vec<usize> = fb.filters.iter().map(|f| f.start).collect();
        assert!(starts.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_filterbank_low_bands_are_narrow() {
        let fb = MelFilterbank::new(BINS, 40, SR, 30.0);
        let first = fb.filters.first().map(|f| f.weights.len()).unwrap_or(0);
        let last = fb.filters.last().map(|f| f.weights.len()).unwrap_or(0);
        assert!(first < last);
    }

    #[test]
    fn test_broadband_onset_fires() {
        let mut detector = OnsetDetector::new(OnsetConfig::default());
        assert_eq!(detector.process(&vec![0.01; BINS], SR), 0.0);
        assert_eq!(detector.process(&vec![0.01; BINS], SR), 0.0);
        let odf = detector.process(&vec![0.5; BINS], SR);
        assert!(odf > 0.0);
    }

    #[test]
    fn test_decrease_is_ignored() {
        let mut detector = OnsetDetector::new(OnsetConfig::default());
        detector.process(&vec![0.5; BINS], SR);
        assert_eq!(detector.process(&vec![0.1; BINS], SR), 0.0);
    }

    #[test]
    fn test_single_band_onset_is_rejected() {
        let mut detector = OnsetDetector::new(OnsetConfig::default());
        detector.process(&vec![0.01; BINS], SR);
        let mut spectrum = vec![0.01; BINS];
        for v in spectrum.iter_mut().take(8) {
            *v = 1.0;
        }
        // Only the lowest few bands rise: the median stays at 0
        assert_eq!(detector.process(&spectrum, SR), 0.0);
    }

    #[test]
    fn test_layout_change_rebuilds() {
        let mut detector = OnsetDetector::with_layout(OnsetConfig::default(), BINS, SR);
        detector.process(&vec![0.1; BINS], SR);
        assert_eq!(detector.process(&vec![0.9; 512], 48000.0), 0.0);
        let fb = detector.filterbank().map(|fb| (fb.num_bins(), fb.sample_rate()));
        assert_eq!(fb, Some((512, 48000.0)));
    }
}
