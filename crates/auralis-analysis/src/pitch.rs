//! Pitch detection using the YIN algorithm
//!
//! Monophonic fundamental tracking for the dominant note of the mix.
//!
//! ## Algorithm
//!
//! YIN (de Cheveigné & Kawahara, 2002) over a window of `W` samples:
//!
//! 1. **Difference function** - d(τ) = Σ(x[j] - x[j+τ])² for τ in 0..W
//! 2. **Cumulative mean normalized difference** - d'(τ)
//! 3. **Absolute threshold** - first τ ≥ 2 where d'(τ) < threshold, walked
//!    forward to the local minimum
//! 4. **Parabolic interpolation** - sub-sample period
//!
//! When YIN is unsure, [`PitchTracker`] falls back to the tallest spectral
//! peak between 80 Hz and 1 kHz.

use crate::config::PitchConfig;
use crate::frame::PITCH_CLASS_NAMES;
use crate::spectral::parabolic_offset;

/// Where a pitch estimate came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub enum PitchSource {
    #[default]
    None,
    Yin,
    Spectrum,
}

/// Result of pitch detection for a single frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(
    feature = "serialization",
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct PitchResult {
    /// Detected frequency in Hz (0.0 if unvoiced/uncertain)
    pub frequency: f32,
    /// Confidence/clarity of detection (0.0 - 1.0)
    pub confidence: f32,
    /// Nearest MIDI note number (if voiced)
    pub midi_note: Option<u8>,
    /// Cents deviation from nearest note (-50 to +50)
    pub cents_offset: f32,
    pub source: PitchSource,
}

impl PitchResult {
    fn voiced(frequency: f32, confidence: f32, source: PitchSource) -> Self {
        let (midi_note, cents_offset) = freq_to_midi(frequency);
        Self {
            frequency,
            confidence: confidence.clamp(0.0, 1.0),
            midi_note: Some(midi_note),
            cents_offset,
            source,
        }
    }

    /// Check if a pitch was detected
    pub fn is_voiced(&self) -> bool {
        self.frequency > 0.0 && self.confidence > 0.0
    }

    /// Note name with sharp notation and octave (e.g., "A4", "C#5")
    pub fn note_name(&self) -> Option<String> {
        self.midi_note.map(note_name)
    }

    /// Pitch class 0..11 (C = 0)
    pub fn pitch_class(&self) -> Option<usize> {
        self.midi_note.map(|note| (note % 12) as usize)
    }
}

/// YIN pitch detector over a fixed analysis window.
pub struct PitchDetector {
    sample_rate: f32,
    window: usize,
    threshold: f32,
    global_minimum_bound: f32,

    // Pre-allocated buffers
    difference: Vec<f32>,
    cumulative_mean: Vec<f32>,
    cum_sq: Vec<f64>,
}

impl PitchDetector {
    /// # Arguments
    /// * `sample_rate` - Audio sample rate in Hz
    /// * `window` - YIN integration window; input needs at least `2 * window` samples
    pub fn new(sample_rate: f32, window: usize) -> Self {
        Self {
            sample_rate,
            window,
            threshold: 0.1,
            global_minimum_bound: 0.8,
            difference: vec![0.0; window],
            cumulative_mean: vec![0.0; window],
            cum_sq: Vec::with_capacity(2 * window + 1),
        }
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Set YIN threshold (0.01 - 0.5). Lower is stricter.
    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold.clamp(0.01, 0.5);
    }

    /// Bound below which the global minimum is accepted when nothing crosses the threshold.
    pub fn set_global_minimum_bound(&mut self, bound: f32) {
        self.global_minimum_bound = bound.clamp(0.0, 1.0);
    }

    /// Detect pitch in one buffer. Shorter buffers shrink the window to half their length.
    pub fn detect(&mut self, samples: &[f32]) -> PitchResult {
        let window = self.window.min(samples.len() / 2);
        if window < 4 || !self.sample_rate.is_finite() || self.sample_rate <= 0.0 {
            return PitchResult::default();
        }

        self.compute_difference(samples, window);
        self.compute_cumulative_mean(window);

        let Some((tau, aperiodicity)) = self.find_best_period(window) else {
            return PitchResult::default();
        };

        let refined = self.parabolic_interpolation(tau, window);
        let frequency = self.sample_rate / refined;
        PitchResult::voiced(frequency, 1.0 - aperiodicity, PitchSource::Yin)
    }

    /// d(τ) = energy(0, W) + energy(τ, W) - 2·r(τ)
    fn compute_difference(&mut self, samples: &[f32], window: usize) {
        self.cum_sq.clear();
        self.cum_sq.push(0.0);
        let mut acc = 0.0f64;
        for &s in &samples[..2 * window] {
            acc += (s as f64) * (s as f64);
            self.cum_sq.push(acc);
        }
        let cum_sq = &self.cum_sq;
        let energy = |start: usize| cum_sq[start + window] - cum_sq[start];

        let e0 = energy(0);
        self.difference[0] = 0.0;
        for tau in 1..window {
            let autocorr: f64 = samples[..window]
                .iter()
                .zip(&samples[tau..tau + window])
                .map(|(&a, &b)| a as f64 * b as f64)
                .sum();
            self.difference[tau] = (e0 + energy(tau) - 2.0 * autocorr).max(0.0) as f32;
        }
    }

    /// d'(0) = 1, d'(τ) = d(τ)·τ / Σ_{j=1..τ} d(j)
    fn compute_cumulative_mean(&mut self, window: usize) {
        self.cumulative_mean[0] = 1.0;

        let mut running_sum = 0.0f32;
        for tau in 1..window {
            running_sum += self.difference[tau];
            self.cumulative_mean[tau] = if running_sum > 1e-10 {
                self.difference[tau] * tau as f32 / running_sum
            } else {
                1.0
            };
        }
    }

    /// First dip below the threshold (walked to its local minimum), else the
    /// global minimum if it is below the looser bound.
    fn find_best_period(&self, window: usize) -> Option<(usize, f32)> {
        let d = &self.cumulative_mean[..window];

        let mut tau = 2;
        while tau < window {
            if d[tau] < self.threshold {
                while tau + 1 < window && d[tau + 1] < d[tau] {
                    tau += 1;
                }
                return Some((tau, d[tau]));
            }
            tau += 1;
        }

        let (best_tau, &best_val) = d
            .iter()
            .enumerate()
            .skip(2)
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        (best_val < self.global_minimum_bound).then_some((best_tau, best_val))
    }

    fn parabolic_interpolation(&self, tau: usize, window: usize) -> f32 {
        if tau < 1 || tau + 1 >= window {
            return tau as f32;
        }
        let d = &self.cumulative_mean;
        tau as f32 + parabolic_offset(d[tau - 1], d[tau], d[tau + 1])
    }
}

/// YIN with an adaptive threshold and a spectral-peak fallback.
pub struct PitchTracker {
    config: PitchConfig,
    detector: PitchDetector,
    samples: Vec<f32>,
}

impl PitchTracker {
    pub fn new(config: PitchConfig, sample_rate: f32) -> Self {
        let mut detector = PitchDetector::new(sample_rate, config.buffer_size / 2);
        detector.set_threshold(config.base_threshold);
        detector.set_global_minimum_bound(config.global_minimum_bound);
        Self {
            samples: Vec::with_capacity(config.buffer_size),
            config,
            detector,
        }
    }

    pub fn detector(&self) -> &PitchDetector {
        &self.detector
    }

    /// YIN threshold for the given signal: `0.05 + 0.15·(1 − volume·(1 − flux))`.
    pub fn adaptive_threshold(volume: f32, flux: f32) -> f32 {
        let quality = (volume.clamp(0.0, 1.0) * (1.0 - flux.clamp(0.0, 1.0))).clamp(0.0, 1.0);
        0.05 + 0.15 * (1.0 - quality)
    }

    /// Estimate the dominant pitch of one tick.
    pub fn track(
        &mut self,
        waveform: &[f32],
        spectrum: &[f32],
        sample_rate: f32,
        volume: f32,
        flux: f32,
    ) -> PitchResult {
        if self.detector.sample_rate() != sample_rate {
            self.detector.set_sample_rate(sample_rate);
        }
        if self.config.adaptive_threshold {
            self.detector
                .set_threshold(Self::adaptive_threshold(volume, flux));
        }

        let take = waveform.len().min(self.config.buffer_size);
        self.samples.clear();
        self.samples.extend(
            waveform[waveform.len() - take..]
                .iter()
                .map(|&v| if v.is_finite() { v } else { 0.0 }),
        );

        let yin = self.detector.detect(&self.samples);
        if yin.confidence >= self.config.fallback_confidence {
            return yin;
        }

        let spectral = self.spectral_peak(spectrum, sample_rate);
        if spectral.confidence > yin.confidence {
            spectral
        } else {
            yin
        }
    }

    /// Tallest bin in the fallback range, parabolically refined.
    fn spectral_peak(&self, spectrum: &[f32], sample_rate: f32) -> PitchResult {
        let n = spectrum.len();
        if n < 3 || !sample_rate.is_finite() || sample_rate <= 0.0 {
            return PitchResult::default();
        }
        let bin_hz = sample_rate * 0.5 / n as f32;
        let lo = ((self.config.fallback_min_hz / bin_hz).ceil() as usize).max(1);
        let hi = ((self.config.fallback_max_hz / bin_hz).floor() as usize).min(n - 2);
        if hi < lo {
            return PitchResult::default();
        }

        let magnitude = |i: usize| {
            let v = spectrum[i];
            if v.is_finite() {
                v.abs()
            } else {
                0.0
            }
        };
        let Some(peak_bin) = (lo..=hi).max_by(|&a, &b| magnitude(a).total_cmp(&magnitude(b)))
        else {
            return PitchResult::default();
        };
        let peak = magnitude(peak_bin);
        if peak <= self.config.fallback_floor {
            return PitchResult::default();
        }

        let mean = (lo..=hi).map(magnitude).sum::<f32>() / (hi - lo + 1) as f32;
        let offset = parabolic_offset(
            magnitude(peak_bin - 1),
            peak,
            magnitude(peak_bin + 1),
        );
        let frequency = (peak_bin as f32 + offset) * bin_hz;
        let confidence = (1.0 - mean / peak).clamp(0.0, 1.0) * 0.7;
        PitchResult::voiced(frequency, confidence, PitchSource::Spectrum)
    }
}

/// Convert frequency to MIDI note and cents offset
pub fn freq_to_midi(freq: f32) -> (u8, f32) {
    if freq <= 0.0 || !freq.is_finite() {
        return (0, 0.0);
    }

    // MIDI note = 69 + 12 * log2(freq / 440)
    let note_float = 69.0 + 12.0 * (freq / 440.0).log2();
    let note = (note_float.round() as i32).clamp(0, 127) as u8;

    let cents = 1200.0 * (freq / midi_to_freq(note)).log2();
    (note, cents)
}

/// Convert MIDI note to frequency
pub fn midi_to_freq(note: u8) -> f32 {
    440.0 * 2.0f32.powf((note as f32 - 69.0) / 12.0)
}

/// Sharp-notation name with octave, e.g. 69 → "A4".
pub fn note_name(note: u8) -> String {
    let octave = (note / 12) as i32 - 1;
    format!("{}{}", PITCH_CLASS_NAMES[(note % 12) as usize], octave)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44100.0;

    fn generate_sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SR).sin())
            .collect()
    }

    #[test]
    fn test_detect_a440() {
        let mut detector = PitchDetector::new(SR, 1024);
        let result = detector.detect(&generate_sine(440.0, 2048));

        assert!(result.is_voiced(), "Should detect voiced signal");
        assert!(
            (result.frequency - 440.0).abs() < 4.4,
            "Expected ~440 Hz, got {} Hz",
            result.frequency
        );
        assert_eq!(result.midi_note, Some(69), "A4 should be MIDI note 69");
        assert_eq!(result.note_name(), Some("A4".to_string()));
        assert_eq!(result.source, PitchSource::Yin);
    }

    #[test]
    fn test_detect_range_within_one_percent() {
        let mut tracker = PitchTracker::new(PitchConfig::default(), SR);
        for &freq in &[80.0, 110.0, 220.0, 330.0, 440.0, 660.0, 880.0, 1000.0] {
            let samples = generate_sine(freq, 2048);
            let result = tracker.track(&samples, &[], SR, 0.7, 0.0);

            let error = ((result.frequency - freq) / freq).abs();
            assert!(error < 0.01, "Expected {freq}Hz, got {}Hz", result.frequency);
            assert!(
                result.confidence > 0.8,
                "confidence {} at {freq}Hz",
                result.confidence
            );
        }
    }

    #[test]
    fn test_silence_is_unvoiced() {
        let mut detector = PitchDetector::new(SR, 1024);
        let result = detector.detect(&[0.0; 2048]);
        assert!(!result.is_voiced());
        assert_eq!(result.note_name(), None);
    }

    #[test]
    fn test_short_buffer_is_unvoiced() {
        let mut detector = PitchDetector::new(SR, 1024);
        assert_eq!(detector.detect(&[0.5; 6]), PitchResult::default());
    }

    #[test]
    fn test_adaptive_threshold() {
        // Clean, loud, steady signal gets the strictest threshold
        assert!((PitchTracker::adaptive_threshold(1.0, 0.0) - 0.05).abs() < 1e-6);
        // Silence or pure transient gets the loosest
        assert!((PitchTracker::adaptive_threshold(0.0, 0.0) - 0.2).abs() < 1e-6);
        assert!((PitchTracker::adaptive_threshold(1.0, 1.0) - 0.2).abs() < 1e-6);
        assert!((PitchTracker::adaptive_threshold(0.5, 0.5) - 0.1625).abs() < 1e-6);
    }

    #[test]
    fn test_spectral_fallback() {
        let mut tracker = PitchTracker::new(PitchConfig::default(), SR);
        let bins = 1024;
        let bin_hz = SR * 0.5 / bins as f32;
        let mut spectrum = vec![0.01; bins];
        let peak_bin = (440.0 / bin_hz).round() as usize;
        spectrum[peak_bin] = 0.8;

        let result = tracker.track(&[], &spectrum, SR, 0.0, 0.0);
        assert_eq!(result.source, PitchSource::Spectrum);
        assert!((result.frequency - peak_bin as f32 * bin_hz).abs() < 1e-3);
        assert!(result.confidence > 0.6 && result.confidence <= 0.7);
    }

    #[test]
    fn test_spectral_fallback_needs_floor() {
        let mut tracker = PitchTracker::new(PitchConfig::default(), SR);
        let mut spectrum = vec![0.0; 1024];
        spectrum[20] = 0.05;
        assert!(!tracker.track(&[], &spectrum, SR, 0.0, 0.0).is_voiced());
    }

    #[test]
    fn test_freq_midi_conversion() {
        let (note, cents) = freq_to_midi(440.0);
        assert_eq!(note, 69);
        assert!(cents.abs() < 1.0);

        let (note, cents) = freq_to_midi(261.63);
        assert_eq!(note, 60);
        assert!(cents.abs() < 5.0);

        for midi in [36, 48, 60, 69, 72, 84, 96] {
            let (back, cents) = freq_to_midi(midi_to_freq(midi));
            assert_eq!(back, midi, "Round trip failed for MIDI {}", midi);
            assert!(cents.abs() < 0.01);
        }
        assert_eq!(freq_to_midi(f32::NAN), (0, 0.0));
    }

    #[test]
    fn test_note_names() {
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(0), "C-1");
    }
}
