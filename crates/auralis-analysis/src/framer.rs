//! PCM to [`RawFrame`] conversion.
//!
//! For hosts that only have a sample stream: the newest `fft_size` samples are
//! Hann-windowed and transformed with `rustfft`; magnitudes of the first
//! `fft_size / 2` bins are scaled so a full-scale sine peaks near 1.0.

use crate::frame::RawFrame;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

/// Default FFT size (1024 spectrum bins).
pub const DEFAULT_FFT_SIZE: usize = 2048;

/// Turns windows of PCM samples into analysis frames.
pub struct SpectrumFramer {
    fft_size: usize,
    waveform_len: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    /// 2 / Σ window
    gain: f32,
    buffer: Vec<Complex<f32>>,
}

impl SpectrumFramer {
    /// # Arguments
    /// * `fft_size` - FFT length, rounded up to a power of two
    /// * `waveform_len` - Samples copied into [`RawFrame::waveform`]
    pub fn new(fft_size: usize, waveform_len: usize) -> Self {
        let fft_size = fft_size.max(4).next_power_of_two();
        let window = Self::create_hann_window(fft_size);
        let window_sum: f32 = window.iter().sum();
        let fft = FftPlanner::new().plan_fft_forward(fft_size);
        Self {
            fft_size,
            waveform_len,
            fft,
            gain: if window_sum > 0.0 { 2.0 / window_sum } else { 0.0 },
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of spectrum bins per frame.
    pub fn bins(&self) -> usize {
        self.fft_size / 2
    }

    /// Samples the framer wants to see per frame.
    pub fn history_len(&self) -> usize {
        self.fft_size.max(self.waveform_len)
    }

    fn create_hann_window(size: usize) -> Vec<f32> {
        (0..size)
            .map(|i| {
                let angle = 2.0 * core::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - angle.cos())
            })
            .collect()
    }

    /// Build a frame from the newest samples. Short input is zero-padded at the front.
    pub fn frame(&mut self, samples: &[f32], sample_rate: f32) -> RawFrame {
        let take = samples.len().min(self.fft_size);
        let pad = self.fft_size - take;
        let recent = &samples[samples.len() - take..];

        for (i, slot) in self.buffer.iter_mut().enumerate() {
            let s = if i < pad { 0.0 } else { recent[i - pad] };
            let s = if s.is_finite() { s } else { 0.0 };
            *slot = Complex::new(s * self.window[i], 0.0);
        }
        self.fft.process(&mut self.buffer);

        let spectrum = self.buffer[..self.fft_size / 2]
            .iter()
            .map(|c| (c.norm() * self.gain).clamp(0.0, 1.0))
            .collect();

        let wave_take = samples.len().min(self.waveform_len);
        let waveform = samples[samples.len() - wave_take..]
            .iter()
            .map(|&s| if s.is_finite() { s.clamp(-1.0, 1.0) } else { 0.0 })
            .collect();

        RawFrame::new(spectrum, waveform, sample_rate)
    }
}

impl RawFrame {
    /// One-shot conversion of a PCM window. Prefer [`SpectrumFramer`] for streams.
    pub fn from_pcm(samples: &[f32], sample_rate: f32, fft_size: usize) -> Self {
        SpectrumFramer::new(fft_size, fft_size).frame(samples, sample_rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: f32 = 44100.0;

    fn sine(freq: f32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * freq * i as f32 / SR).sin())
            .collect()
    }

    #[test]
    fn test_sizes() {
        let mut framer = SpectrumFramer::new(2000, 2048);
        assert_eq!(framer.fft_size(), 2048);
        assert_eq!(framer.bins(), 1024);
        let frame = framer.frame(&sine(440.0, 4096), SR);
        assert_eq!(frame.spectrum.len(), 1024);
        assert_eq!(frame.waveform.len(), 2048);
        assert_eq!(frame.sample_rate, SR);
    }

    #[test]
    fn test_sine_peaks_at_its_bin() {
        let mut framer = SpectrumFramer::new(DEFAULT_FFT_SIZE, DEFAULT_FFT_SIZE);
        let frame = framer.frame(&sine(1000.0, DEFAULT_FFT_SIZE), SR);
        let peak = frame
            .spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let expected = (1000.0 / frame.bin_hz()).round() as usize;
        assert!(peak.abs_diff(expected) <= 1, "peak bin {peak}, expected {expected}");
        let level = frame.spectrum[peak];
        assert!(level > 0.4 && level <= 1.0, "level = {level}");
    }

    #[test]
    fn test_short_input_is_padded() {
        let frame = RawFrame::from_pcm(&sine(440.0, 100), SR, 1024);
        assert_eq!(frame.spectrum.len(), 512);
        assert_eq!(frame.waveform.len(), 100);
        assert!(frame.spectrum.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_silence() {
        let frame = RawFrame::from_pcm(&[0.0; 2048], SR, 2048);
        assert!(frame.is_degenerate(1e-4));
    }
}
