//! Test helpers and fixtures for Auralis integration tests
//!
//! Signal generators produce deterministic PCM and spectra so every test can
//! be replayed bit-for-bit.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (normalization)
//! - `PITCH_RELATIVE` (1%): YIN frequency accuracy
//! - `BPM_EPSILON` (1 BPM): Tempo convergence

pub mod tolerances;

use auralis::prelude::*;

/// Default test sample rate
pub const TEST_SAMPLE_RATE: f32 = 44100.0;

/// Default analysis tick rate
pub const TEST_TICK_RATE: f32 = 30.0;

/// FFT size used to build frames (1024 bins)
pub const TEST_FFT_SIZE: usize = 2048;

/// Route engine logs to the test harness output (first call wins).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Create an engine with the default configuration.
pub fn test_engine() -> AuralisEngine {
    init_tracing();
    AuralisEngine::builder()
        .sample_rate(TEST_SAMPLE_RATE)
        .tick_rate(TEST_TICK_RATE)
        .build()
        .expect("Failed to create test engine")
}

/// Create a synchronous analyzer with the default configuration.
pub fn test_analyzer() -> Analyzer {
    Analyzer::new(AnalyzerConfig::default()).expect("Failed to create test analyzer")
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f32, amplitude: f32, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / TEST_SAMPLE_RATE as f64;
            amplitude * (2.0 * std::f64::consts::PI * frequency as f64 * t).sin() as f32
        })
        .collect()
}

/// Generate white noise (random samples in -amplitude..amplitude).
pub fn generate_noise(num_samples: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    // Simple LCG for reproducible "random" noise
    let mut rng = seed;
    (0..num_samples)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let unit = (rng >> 33) as f32 / (1u64 << 31) as f32;
            amplitude * (unit * 2.0 - 1.0)
        })
        .collect()
}

/// Frame of a pure sine.
pub fn sine_frame(frequency: f32, amplitude: f32) -> RawFrame {
    RawFrame::from_pcm(
        &generate_sine(frequency, amplitude, TEST_FFT_SIZE),
        TEST_SAMPLE_RATE,
        TEST_FFT_SIZE,
    )
}

/// All-zero frame with realistic buffer sizes.
pub fn silent_frame() -> RawFrame {
    RawFrame::new(
        vec![0.0; TEST_FFT_SIZE / 2],
        vec![0.0; TEST_FFT_SIZE],
        TEST_SAMPLE_RATE,
    )
}

/// Broadband frame: every spectrum bin at `level`.
pub fn flat_frame(level: f32) -> RawFrame {
    RawFrame::new(
        vec![level; TEST_FFT_SIZE / 2],
        generate_noise(TEST_FFT_SIZE, level, 7),
        TEST_SAMPLE_RATE,
    )
}

/// Broadband bursts every `period` ticks over a quiet floor, starting at tick 0.
pub fn beat_frames(period: usize, ticks: usize) -> Vec<RawFrame> {
    (0..ticks)
        .map(|t| {
            if t % period == 0 {
                flat_frame(0.8)
            } else {
                flat_frame(0.05)
            }
        })
        .collect()
}

/// Index of the largest chroma entry.
pub fn chroma_peak(chroma: &[f32; 12]) -> usize {
    chroma
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0)
}
