//! Tolerance constants for analysis testing.
//!
//! Different features carry different precision requirements.

/// Floating point rounding errors (normalization sums, exact copies).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Relative pitch accuracy required from YIN on a clean sine (1%).
pub const PITCH_RELATIVE: f32 = 0.01;

/// Absolute BPM accuracy on a synthetic periodic ODF.
pub const BPM_EPSILON: f32 = 1.0;

/// Minimum YIN confidence on a clean sine.
pub const MIN_PITCH_CONFIDENCE: f32 = 0.8;

/// Minimum key correlation for a clean triad.
pub const MIN_KEY_CORRELATION: f32 = 0.6;
