//! Error types for auralis-analysis.

use thiserror::Error;

/// Error type for analysis operations.
///
/// Degenerate input (silence, empty buffers) and insufficient history are not
/// errors: they produce well-defined neutral values. Only configuration
/// problems, queue/worker failures and faults inside a single tick surface here.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A single tick failed; the analyzer is still usable for the next one.
    #[error("Tick {tick} failed: {reason}")]
    TickFailed { tick: u64, reason: String },

    #[error("Analysis worker disconnected")]
    Disconnected,

    #[error("Analysis queue full, frame dropped")]
    QueueFull,
}

/// Result type alias.
pub type Result<T> = core::result::Result<T, Error>;
