//! # Auralis - Real-time Music Feature Engine
//!
//! Turns a live audio stream into a continuously updated [`FeatureFrame`]:
//! loudness, frequency bands, spectral shape, transients and drops, tempo and
//! beat phase, pitch, chroma, key and timbre, ready for audio-reactive visuals.
//!
//! ## Architecture
//!
//! - **auralis-analysis** - The analysis pipeline (single-threaded, one frame per tick)
//! - **auralis** - This crate: the engine that runs the pipeline on its own
//!   thread, fed by a frame queue or a PCM ring buffer
//!
//! ## Quick Start
//!
//! ```no_run
//! use auralis::prelude::*;
//!
//! let engine = AuralisEngine::builder()
//!     .sample_rate(44100.0)
//!     .build()?;
//!
//! // Feed PCM from the audio callback
//! let mut tap = engine.enable_audio_tap(1 << 16)?;
//!
//! // Read the latest features from the render loop
//! let frame = engine.latest();
//! if frame.rhythmic.is_beat {
//!     println!("beat at {:.2}s, {:.1} BPM", frame.time, frame.rhythmic.bpm);
//! }
//! # Ok::<(), auralis::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `serialization` - serde support for configuration and frame types

/// Re-export of auralis-analysis for direct access
pub use auralis_analysis as analysis;

pub use auralis_analysis::{
    // Configuration
    AnalyzerConfig,
    ChromaConfig,
    DynamicsConfig,
    // Data model
    FeatureFrame,
    Mode,
    OnsetConfig,
    PitchClass,
    PitchConfig,
    RawFrame,
    SpectralConfig,
    TempoConfig,
    TempoStrategy,
    TickOutput,
};

mod builder;
mod engine;
pub mod error;

pub use builder::AuralisEngineBuilder;
pub use engine::AuralisEngine;
pub use error::{Error, Result};

/// Convenience prelude for common imports
pub mod prelude {
    // Main engine
    pub use crate::{AuralisEngine, AuralisEngineBuilder};

    // Frames
    pub use crate::analysis::{FeatureFrame, Mode, PitchClass, RawFrame, TickOutput};

    // Configuration
    pub use crate::analysis::{AnalyzerConfig, TempoStrategy};

    // Synchronous pipeline
    pub use crate::analysis::Analyzer;

    // Audio tap producer
    pub use ringbuf::traits::Producer;
}
