//! Centralized error type for the auralis umbrella crate.
//!
//! Wraps the analysis error so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Analysis(#[from] auralis_analysis::Error),

    #[error("Audio tap already enabled")]
    TapAlreadyEnabled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
