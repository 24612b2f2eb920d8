use carray_core::error::Error as CoreError;
use carray_core::id::ArrayHandle;
use thiserror::Error;

/// Result type local to carray-mem.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("allocation failed for {bytes} bytes: {reason}")]
    AllocFailed { bytes: usize, reason: String },

    #[error("stale registry handle {0}")]
    StaleHandle(ArrayHandle),

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<CoreError> for Error {
    fn from(e: CoreError) -> Self {
        match e {
            CoreError::AllocFailed { bytes, reason } => Error::AllocFailed { bytes, reason },
            CoreError::Invariant(msg) => Error::Invariant(msg),
            CoreError::Config(msg) => Error::Config(msg),
        }
    }
}
