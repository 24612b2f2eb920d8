use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("allocation failed for {bytes} bytes: {reason}")]
    AllocFailed { bytes: usize, reason: String },

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}
