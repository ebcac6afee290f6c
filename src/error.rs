//! Error types for macvm.

use thiserror::Error;

/// Result type alias using macvm's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in macvm operations.
///
/// Every failure is terminal for the current invocation; nothing in this
/// crate retries. A failed mutation aborts before the record is persisted.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input. The message names the offending
    /// field or value.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Named VM has no configuration record.
    #[error("vm not found: {0}")]
    VmNotFound(String),

    /// Operation requires a guest capability this record does not have.
    #[error("unsupported for this guest: {0}")]
    PlatformUnsupported(String),

    /// Failed to load a configuration record.
    #[error("failed to load config: {0}")]
    ConfigLoad(String),

    /// Failed to save a configuration record.
    #[error("failed to save config: {0}")]
    ConfigSave(String),

    /// IO error wrapper.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create an invalid-argument error with a message.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a platform-unsupported error with a message.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::PlatformUnsupported(msg.into())
    }
}
