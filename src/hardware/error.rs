//! Communication error types and handling

use thiserror::Error;

/// Communication error types for the UWB radio link
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommError {
    /// Port could not be opened (missing device, permission, already in use)
    #[error("failed to open {port}: {reason}")]
    ConnectionFailed { port: String, reason: String },
    /// A single read failed; the link is still usable
    #[error("read error on {port}: {reason}")]
    Read { port: String, reason: String },
    /// The link blocks longer per read than a bounded stop allows
    #[error("read timeout of {timeout_ms}ms on {port} exceeds {max_ms}ms")]
    ReadTimeoutTooLong {
        port: String,
        timeout_ms: u64,
        max_ms: u64,
    },
    /// The background reader thread could not be created
    #[error("failed to spawn reader thread: {reason}")]
    Spawn { reason: String },
}

/// Result type for communication operations
pub type CommResult<T> = Result<T, CommError>;

impl CommError {
    /// Transient errors are logged by the reader loop and never end it
    pub fn is_transient(&self) -> bool {
        matches!(self, CommError::Read { .. })
    }

    /// Errors that abort a `start()` call
    pub fn is_fatal(&self) -> bool {
        !self.is_transient()
    }
}
