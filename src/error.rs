//! Error types for the NVMe device manager
//!
//! Provides structured error types for all daemon components including the
//! MI transport worker, the admin command surface, drive state machines,
//! and discovery.

use thiserror::Error;

/// Unified error type for the daemon
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The MCTP endpoint is gone or the shared MI worker has shut down.
    #[error("no such device")]
    NoSuchDevice,

    /// The MI library reported a non-zero protocol response status.
    #[error("bad message: {0}")]
    BadMessage(String),

    /// The MI library failed with an OS error.
    #[error("os error {0}")]
    Os(i32),

    /// A raw admin transfer exceeded its per-call timeout.
    #[error("command timed out")]
    Timeout,

    // =========================================================================
    // Caller Errors
    // =========================================================================
    /// The caller violated a command precondition.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The requested operation conflicts with one already in progress.
    #[error("not allowed: {0}")]
    NotAllowed(String),

    // =========================================================================
    // Ambient Errors
    // =========================================================================
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Check if this error is transient.
    ///
    /// Transient failures leave the drive usable; callers retry or resume on
    /// the next poll tick rather than tearing state down.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::NoSuchDevice | Error::BadMessage(_) | Error::Os(_) | Error::Timeout
        )
    }
}

/// Result type alias for the daemon
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(Error::NoSuchDevice.is_transient());
        assert!(Error::Timeout.is_transient());
        assert!(Error::Os(110).is_transient());
        assert!(Error::BadMessage("Internal Error".into()).is_transient());
        assert!(!Error::NotAllowed("sanitize in progress".into()).is_transient());
        assert!(!Error::InvalidArgument("unknown log page".into()).is_transient());
        assert!(!Error::Configuration("bad file".into()).is_transient());
    }
}
