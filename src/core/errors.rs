use std::time::Duration;
use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ForemanError>;

/// Unified error type for the foreman library.
#[derive(Error, Debug)]
pub enum ForemanError {
    /// A resource lock could not be acquired within its timeout. This is the
    /// only error the lock table surfaces.
    #[error("Could not acquire lock for {key} within {}s", timeout.as_secs_f64())]
    LockTimeout { key: String, timeout: Duration },

    /// The external completion capability failed (network, auth, process).
    #[error("Completion request failed: {0}")]
    Completion(String),

    /// A model response contained no decodable JSON.
    #[error("Invalid JSON response: {0}")]
    ResponseParse(String),

    /// An in-flight operation was cancelled by the caller.
    #[error("Operation was cancelled: {0}")]
    Cancelled(String),

    /// A remote endpoint returned a transport-level failure.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Wrapped anyhow::Error, for external `Worker` and `CompletionClient`
    /// implementations whose failures have no variant of their own.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
