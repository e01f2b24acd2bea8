use std::path::PathBuf;
use std::time::Duration;

/// Failure to reach the container engine or to complete a request in time.
///
/// Every variant is a retryable condition from the caller's point of view;
/// the facade itself never retries. The engine's own error text stays on the
/// source chain for logging and is not meant to be user-facing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to open engine socket `{path}`: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("engine request `{op}` failed: {source}")]
    Request {
        op: &'static str,
        #[source]
        source: bollard::errors::Error,
    },
    #[error("engine request `{op}` timed out after {timeout:?}")]
    Timeout { op: &'static str, timeout: Duration },
}

impl Error {
    /// Name of the engine operation that failed.
    pub fn operation(&self) -> &'static str {
        match self {
            Error::Connect { .. } => "connect",
            Error::Request { op, .. } | Error::Timeout { op, .. } => op,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
