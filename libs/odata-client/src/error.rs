use thiserror::Error;

/// Boxed error produced by a [`Transport`](crate::transport::Transport) implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified error type for all client operations
///
/// The variants follow the failure taxonomy of the client:
/// - `Configuration` - missing base URL, missing entity set before `find`
/// - `InvalidArgument` - programmer errors while building a query
/// - `Transport` / `HttpStatus` - the round-trip itself failed
/// - `ParseResponse` - a decoded body did not have the expected shape
///
/// Malformed JSON bodies are *not* an error: the decoder degrades them to an
/// empty result set.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Client or query is not configured well enough to execute
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Invalid operator/value combination, unknown binding kind, etc.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport error, surfaced unchanged
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// HTTP non-2xx status
    #[error("HTTP {status}: {body_preview}")]
    HttpStatus {
        status: http::StatusCode,
        body_preview: String,
    },

    /// Response could not be turned into the requested shape
    #[error("unable to parse response: {0}")]
    ParseResponse(String),

    /// Background execution task failed (panicked or was cancelled)
    #[error("request task failed: {0}")]
    Task(String),
}

impl Error {
    pub(crate) fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
