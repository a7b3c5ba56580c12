//! Error types for the storage server.

use batchsync_protocol::{STATUS_BAD_REQUEST, STATUS_NOT_FOUND, STATUS_PRECONDITION_FAILED};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur while handling a request.
///
/// Every variant maps to an HTTP status through [`status_code`](Self::status_code).
#[derive(Error, Debug)]
pub enum ServerError {
    /// Malformed request.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No collection at that path.
    #[error("not found: {0}")]
    NotFound(String),

    /// Request or batch exceeds a limit.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Batch token the server does not know.
    #[error("unknown batch: {0}")]
    UnknownBatch(String),

    /// The collection changed after the client's guard timestamp.
    #[error("collection modified at {last_modified}, after {since}")]
    PreconditionFailed {
        /// Guard timestamp sent by the client.
        since: u64,
        /// Current collection timestamp.
        last_modified: u64,
    },

    /// Body is not valid JSON.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Header value could not be read.
    #[error("protocol error: {0}")]
    Protocol(#[from] batchsync_protocol::ProtocolError),
}

impl ServerError {
    /// HTTP status this error is answered with.
    pub fn status_code(&self) -> u16 {
        match self {
            ServerError::NotFound(_) => STATUS_NOT_FOUND,
            ServerError::PreconditionFailed { .. } => STATUS_PRECONDITION_FAILED,
            ServerError::InvalidRequest(_)
            | ServerError::LimitExceeded(_)
            | ServerError::UnknownBatch(_)
            | ServerError::Json(_)
            | ServerError::Protocol(_) => STATUS_BAD_REQUEST,
        }
    }

    /// Returns true for a guard timestamp conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServerError::PreconditionFailed { .. })
    }
}
