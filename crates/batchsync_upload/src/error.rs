//! Error types for the uploader.

use thiserror::Error;

/// Result type for upload operations.
pub type UploadResult<T> = Result<T, UploadError>;

/// Errors that can occur while uploading records.
///
/// Per-record errors reach the caller through
/// [`StoreDelegate::on_record_store_failed`](crate::StoreDelegate::on_record_store_failed);
/// session-level ones additionally through
/// [`StoreDelegate::on_store_failed`](crate::StoreDelegate::on_store_failed).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// A single record can never fit into a payload or batch.
    #[error("record of {size} bytes exceeds the limit of {limit} bytes")]
    RecordTooLarge {
        /// Record size including per-record and per-payload overhead.
        size: u64,
        /// The limit it exceeds.
        limit: u64,
    },

    /// Server returned a batch token inconsistent with the open batch.
    #[error("batch token modified: expected {expected:?}, got {actual:?}")]
    TokenModified {
        /// Token of the open batch.
        expected: Option<String>,
        /// Token the server returned.
        actual: Option<String>,
    },

    /// Guard timestamp changed on a payload that was not a commit.
    #[error("last-modified changed unexpectedly from {previous} to {current}")]
    LastModifiedChangedUnexpectedly {
        /// Timestamp before the request.
        previous: u64,
        /// Timestamp in the response.
        current: u64,
    },

    /// Guard timestamp stayed the same on a commit.
    #[error("last-modified did not change from {0} on commit")]
    LastModifiedDidNotChange(u64),

    /// Network or transport error.
    #[error("transport error: {0}")]
    Transport(String),

    /// Server answered with a status outside the protocol's success codes.
    #[error("unexpected http status {0}")]
    HttpStatus(u16),

    /// Another client modified the collection (precondition failed).
    #[error("collection modified concurrently")]
    ConcurrentModification,

    /// Success response without the guard timestamp header.
    #[error("response is missing the last-modified header")]
    MissingLastModified,

    /// Success response with an unreadable body or header.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Batch-accepted response without a batch token.
    #[error("batch response did not carry a batch token")]
    MissingBatchToken,

    /// Request fully applied although the payload was not a commit of the open batch.
    #[error("request applied outside of a commit while a batch is open")]
    UnexpectedApplied,

    /// Server listed the record as failed.
    #[error("record rejected by server: {0}")]
    RecordRejected(String),

    /// Server acknowledged the payload but did not mention the record.
    #[error("record not acknowledged by server")]
    RecordNotAcknowledged,

    /// An earlier upload in this session failed; nothing more is sent.
    #[error("previous upload failed")]
    PreviousPostFailed,

    /// Record was staged in a batch that can no longer be committed.
    #[error("batch abandoned before commit")]
    BatchAbandoned,

    /// Size accounting was asked to add something that does not fit.
    #[error("buffer overflow: {0}")]
    BufferOverflow(String),

    /// Record handed over after the end of intake was signalled.
    #[error("upload session already closed")]
    SessionClosed,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Collection URL could not be parsed.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The upload worker thread could not be started.
    #[error("worker unavailable: {0}")]
    Worker(String),
}

impl UploadError {
    /// Returns true if the same records may succeed on a later sync.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Transport(_)
                | UploadError::HttpStatus(_)
                | UploadError::ConcurrentModification
                | UploadError::PreviousPostFailed
                | UploadError::BatchAbandoned
                | UploadError::RecordNotAcknowledged
        )
    }

    /// Returns true if this error aborts the whole session.
    ///
    /// Such errors are reported to
    /// [`StoreDelegate::on_store_failed`](crate::StoreDelegate::on_store_failed)
    /// in addition to the per-record callbacks.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            UploadError::TokenModified { .. }
                | UploadError::LastModifiedChangedUnexpectedly { .. }
                | UploadError::LastModifiedDidNotChange(_)
                | UploadError::ConcurrentModification
                | UploadError::MissingLastModified
                | UploadError::MalformedResponse(_)
                | UploadError::MissingBatchToken
                | UploadError::UnexpectedApplied
        )
    }
}

impl From<batchsync_protocol::ProtocolError> for UploadError {
    fn from(err: batchsync_protocol::ProtocolError) -> Self {
        UploadError::MalformedResponse(err.to_string())
    }
}

impl From<url::ParseError> for UploadError {
    fn from(err: url::ParseError) -> Self {
        UploadError::InvalidUrl(err.to_string())
    }
}
