//! Error types for the wire protocol.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while parsing or producing protocol messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// JSON body could not be parsed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A timestamp header value was not a non-negative decimal number of seconds.
    #[error("invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// Body was valid JSON but had the wrong shape.
    #[error("invalid body: {0}")]
    InvalidBody(String),
}

impl ProtocolError {
    /// Creates an invalid body error.
    pub fn invalid_body(message: impl Into<String>) -> Self {
        Self::InvalidBody(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ProtocolError::InvalidTimestamp("abc".into());
        assert_eq!(err.to_string(), "invalid timestamp: \"abc\"");

        let err = ProtocolError::invalid_body("expected object");
        assert!(err.to_string().contains("expected object"));
    }

    #[test]
    fn json_conversion() {
        let err: ProtocolError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ProtocolError::Json(_)));
    }
}
