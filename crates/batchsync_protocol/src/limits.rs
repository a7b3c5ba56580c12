//! Server-advertised upload limits (`info/configuration`).

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// Default maximum size of any request body.
pub const DEFAULT_MAX_REQUEST_BYTES: u64 = 1_048_576;
/// Default maximum number of records in a single POST.
pub const DEFAULT_MAX_POST_RECORDS: u64 = 100;
/// Default maximum number of record bytes in a single POST.
pub const DEFAULT_MAX_POST_BYTES: u64 = 1_048_576;
/// Default maximum number of records in a batch.
pub const DEFAULT_MAX_TOTAL_RECORDS: u64 = 10_000;
/// Default maximum number of record bytes in a batch.
pub const DEFAULT_MAX_TOTAL_BYTES: u64 = 104_857_600;

/// Size limits the server imposes on uploads.
///
/// Deserializes from the server's `info/configuration` document. Keys the
/// server omits take their documented defaults; unknown keys are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerLimits {
    /// Maximum size of any request body.
    pub max_request_bytes: u64,
    /// Maximum number of records per POST.
    pub max_post_records: u64,
    /// Maximum number of bytes per POST.
    pub max_post_bytes: u64,
    /// Maximum number of records per batch.
    pub max_total_records: u64,
    /// Maximum number of bytes per batch.
    pub max_total_bytes: u64,
}

impl ServerLimits {
    /// Parses an `info/configuration` JSON document.
    ///
    /// Anything but a JSON object is refused, even when serde could map it
    /// onto the fields positionally.
    pub fn parse(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(ProtocolError::invalid_body("expected a JSON object"));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Byte limit a single payload must respect.
    pub fn payload_byte_limit(&self) -> u64 {
        self.max_post_bytes.min(self.max_request_bytes)
    }

    /// Sets the maximum request size.
    pub fn with_max_request_bytes(mut self, bytes: u64) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    /// Sets the maximum records per POST.
    pub fn with_max_post_records(mut self, records: u64) -> Self {
        self.max_post_records = records;
        self
    }

    /// Sets the maximum bytes per POST.
    pub fn with_max_post_bytes(mut self, bytes: u64) -> Self {
        self.max_post_bytes = bytes;
        self
    }

    /// Sets the maximum records per batch.
    pub fn with_max_total_records(mut self, records: u64) -> Self {
        self.max_total_records = records;
        self
    }

    /// Sets the maximum bytes per batch.
    pub fn with_max_total_bytes(mut self, bytes: u64) -> Self {
        self.max_total_bytes = bytes;
        self
    }
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            max_post_records: DEFAULT_MAX_POST_RECORDS,
            max_post_bytes: DEFAULT_MAX_POST_BYTES,
            max_total_records: DEFAULT_MAX_TOTAL_RECORDS,
            max_total_bytes: DEFAULT_MAX_TOTAL_BYTES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_full_document() {
        let doc = br#"{
            "max_request_bytes": 2000,
            "max_post_records": 10,
            "max_post_bytes": 1000,
            "max_total_records": 50,
            "max_total_bytes": 5000,
            "max_record_payload_bytes": 256
        }"#;
        let limits = ServerLimits::parse(doc).unwrap();
        assert_eq!(limits.max_request_bytes, 2000);
        assert_eq!(limits.max_post_records, 10);
        assert_eq!(limits.max_post_bytes, 1000);
        assert_eq!(limits.max_total_records, 50);
        assert_eq!(limits.max_total_bytes, 5000);
    }

    #[test]
    fn missing_keys_use_defaults() {
        let limits = ServerLimits::parse(br#"{"max_post_records": 3}"#).unwrap();
        assert_eq!(limits.max_post_records, 3);
        assert_eq!(limits.max_post_bytes, DEFAULT_MAX_POST_BYTES);
        assert_eq!(limits.max_total_records, DEFAULT_MAX_TOTAL_RECORDS);
    }

    #[test]
    fn rejects_non_object() {
        assert!(ServerLimits::parse(b"[1, 2]").is_err());
        assert!(ServerLimits::parse(b"7").is_err());
        assert!(ServerLimits::parse(b"null").is_err());
    }

    #[test]
    fn rejects_positional_array() {
        let err = ServerLimits::parse(b"[1, 2, 3, 4, 5]").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidBody(_)));
        assert!(ServerLimits::parse(br#"{"max_post_records": "ten"}"#).is_err());
    }

    #[test]
    fn payload_byte_limit_is_smaller_of_post_and_request() {
        let limits = ServerLimits::default()
            .with_max_post_bytes(500)
            .with_max_request_bytes(300);
        assert_eq!(limits.payload_byte_limit(), 300);

        let limits = limits.with_max_request_bytes(900);
        assert_eq!(limits.payload_byte_limit(), 500);
    }
}
