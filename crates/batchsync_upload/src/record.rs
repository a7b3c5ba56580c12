//! Records handed to the uploader.

use batchsync_protocol::PER_RECORD_OVERHEAD;

/// A record ready for upload: its identifier and its serialized JSON object.
///
/// The bytes are sent verbatim; the uploader never re-serializes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unique record identifier.
    pub guid: String,
    /// Serialized JSON object.
    pub payload: Vec<u8>,
}

impl Record {
    /// Creates a record.
    pub fn new(guid: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            guid: guid.into(),
            payload: payload.into(),
        }
    }

    /// Length of the serialized record.
    pub fn len(&self) -> u64 {
        self.payload.len() as u64
    }

    /// Returns true if the serialized record is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Bytes this record adds to a payload, including its separator.
    pub fn delta_size(&self) -> u64 {
        self.len() + PER_RECORD_OVERHEAD
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delta_includes_separator() {
        let record = Record::new("abc", br#"{"id":"abc"}"#.to_vec());
        assert_eq!(record.len(), 12);
        assert_eq!(record.delta_size(), 13);
        assert!(!record.is_empty());
    }
}
