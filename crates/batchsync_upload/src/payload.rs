//! The open payload: records that will go out in a single POST.

use crate::error::UploadResult;
use crate::size::SizeTracker;
use batchsync_protocol::framed_len;

/// Records buffered for the next POST, with their identifiers.
#[derive(Debug)]
pub struct Payload {
    tracker: SizeTracker,
    records: Vec<Vec<u8>>,
    guids: Vec<String>,
}

/// Frozen contents of a payload, handed to an upload task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadSnapshot {
    /// Serialized records, in intake order.
    pub records: Vec<Vec<u8>>,
    /// Identifiers, parallel to `records`.
    pub guids: Vec<String>,
    /// Framed size of the body these records produce.
    pub byte_count: u64,
}

impl PayloadSnapshot {
    /// A snapshot without records (an empty commit).
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            guids: Vec::new(),
            byte_count: framed_len([]),
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if there are no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Payload {
    /// Creates an empty payload bounded by the given limits.
    pub fn new(max_bytes: u64, max_records: u64) -> Self {
        Self {
            tracker: SizeTracker::new(max_bytes, max_records),
            records: Vec::new(),
            guids: Vec::new(),
        }
    }

    /// Returns true if a record of `delta` bytes fits.
    pub fn can_fit(&self, delta: u64) -> bool {
        self.tracker.can_fit(delta)
    }

    /// Adds a record. Returns true if the payload is now estimated full.
    pub fn add(&mut self, delta: u64, record: Vec<u8>, guid: String) -> UploadResult<bool> {
        let full = self.tracker.add_and_estimate_if_full(delta)?;
        self.records.push(record);
        self.guids.push(guid);
        Ok(full)
    }

    /// Returns true if no record was added.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Number of buffered records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Framed size of the buffered records.
    pub fn byte_count(&self) -> u64 {
        self.tracker.byte_count()
    }

    /// Identifiers of the buffered records.
    pub fn guids(&self) -> &[String] {
        &self.guids
    }

    /// An empty payload with the same limits.
    pub fn next_payload(&self) -> Payload {
        Payload {
            tracker: self.tracker.fresh(),
            records: Vec::new(),
            guids: Vec::new(),
        }
    }

    /// Copies the contents, leaving the payload untouched.
    pub fn snapshot(&self) -> PayloadSnapshot {
        PayloadSnapshot {
            records: self.records.clone(),
            guids: self.guids.clone(),
            byte_count: self.byte_count(),
        }
    }

    /// Discards the contents.
    pub fn reset(&mut self) {
        *self = self.next_payload();
    }

    /// Moves the contents out and leaves an empty payload in place.
    ///
    /// Same as [`snapshot`](Self::snapshot) followed by
    /// [`reset`](Self::reset), without copying.
    pub fn take_snapshot(&mut self) -> PayloadSnapshot {
        let byte_count = self.byte_count();
        let drained = std::mem::replace(self, self.next_payload());
        PayloadSnapshot {
            records: drained.records,
            guids: drained.guids,
            byte_count,
        }
    }
}
