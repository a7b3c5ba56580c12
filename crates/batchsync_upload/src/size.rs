//! Byte and record accounting shared by payloads and batches.

use crate::error::{UploadError, UploadResult};
use batchsync_protocol::PER_PAYLOAD_OVERHEAD;

/// Tracks how many records and bytes a buffer holds against its maxima.
///
/// The byte count starts at [`PER_PAYLOAD_OVERHEAD`] (the opening bracket).
/// Each added delta already carries the record's separator, which for the
/// last record pays for the closing bracket, so a non-empty count equals the
/// framed body size exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizeTracker {
    byte_count: u64,
    record_count: u64,
    smallest_delta: Option<u64>,
    max_bytes: u64,
    max_records: u64,
    unlimited: bool,
}

impl SizeTracker {
    /// Creates a bounded tracker.
    pub fn new(max_bytes: u64, max_records: u64) -> Self {
        Self {
            byte_count: PER_PAYLOAD_OVERHEAD,
            record_count: 0,
            smallest_delta: None,
            max_bytes,
            max_records,
            unlimited: false,
        }
    }

    /// Creates a tracker for which everything fits.
    pub fn unlimited() -> Self {
        let mut tracker = Self::new(u64::MAX, u64::MAX);
        tracker.unlimited = true;
        tracker
    }

    /// Switches unlimited mode on or off. Counters are kept.
    pub fn set_unlimited(&mut self, unlimited: bool) {
        self.unlimited = unlimited;
    }

    /// Returns true if limits are not enforced.
    pub fn is_unlimited(&self) -> bool {
        self.unlimited
    }

    /// Returns true if a record of `delta` bytes fits right now.
    pub fn can_fit(&self, delta: u64) -> bool {
        self.unlimited || self.fits(delta, self.record_count, self.byte_count)
    }

    /// Returns true if a record of `delta` bytes would fit an empty buffer.
    pub fn fits_when_empty(&self, delta: u64) -> bool {
        self.unlimited || self.fits(delta, 0, PER_PAYLOAD_OVERHEAD)
    }

    /// Adds a record of `delta` bytes and estimates whether the buffer is full.
    ///
    /// "Full" means a record half the size of the smallest one seen so far
    /// would no longer fit. Erring toward early flushes keeps uploads from
    /// overflowing. Fails if the record does not fit; callers check
    /// [`can_fit`](Self::can_fit) first.
    pub fn add_and_estimate_if_full(&mut self, delta: u64) -> UploadResult<bool> {
        if !self.can_fit(delta) {
            return Err(UploadError::BufferOverflow(format!(
                "{} bytes do not fit ({} records, {} of {} bytes used)",
                delta, self.record_count, self.byte_count, self.max_bytes
            )));
        }

        self.record_count += 1;
        self.byte_count = self.byte_count.saturating_add(delta);
        let smallest = self.smallest_delta.map_or(delta, |s| s.min(delta));
        self.smallest_delta = Some(smallest);

        if self.unlimited {
            return Ok(false);
        }
        Ok(!self.fits(smallest / 2, self.record_count, self.byte_count))
    }

    /// Running byte total. An empty buffer also counts its closing bracket.
    pub fn byte_count(&self) -> u64 {
        if self.record_count == 0 {
            self.byte_count + PER_PAYLOAD_OVERHEAD
        } else {
            self.byte_count
        }
    }

    /// Number of records added.
    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    /// Returns true if no record was added.
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Byte maximum.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Record maximum.
    pub fn max_records(&self) -> u64 {
        self.max_records
    }

    /// A fresh tracker with the same limits and mode.
    pub fn fresh(&self) -> Self {
        let mut tracker = Self::new(self.max_bytes, self.max_records);
        tracker.unlimited = self.unlimited;
        tracker
    }

    fn fits(&self, delta: u64, record_count: u64, byte_count: u64) -> bool {
        record_count < self.max_records && byte_count.saturating_add(delta) <= self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tracker_reports_framing() {
        let tracker = SizeTracker::new(100, 10);
        assert!(tracker.is_empty());
        assert_eq!(tracker.byte_count(), 2);
        assert_eq!(tracker.record_count(), 0);
    }

    #[test]
    fn can_fit_respects_both_limits() {
        let mut tracker = SizeTracker::new(20, 2);
        assert!(tracker.can_fit(19));
        assert!(!tracker.can_fit(20));

        tracker.add_and_estimate_if_full(5).unwrap();
        tracker.add_and_estimate_if_full(5).unwrap();
        assert_eq!(tracker.byte_count(), 11);
        // Record limit reached even though bytes remain.
        assert!(!tracker.can_fit(1));
    }

    #[test]
    fn estimate_uses_half_of_smallest_record() {
        // Capacity 1 + 10 + 10 = 21 bytes after two records of 10.
        let mut tracker = SizeTracker::new(25, 100);
        assert!(!tracker.add_and_estimate_if_full(10).unwrap());
        // 21 used, half of smallest is 5, 26 > 25: estimated full.
        assert!(tracker.add_and_estimate_if_full(10).unwrap());
        // A small record still fits though.
        assert!(tracker.can_fit(4));
    }

    #[test]
    fn estimate_full_on_record_limit() {
        let mut tracker = SizeTracker::new(1000, 2);
        assert!(!tracker.add_and_estimate_if_full(3).unwrap());
        assert!(tracker.add_and_estimate_if_full(3).unwrap());
    }

    #[test]
    fn add_without_room_is_an_error() {
        let mut tracker = SizeTracker::new(10, 5);
        let err = tracker.add_and_estimate_if_full(10).unwrap_err();
        assert!(matches!(err, UploadError::BufferOverflow(_)));
        assert!(tracker.is_empty());
        assert_eq!(tracker.byte_count(), 2);
    }

    #[test]
    fn unlimited_always_fits_and_never_fills() {
        let mut tracker = SizeTracker::new(10, 1);
        tracker.set_unlimited(true);
        for _ in 0..5 {
            assert!(tracker.can_fit(1_000));
            assert!(!tracker.add_and_estimate_if_full(1_000).unwrap());
        }
        assert_eq!(tracker.record_count(), 5);
        assert!(SizeTracker::unlimited().fits_when_empty(u64::MAX / 2));
    }

    #[test]
    fn fits_when_empty_ignores_current_usage() {
        let mut tracker = SizeTracker::new(12, 3);
        tracker.add_and_estimate_if_full(10).unwrap();
        assert!(!tracker.can_fit(10));
        assert!(tracker.fits_when_empty(10));
        assert!(!tracker.fits_when_empty(12));
    }

    #[test]
    fn fresh_keeps_limits_and_mode() {
        let mut tracker = SizeTracker::new(50, 4);
        tracker.add_and_estimate_if_full(7).unwrap();
        tracker.set_unlimited(true);

        let fresh = tracker.fresh();
        assert!(fresh.is_empty());
        assert!(fresh.is_unlimited());
        assert_eq!(fresh.max_bytes(), 50);
        assert_eq!(fresh.max_records(), 4);
    }
}
