//! Byte-exact framing of a POST body.
//!
//! A body is `[` + record₁ + (`,` + recordᵢ)* + `]`. Size accounting elsewhere
//! relies on the constants here: every record costs its own length plus
//! [`PER_RECORD_OVERHEAD`], and a payload costs [`PER_PAYLOAD_OVERHEAD`] once
//! for the opening token, plus once more for the closing token when it is empty.

/// Opens the JSON array.
pub const RECORDS_START: &[u8] = b"[";
/// Separates two adjacent records.
pub const RECORD_SEPARATOR: &[u8] = b",";
/// Closes the JSON array.
pub const RECORDS_END: &[u8] = b"]";

/// Bytes charged per record on top of its serialized length.
pub const PER_RECORD_OVERHEAD: u64 = RECORD_SEPARATOR.len() as u64;
/// Bytes charged once per payload (the open token).
pub const PER_PAYLOAD_OVERHEAD: u64 = RECORDS_START.len() as u64;

/// Frames pre-serialized records into a request body.
///
/// Records are copied verbatim; nothing is re-serialized.
pub fn frame_records<R: AsRef<[u8]>>(records: &[R]) -> Vec<u8> {
    let capacity = framed_len(records.iter().map(|r| r.as_ref().len() as u64));
    let mut body = Vec::with_capacity(capacity as usize);

    body.extend_from_slice(RECORDS_START);
    for (i, record) in records.iter().enumerate() {
        if i > 0 {
            body.extend_from_slice(RECORD_SEPARATOR);
        }
        body.extend_from_slice(record.as_ref());
    }
    body.extend_from_slice(RECORDS_END);

    body
}

/// Size of the framed body for records of the given lengths.
pub fn framed_len(record_lengths: impl IntoIterator<Item = u64>) -> u64 {
    let (count, total) = record_lengths
        .into_iter()
        .fold((0u64, 0u64), |(count, total), len| (count + 1, total + len));
    let separators = count.saturating_sub(1) * RECORD_SEPARATOR.len() as u64;
    RECORDS_START.len() as u64 + total + separators + RECORDS_END.len() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_payload() {
        let body = frame_records::<Vec<u8>>(&[]);
        assert_eq!(body, b"[]");
        assert_eq!(framed_len([]), 2);
    }

    #[test]
    fn single_record_has_no_separator() {
        let body = frame_records(&[br#"{"id":"a"}"#.to_vec()]);
        assert_eq!(body, br#"[{"id":"a"}]"#);
    }

    #[test]
    fn separators_between_records_only() {
        let body = frame_records(&[b"1".to_vec(), b"2".to_vec(), b"3".to_vec()]);
        assert_eq!(body, b"[1,2,3]");
    }

    #[test]
    fn overhead_accounting_matches_framing() {
        // One payload overhead up front, one per-record overhead per record.
        // The final record's overhead pays for the closing bracket.
        let records = [b"abc".to_vec(), b"de".to_vec()];
        let accounted = PER_PAYLOAD_OVERHEAD
            + records
                .iter()
                .map(|r| r.len() as u64 + PER_RECORD_OVERHEAD)
                .sum::<u64>();
        assert_eq!(accounted, frame_records(&records).len() as u64);
    }

    #[test]
    fn overheads_follow_their_tokens() {
        assert_eq!(PER_PAYLOAD_OVERHEAD, RECORDS_START.len() as u64);
        assert_eq!(PER_RECORD_OVERHEAD, RECORD_SEPARATOR.len() as u64);
        // The last record's separator charge stands in for the closing token.
        assert_eq!(RECORDS_END.len(), RECORD_SEPARATOR.len());
    }

    proptest! {
        #[test]
        fn framed_len_matches_body(records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..32), 0..16)) {
            let body = frame_records(&records);
            prop_assert_eq!(body.len() as u64, framed_len(records.iter().map(|r| r.len() as u64)));
        }
    }
}
