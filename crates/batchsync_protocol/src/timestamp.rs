//! Timestamp header encoding.
//!
//! The server reports collection modification times as decimal seconds with
//! two fractional digits (`"1461251357.12"`). In-process they are integer
//! milliseconds.

use crate::error::{ProtocolError, ProtocolResult};

/// Parses a decimal-seconds header value into milliseconds.
///
/// Accepts integral (`"1461251357"`) and fractional (`"1461251357.1"`,
/// `"1461251357.123"`) forms. Digits beyond millisecond precision are truncated.
pub fn parse_timestamp(value: &str) -> ProtocolResult<u64> {
    let invalid = || ProtocolError::InvalidTimestamp(value.to_string());
    let trimmed = value.trim();

    let (secs, frac) = match trimmed.split_once('.') {
        Some((secs, frac)) => (secs, frac),
        None => (trimmed, ""),
    };

    if secs.is_empty() || !secs.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    if !frac.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let secs: u64 = secs.parse().map_err(|_| invalid())?;
    let mut millis = 0u64;
    for (i, digit) in frac.bytes().take(3).enumerate() {
        millis += u64::from(digit - b'0') * 10u64.pow(2 - i as u32);
    }

    secs.checked_mul(1000)
        .and_then(|ms| ms.checked_add(millis))
        .ok_or_else(invalid)
}

/// Formats milliseconds as a decimal-seconds header value (10 ms resolution).
pub fn format_timestamp(millis: u64) -> String {
    format!("{}.{:02}", millis / 1000, (millis % 1000) / 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_fractional() {
        assert_eq!(parse_timestamp("1461251357.12").unwrap(), 1_461_251_357_120);
        assert_eq!(parse_timestamp("1461251357.1").unwrap(), 1_461_251_357_100);
        assert_eq!(parse_timestamp("1461251357.1239").unwrap(), 1_461_251_357_123);
    }

    #[test]
    fn parse_integral() {
        assert_eq!(parse_timestamp("42").unwrap(), 42_000);
        assert_eq!(parse_timestamp(" 42 ").unwrap(), 42_000);
    }

    #[test]
    fn parse_rejects_garbage() {
        for value in ["", "-1", "abc", "1.2.3", ".5", "1e3", "1.x"] {
            assert!(parse_timestamp(value).is_err(), "accepted {value:?}");
        }
    }

    #[test]
    fn format_two_decimals() {
        assert_eq!(format_timestamp(1_461_251_357_120), "1461251357.12");
        assert_eq!(format_timestamp(5_000), "5.00");
        assert_eq!(format_timestamp(5_007), "5.00");
    }

    proptest! {
        #[test]
        fn format_then_parse_truncates_to_centiseconds(millis in 0u64..4_000_000_000_000) {
            let parsed = parse_timestamp(&format_timestamp(millis)).unwrap();
            prop_assert_eq!(parsed, millis - millis % 10);
        }
    }
}
