//! Property-based test generators using proptest.
//!
//! Provides strategies for records, record sets and server limits small
//! enough that a few dozen records exercise every flush path.

use crate::fixtures::record_with_size;
use batchsync_protocol::ServerLimits;
use batchsync_upload::Record;
use proptest::prelude::*;

/// Strategy for generating record identifiers.
pub fn guid_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z0-9_-]{12}").expect("Invalid regex")
}

/// Strategy for generating a single record of `min_size..max_size` bytes.
pub fn record_strategy(min_size: usize, max_size: usize) -> impl Strategy<Value = Record> {
    (guid_strategy(), min_size..max_size).prop_map(|(guid, size)| record_with_size(&guid, size))
}

/// Strategy for generating records with unique identifiers.
///
/// Identifiers are `rec-0000`, `rec-0001`, ... in intake order; only the
/// sizes are random.
pub fn record_set_strategy(
    max_records: usize,
    max_size: usize,
) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(20..max_size.max(21), 0..max_records).prop_map(|sizes| {
        sizes
            .into_iter()
            .enumerate()
            .map(|(i, size)| record_with_size(&format!("rec-{i:04}"), size))
            .collect()
    })
}

/// Strategy for generating small but valid server limits.
pub fn limits_strategy() -> impl Strategy<Value = ServerLimits> {
    (1u64..8, 40u64..400, 0u64..100, 1u64..20, 60u64..2_000).prop_map(
        |(post_records, post_bytes, request_slack, total_records, total_bytes)| ServerLimits {
            max_request_bytes: post_bytes + request_slack,
            max_post_records: post_records,
            max_post_bytes: post_bytes,
            max_total_records: total_records,
            max_total_bytes: total_bytes,
        },
    )
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
