//! Server configuration.

use batchsync_protocol::ServerLimits;
use std::collections::BTreeSet;

/// Collection timestamp a fresh server starts from (milliseconds).
pub const DEFAULT_INITIAL_TIMESTAMP: u64 = 1_500_000_000_000;

/// Configuration for the storage server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Limits the server advertises and enforces.
    pub limits: ServerLimits,
    /// Whether `batch` query parameters are honoured.
    pub batching_enabled: bool,
    /// Timestamp of every collection before its first write.
    pub initial_timestamp: u64,
    /// Record ids the server refuses to store.
    pub reject_ids: BTreeSet<String>,
}

impl ServerConfig {
    /// Creates a batching server with default limits.
    pub fn new() -> Self {
        Self {
            limits: ServerLimits::default(),
            batching_enabled: true,
            initial_timestamp: DEFAULT_INITIAL_TIMESTAMP,
            reject_ids: BTreeSet::new(),
        }
    }

    /// Sets the limits.
    pub fn with_limits(mut self, limits: ServerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Turns batching on or off.
    pub fn with_batching(mut self, enabled: bool) -> Self {
        self.batching_enabled = enabled;
        self
    }

    /// Sets the initial collection timestamp, rounded down to 10 ms.
    pub fn with_initial_timestamp(mut self, millis: u64) -> Self {
        self.initial_timestamp = millis - millis % 10;
        self
    }

    /// Makes the server refuse a record id.
    pub fn with_rejected_id(mut self, id: impl Into<String>) -> Self {
        self.reject_ids.insert(id.into());
        self
    }

    /// Returns true if the record id is refused.
    pub fn rejects(&self, id: &str) -> bool {
        self.reject_ids.contains(id)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert!(config.batching_enabled);
        assert_eq!(config.limits, ServerLimits::default());
        assert_eq!(config.initial_timestamp, DEFAULT_INITIAL_TIMESTAMP);
        assert!(!config.rejects("anything"));
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_limits(ServerLimits::default().with_max_post_records(3))
            .with_batching(false)
            .with_initial_timestamp(1_234_567)
            .with_rejected_id("bad");

        assert_eq!(config.limits.max_post_records, 3);
        assert!(!config.batching_enabled);
        assert_eq!(config.initial_timestamp, 1_234_560);
        assert!(config.rejects("bad"));
        assert!(!config.rejects("good"));
    }
}
