//! Configuration for upload sessions.

use crate::error::{UploadError, UploadResult};
use batchsync_protocol::ServerLimits;
use url::Url;

/// Configuration for an upload session.
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Collection endpoint records are POSTed to.
    pub collection_url: String,
    /// Limits advertised by the server.
    pub limits: ServerLimits,
    /// Name of the worker thread that performs the uploads.
    pub worker_name: String,
}

impl UploadConfig {
    /// Creates a configuration with default limits.
    pub fn new(collection_url: impl Into<String>) -> Self {
        Self {
            collection_url: collection_url.into(),
            limits: ServerLimits::default(),
            worker_name: "batchsync-upload".to_string(),
        }
    }

    /// Sets the server limits.
    pub fn with_limits(mut self, limits: ServerLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Sets the worker thread name.
    pub fn with_worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }

    /// Byte limit of a single payload.
    pub fn payload_byte_limit(&self) -> u64 {
        self.limits.payload_byte_limit()
    }

    /// Checks the limits and parses the collection URL.
    pub fn validate(&self) -> UploadResult<Url> {
        let limits = &self.limits;
        let checks = [
            ("max_request_bytes", limits.max_request_bytes),
            ("max_post_records", limits.max_post_records),
            ("max_post_bytes", limits.max_post_bytes),
            ("max_total_records", limits.max_total_records),
            ("max_total_bytes", limits.max_total_bytes),
        ];
        if let Some((name, _)) = checks.iter().find(|(_, value)| *value == 0) {
            return Err(UploadError::InvalidConfig(format!("{name} must be positive")));
        }

        let url = Url::parse(&self.collection_url)?;
        if url.cannot_be_a_base() {
            return Err(UploadError::InvalidUrl(format!(
                "{} cannot carry query parameters",
                self.collection_url
            )));
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let limits = ServerLimits::default().with_max_post_records(5);
        let config = UploadConfig::new("https://sync.example.com/1.5/42/storage/bookmarks")
            .with_limits(limits)
            .with_worker_name("bookmarks-upload");

        assert_eq!(config.limits.max_post_records, 5);
        assert_eq!(config.worker_name, "bookmarks-upload");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_limit_is_rejected() {
        let config = UploadConfig::new("https://sync.example.com/storage/tabs")
            .with_limits(ServerLimits::default().with_max_total_records(0));
        let err = config.validate().unwrap_err();
        assert!(matches!(err, UploadError::InvalidConfig(ref m) if m.contains("max_total_records")));
    }

    #[test]
    fn bad_url_is_rejected() {
        let config = UploadConfig::new("not a url");
        assert!(matches!(config.validate(), Err(UploadError::InvalidUrl(_))));

        let config = UploadConfig::new("mailto:someone@example.com");
        assert!(matches!(config.validate(), Err(UploadError::InvalidUrl(_))));
    }

    #[test]
    fn payload_limit_honours_request_limit() {
        let config = UploadConfig::new("https://h/storage/c").with_limits(
            ServerLimits::default()
                .with_max_post_bytes(10_000)
                .with_max_request_bytes(4_000),
        );
        assert_eq!(config.payload_byte_limit(), 4_000);
    }
}
