//! Statistics about an upload session.

/// Counters collected while a session runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadStats {
    /// POST requests sent.
    pub payloads_posted: u64,
    /// POST requests that carried `commit=true`.
    pub commits_posted: u64,
    /// Body bytes sent.
    pub bytes_posted: u64,
    /// Payloads failed without a request because an earlier one failed.
    pub payloads_failed_locally: u64,
    /// Records reported as stored.
    pub records_succeeded: u64,
    /// Records reported as failed.
    pub records_failed: u64,
    /// Last error message.
    pub last_error: Option<String>,
}

impl UploadStats {
    /// Records reported either way.
    pub fn records_reported(&self) -> u64 {
        self.records_succeeded + self.records_failed
    }
}
