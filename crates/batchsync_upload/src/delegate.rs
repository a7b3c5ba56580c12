//! Outcome callbacks.

use crate::error::UploadError;

/// Receives the outcome of every record and of the session.
///
/// Each record handed to the uploader is reported exactly once, either as
/// succeeded or as failed. [`store_done`](Self::store_done) is called exactly
/// once per session, after every record was reported. Callbacks arrive on the
/// upload worker, or on the calling thread for records rejected at intake.
pub trait StoreDelegate: Send + Sync {
    /// The record is durably stored.
    fn on_record_store_succeeded(&self, guid: &str);

    /// The record was not stored.
    fn on_record_store_failed(&self, error: &UploadError, guid: &str);

    /// The session hit an error that aborts it (conflict, protocol violation).
    fn on_store_failed(&self, error: &UploadError);

    /// The session is over. `timestamp` is the server time of the last
    /// durable write, or 0 if nothing was written.
    fn store_done(&self, timestamp: u64);
}
