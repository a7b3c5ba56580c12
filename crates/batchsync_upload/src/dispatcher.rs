//! Session state shared between the intake side and the upload worker.
//!
//! Two locks guard mutable state: `buffers` (open payload and batch budget,
//! written by intake) and `batch` (protocol state, written by the worker).
//! `batch` is never held while `buffers` is acquired.

use crate::batch::{BatchBudget, BatchState, BatchingMode};
use crate::delegate::StoreDelegate;
use crate::error::UploadError;
use crate::http::HttpClient;
use crate::payload::{Payload, PayloadSnapshot};
use crate::stats::UploadStats;
use crate::task::UploadTask;
use batchsync_protocol::ServerLimits;
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// Intake-side buffers.
#[derive(Debug)]
pub(crate) struct Buffers {
    pub(crate) payload: Payload,
    pub(crate) budget: BatchBudget,
}

pub(crate) struct Dispatcher<C: HttpClient> {
    endpoint: Url,
    client: C,
    delegate: Arc<dyn StoreDelegate>,
    buffers: Mutex<Buffers>,
    batch: Mutex<BatchState>,
    /// Latched by the first failure; later payloads are not sent.
    upload_failed: AtomicBool,
    /// Server time of the last durable write.
    upload_timestamp: AtomicU64,
    finished: AtomicBool,
    stats: RwLock<UploadStats>,
}

impl<C: HttpClient> Dispatcher<C> {
    pub(crate) fn new(
        endpoint: Url,
        client: C,
        delegate: Arc<dyn StoreDelegate>,
        limits: &ServerLimits,
    ) -> Self {
        Self {
            endpoint,
            client,
            delegate,
            buffers: Mutex::new(Buffers {
                payload: Payload::new(limits.payload_byte_limit(), limits.max_post_records),
                budget: BatchBudget::new(limits),
            }),
            batch: Mutex::new(BatchState::new()),
            upload_failed: AtomicBool::new(false),
            upload_timestamp: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            stats: RwLock::new(UploadStats::default()),
        }
    }

    pub(crate) fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub(crate) fn client(&self) -> &C {
        &self.client
    }

    pub(crate) fn buffers(&self) -> MutexGuard<'_, Buffers> {
        self.buffers.lock()
    }

    pub(crate) fn with_batch<R>(&self, f: impl FnOnce(&mut BatchState) -> R) -> R {
        f(&mut self.batch.lock())
    }

    /// Token and guard timestamp to send with the next request.
    pub(crate) fn batch_context(&self) -> (Option<String>, Option<u64>) {
        let batch = self.batch.lock();
        (batch.token().map(str::to_string), batch.last_modified())
    }

    pub(crate) fn may_upload(&self) -> bool {
        !self.upload_failed.load(Ordering::SeqCst)
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub(crate) fn stats(&self) -> UploadStats {
        self.stats.read().clone()
    }

    /// The server applies payloads directly; batch limits no longer matter.
    pub(crate) fn enter_non_batching_mode(&self) {
        info!("server does not batch, lifting batch limits");
        self.buffers.lock().budget.set_unlimited();
    }

    pub(crate) fn payload_posted(&self, bytes: u64, is_commit: bool) {
        let mut stats = self.stats.write();
        stats.payloads_posted += 1;
        stats.bytes_posted += bytes;
        if is_commit {
            stats.commits_posted += 1;
        }
    }

    pub(crate) fn payload_failed_locally(&self) {
        self.stats.write().payloads_failed_locally += 1;
    }

    /// Reports a record as failed without affecting the rest of the session.
    pub(crate) fn reject_record(&self, error: &UploadError, guid: &str) {
        debug!(guid, %error, "record failed");
        self.stats.write().records_failed += 1;
        self.delegate.on_record_store_failed(error, guid);
    }

    /// Reports a record as failed and stops further uploads.
    pub(crate) fn record_failed(&self, error: &UploadError, guid: &str) {
        self.upload_failed.store(true, Ordering::SeqCst);
        self.reject_record(error, guid);
    }

    /// A response was accepted.
    ///
    /// Without batching, or on a commit, the staged identifiers are now
    /// durable and are reported. A commit also opens a fresh batch.
    pub(crate) fn payload_succeeded(&self, last_modified: u64, is_commit: bool, is_last: bool) {
        let durable = {
            let mut batch = self.batch.lock();
            let durable = if is_commit || batch.mode() != BatchingMode::Batching {
                Some(batch.take_succeeded())
            } else {
                debug!(staged = batch.staged_count(), "records staged in open batch");
                None
            };
            if is_commit {
                *batch = batch.next_batch_meta();
            }
            durable
        };

        if let Some(guids) = durable {
            self.upload_timestamp.fetch_max(last_modified, Ordering::SeqCst);
            debug!(records = guids.len(), last_modified, "records stored");
            self.stats.write().records_succeeded += guids.len() as u64;
            for guid in &guids {
                self.delegate.on_record_store_succeeded(guid);
            }
        }

        if is_last {
            self.finished();
        }
    }

    /// A payload failed as a whole.
    ///
    /// Every posted record fails, and so does every record staged in the
    /// open batch since that batch can no longer be committed.
    pub(crate) fn payload_failed(&self, guids: &[String], error: UploadError, is_last: bool) {
        warn!(records = guids.len(), %error, "payload failed");
        self.upload_failed.store(true, Ordering::SeqCst);
        self.stats.write().last_error = Some(error.to_string());

        for guid in guids {
            self.reject_record(&error, guid);
        }
        self.abandon_staged();

        if error.is_session_level() {
            self.delegate.on_store_failed(&error);
        }
        if is_last {
            self.finished();
        }
    }

    /// Uploads whatever intake left behind. Runs on the worker after every
    /// flush submitted before the end of intake.
    pub(crate) fn finalize(&self) {
        let (snapshot, needs_commit) = {
            let mut buffers = self.buffers.lock();
            if buffers.payload.is_empty() {
                (None, buffers.budget.needs_commit())
            } else {
                let snapshot = buffers.payload.take_snapshot();
                buffers.budget = buffers.budget.next_budget();
                (Some(snapshot), false)
            }
        };

        if let Some(snapshot) = snapshot {
            debug!("uploading final payload of {} records", snapshot.len());
            UploadTask::new(snapshot, true, true).run(self);
            return;
        }

        let batching = self.batch.lock().mode() == BatchingMode::Batching;
        if needs_commit && batching {
            debug!("committing open batch with an empty payload");
            UploadTask::new(PayloadSnapshot::empty(), true, true).run(self);
        } else {
            self.finished();
        }
    }

    /// Ends the session. Only the first call has an effect.
    pub(crate) fn finished(&self) {
        if self.finished.swap(true, Ordering::SeqCst) {
            return;
        }
        self.abandon_staged();

        let timestamp = self.upload_timestamp.load(Ordering::SeqCst);
        let stats = self.stats();
        info!(
            timestamp,
            succeeded = stats.records_succeeded,
            failed = stats.records_failed,
            reported = stats.records_reported(),
            payloads = stats.payloads_posted,
            "upload session finished"
        );
        self.delegate.store_done(timestamp);
    }

    fn abandon_staged(&self) {
        let staged = self.batch.lock().take_succeeded();
        for guid in &staged {
            self.reject_record(&UploadError::BatchAbandoned, guid);
        }
    }
}
