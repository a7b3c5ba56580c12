//! The batching uploader.

use crate::config::UploadConfig;
use crate::delegate::StoreDelegate;
use crate::dispatcher::{Buffers, Dispatcher};
use crate::error::{UploadError, UploadResult};
use crate::http::HttpClient;
use crate::queue::WorkQueue;
use crate::record::Record;
use crate::stats::UploadStats;
use crate::task::UploadTask;
use batchsync_protocol::PER_PAYLOAD_OVERHEAD;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Uploads a stream of records to a collection, one session per instance.
///
/// Records are packed into payloads (one POST each) and payloads into
/// batches (applied atomically on commit) without exceeding any server
/// limit. POSTs run one at a time, in order, on a worker thread; intake
/// never waits for the network.
///
/// # Example
///
/// ```ignore
/// let uploader = BatchingUploader::new(config, client, delegate)?;
/// for record in records {
///     uploader.process(record);
/// }
/// uploader.no_more_records_to_upload();
/// ```
pub struct BatchingUploader<C: HttpClient + 'static> {
    dispatcher: Arc<Dispatcher<C>>,
    queue: WorkQueue,
    payload_byte_limit: u64,
    max_total_bytes: u64,
    intake_closed: AtomicBool,
}

impl<C: HttpClient + 'static> BatchingUploader<C> {
    /// Creates an uploader and starts its worker.
    pub fn new(
        config: UploadConfig,
        client: C,
        delegate: Arc<dyn StoreDelegate>,
    ) -> UploadResult<Self> {
        let endpoint = config.validate()?;
        let queue = WorkQueue::new(config.worker_name.clone())?;
        info!(
            url = %endpoint,
            worker = queue.name(),
            max_post_records = config.limits.max_post_records,
            max_post_bytes = config.payload_byte_limit(),
            max_total_records = config.limits.max_total_records,
            max_total_bytes = config.limits.max_total_bytes,
            "upload session started"
        );

        Ok(Self {
            dispatcher: Arc::new(Dispatcher::new(endpoint, client, delegate, &config.limits)),
            queue,
            payload_byte_limit: config.payload_byte_limit(),
            max_total_bytes: config.limits.max_total_bytes,
            intake_closed: AtomicBool::new(false),
        })
    }

    /// Hands a record over for upload.
    ///
    /// Never blocks on the network. The record's outcome is reported to the
    /// delegate later, or right away if it can never be uploaded.
    pub fn process(&self, record: Record) {
        if self.intake_closed.load(Ordering::SeqCst) {
            warn!(guid = %record.guid, "record received after end of intake");
            self.dispatcher
                .reject_record(&UploadError::SessionClosed, &record.guid);
            return;
        }

        let delta = record.delta_size();
        if delta + PER_PAYLOAD_OVERHEAD > self.payload_byte_limit {
            self.reject_too_large(&record, self.payload_byte_limit);
            return;
        }

        let mut buffers = self.dispatcher.buffers();
        if !buffers.budget.fits_when_empty(delta) {
            drop(buffers);
            self.reject_too_large(&record, self.max_total_bytes);
            return;
        }

        let fits_batch = buffers.budget.can_fit(delta);
        let fits_payload = buffers.payload.can_fit(delta);
        if !fits_batch {
            debug!("record does not fit the batch, committing");
            self.flush(&mut buffers, true, false);
        } else if !fits_payload {
            debug!("record does not fit the payload, flushing");
            self.flush(&mut buffers, false, false);
        }

        let guid = record.guid.clone();
        if let Err(error) = self.add_and_flush_if_full(&mut buffers, record) {
            drop(buffers);
            self.dispatcher.reject_record(&error, &guid);
        }
    }

    /// Signals the end of intake.
    ///
    /// Whatever is still buffered is uploaded, an open batch is committed,
    /// and the delegate's `store_done` follows. Later calls are ignored.
    pub fn no_more_records_to_upload(&self) {
        if self.intake_closed.swap(true, Ordering::SeqCst) {
            debug!("end of intake already signalled");
            return;
        }
        if self.dispatcher.is_finished() {
            return;
        }
        let dispatcher = Arc::clone(&self.dispatcher);
        self.queue.execute(move || dispatcher.finalize());
    }

    /// Returns true once `store_done` was delivered.
    pub fn is_finished(&self) -> bool {
        self.dispatcher.is_finished()
    }

    /// Returns a snapshot of the session counters.
    pub fn stats(&self) -> UploadStats {
        self.dispatcher.stats()
    }

    /// Waits for all submitted uploads, stops the worker and returns the
    /// final counters.
    pub fn close(mut self) -> UploadStats {
        self.queue.shutdown();
        self.dispatcher.stats()
    }

    fn add_and_flush_if_full(&self, buffers: &mut Buffers, record: Record) -> UploadResult<()> {
        let delta = record.delta_size();
        let batch_full = buffers.budget.add_and_estimate_if_full(delta)?;
        let payload_full = buffers.payload.add(delta, record.payload, record.guid)?;

        if batch_full {
            debug!("batch is full, committing");
            self.flush(buffers, true, false);
        } else if payload_full {
            debug!("payload is full, flushing");
            self.flush(buffers, false, false);
        }
        Ok(())
    }

    /// Snapshots the open payload and queues its upload.
    fn flush(&self, buffers: &mut Buffers, is_commit: bool, is_last: bool) {
        let snapshot = buffers.payload.take_snapshot();
        if is_commit {
            buffers.budget = buffers.budget.next_budget();
        }
        debug!(
            records = snapshot.len(),
            bytes = snapshot.byte_count,
            commit = is_commit,
            "queueing payload"
        );

        let task = UploadTask::new(snapshot, is_commit, is_last);
        let dispatcher = Arc::clone(&self.dispatcher);
        self.queue.execute(move || task.run(&dispatcher));
    }

    fn reject_too_large(&self, record: &Record, limit: u64) {
        let size = record.delta_size() + PER_PAYLOAD_OVERHEAD;
        warn!(guid = %record.guid, size, limit, "record too large");
        self.dispatcher
            .reject_record(&UploadError::RecordTooLarge { size, limit }, &record.guid);
    }
}
