//! In-memory collection storage.

use crate::error::{ServerError, ServerResult};
use batchsync_protocol::{ServerLimits, PER_PAYLOAD_OVERHEAD};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;
use uuid::Uuid;

/// Smallest step between two collection timestamps (milliseconds).
pub const TIMESTAMP_STEP: u64 = 10;

/// A record as stored in a collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Record id.
    pub id: String,
    /// The record object as posted.
    pub payload: serde_json::Value,
    /// Collection timestamp of the write that stored it.
    pub modified: u64,
}

/// A record taken from a request body.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRecord {
    /// Record id.
    pub id: String,
    /// The record object.
    pub payload: serde_json::Value,
}

/// How a POST relates to batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchParam {
    /// Apply immediately.
    None,
    /// Open a new batch.
    Open,
    /// Append to the batch with this token.
    Continue(String),
}

/// A validated POST.
#[derive(Debug, Clone)]
pub struct Post {
    /// Target collection.
    pub collection: String,
    /// Batch parameter.
    pub batch: BatchParam,
    /// Whether the batch is to be applied.
    pub commit: bool,
    /// Guard timestamp the client sent.
    pub since: Option<u64>,
    /// Records to store.
    pub records: Vec<IncomingRecord>,
    /// Records posted, including ones refused by id.
    pub posted_records: u64,
    /// Record bytes posted, separators included.
    pub posted_bytes: u64,
}

/// Result of a POST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostOutcome {
    /// Collection timestamp after the request.
    pub last_modified: u64,
    /// Token of the batch left open, if any.
    pub token: Option<String>,
}

#[derive(Debug, Default)]
struct Collection {
    records: BTreeMap<String, StoredRecord>,
    last_modified: Option<u64>,
}

#[derive(Debug)]
struct PendingBatch {
    collection: String,
    records: Vec<IncomingRecord>,
    record_count: u64,
    byte_count: u64,
}

#[derive(Debug)]
struct StorageState {
    collections: HashMap<String, Collection>,
    batches: HashMap<String, PendingBatch>,
    /// Timestamp of the latest write across all collections.
    clock: u64,
    initial_timestamp: u64,
}

impl StorageState {
    fn last_modified(&self, collection: &str) -> u64 {
        self.collections
            .get(collection)
            .and_then(|c| c.last_modified)
            .unwrap_or(self.initial_timestamp)
    }

    fn tick(&mut self) -> u64 {
        self.clock += TIMESTAMP_STEP;
        self.clock
    }

    fn apply(&mut self, collection: &str, records: Vec<IncomingRecord>) -> u64 {
        let timestamp = self.tick();
        let target = self.collections.entry(collection.to_string()).or_default();
        for record in records {
            target.records.insert(
                record.id.clone(),
                StoredRecord {
                    id: record.id,
                    payload: record.payload,
                    modified: timestamp,
                },
            );
        }
        target.last_modified = Some(timestamp);
        timestamp
    }

    fn open_batch(&mut self, collection: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.batches.insert(
            token.clone(),
            PendingBatch {
                collection: collection.to_string(),
                records: Vec::new(),
                record_count: 0,
                byte_count: PER_PAYLOAD_OVERHEAD,
            },
        );
        debug!(collection, token = %token, "batch opened");
        token
    }

    fn stage(&mut self, token: &str, post: &mut Post, limits: &ServerLimits) -> ServerResult<()> {
        let batch = match self.batches.get_mut(token) {
            Some(batch) if batch.collection == post.collection => batch,
            _ => return Err(ServerError::UnknownBatch(token.to_string())),
        };

        batch.record_count += post.posted_records;
        batch.byte_count += post.posted_bytes;
        if batch.record_count > limits.max_total_records || batch.byte_count > limits.max_total_bytes
        {
            let message = format!(
                "batch holds {} records, {} bytes",
                batch.record_count, batch.byte_count
            );
            self.batches.remove(token);
            return Err(ServerError::LimitExceeded(message));
        }

        batch.records.append(&mut post.records);
        Ok(())
    }
}

/// Collections and open batches, shared by all request handlers.
///
/// Every write advances a server-wide clock by at least [`TIMESTAMP_STEP`],
/// so collection timestamps are strictly increasing.
#[derive(Debug)]
pub struct Storage {
    state: RwLock<StorageState>,
}

impl Storage {
    /// Creates empty storage whose collections start at `initial_timestamp`.
    pub fn new(initial_timestamp: u64) -> Self {
        Self {
            state: RwLock::new(StorageState {
                collections: HashMap::new(),
                batches: HashMap::new(),
                clock: initial_timestamp,
                initial_timestamp,
            }),
        }
    }

    /// Executes a POST atomically.
    pub fn post(&self, mut post: Post, limits: &ServerLimits) -> ServerResult<PostOutcome> {
        let mut state = self.state.write();

        let current = state.last_modified(&post.collection);
        if let Some(since) = post.since {
            if current > since {
                return Err(ServerError::PreconditionFailed {
                    since,
                    last_modified: current,
                });
            }
        }

        let token = match &post.batch {
            BatchParam::None => {
                let records = std::mem::take(&mut post.records);
                let last_modified = state.apply(&post.collection, records);
                return Ok(PostOutcome {
                    last_modified,
                    token: None,
                });
            }
            BatchParam::Open => state.open_batch(&post.collection),
            BatchParam::Continue(token) => token.clone(),
        };

        state.stage(&token, &mut post, limits)?;
        if !post.commit {
            return Ok(PostOutcome {
                last_modified: current,
                token: Some(token),
            });
        }

        let records = state
            .batches
            .remove(&token)
            .map(|batch| batch.records)
            .unwrap_or_default();
        let last_modified = state.apply(&post.collection, records);
        debug!(collection = %post.collection, token = %token, last_modified, "batch committed");
        Ok(PostOutcome {
            last_modified,
            token: None,
        })
    }

    /// Simulates a write by another client.
    pub fn bump(&self, collection: &str) -> u64 {
        let mut state = self.state.write();
        let timestamp = state.tick();
        state
            .collections
            .entry(collection.to_string())
            .or_default()
            .last_modified = Some(timestamp);
        timestamp
    }

    /// Current timestamp of a collection.
    pub fn last_modified(&self, collection: &str) -> u64 {
        self.state.read().last_modified(collection)
    }

    /// All records of a collection, ordered by id.
    pub fn records(&self, collection: &str) -> Vec<StoredRecord> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|c| c.records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// A single record.
    pub fn record(&self, collection: &str, id: &str) -> Option<StoredRecord> {
        self.state
            .read()
            .collections
            .get(collection)
            .and_then(|c| c.records.get(id).cloned())
    }

    /// Number of records in a collection.
    pub fn record_count(&self, collection: &str) -> usize {
        self.state
            .read()
            .collections
            .get(collection)
            .map_or(0, |c| c.records.len())
    }

    /// Number of batches opened but not yet committed.
    pub fn open_batch_count(&self) -> usize {
        self.state.read().batches.len()
    }
}

impl Default for Storage {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_INITIAL_TIMESTAMP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> IncomingRecord {
        IncomingRecord {
            id: id.to_string(),
            payload: json!({ "id": id }),
        }
    }

    fn post(batch: BatchParam, commit: bool, ids: &[&str]) -> Post {
        Post {
            collection: "bookmarks".to_string(),
            batch,
            commit,
            since: None,
            records: ids.iter().map(|id| record(id)).collect(),
            posted_records: ids.len() as u64,
            posted_bytes: ids.len() as u64 * 12,
        }
    }

    #[test]
    fn direct_write_advances_timestamp() {
        let storage = Storage::new(1_000);
        assert_eq!(storage.last_modified("bookmarks"), 1_000);

        let outcome = storage
            .post(post(BatchParam::None, false, &["a", "b"]), &ServerLimits::default())
            .unwrap();
        assert_eq!(outcome.token, None);
        assert_eq!(outcome.last_modified, 1_010);
        assert_eq!(storage.record_count("bookmarks"), 2);
        assert_eq!(storage.record("bookmarks", "a").unwrap().modified, 1_010);
    }

    #[test]
    fn batch_is_invisible_until_commit() {
        let storage = Storage::new(1_000);
        let limits = ServerLimits::default();

        let opened = storage
            .post(post(BatchParam::Open, false, &["a"]), &limits)
            .unwrap();
        let token = opened.token.clone().unwrap();
        assert_eq!(opened.last_modified, 1_000);
        assert_eq!(storage.record_count("bookmarks"), 0);
        assert_eq!(storage.open_batch_count(), 1);

        let committed = storage
            .post(post(BatchParam::Continue(token), true, &["b"]), &limits)
            .unwrap();
        assert_eq!(committed.token, None);
        assert!(committed.last_modified > 1_000);
        assert_eq!(storage.record_count("bookmarks"), 2);
        assert_eq!(storage.open_batch_count(), 0);
    }

    #[test]
    fn open_and_commit_in_one_request() {
        let storage = Storage::new(0);
        let outcome = storage
            .post(post(BatchParam::Open, true, &["a"]), &ServerLimits::default())
            .unwrap();
        assert_eq!(outcome.token, None);
        assert_eq!(outcome.last_modified, 10);
        assert_eq!(storage.record_count("bookmarks"), 1);
    }

    #[test]
    fn unknown_token_is_rejected() {
        let storage = Storage::new(0);
        let err = storage
            .post(
                post(BatchParam::Continue("nope".into()), false, &["a"]),
                &ServerLimits::default(),
            )
            .unwrap_err();
        assert!(matches!(err, ServerError::UnknownBatch(_)));
    }

    #[test]
    fn stale_guard_timestamp_fails() {
        let storage = Storage::new(1_000);
        let bumped = storage.bump("bookmarks");
        assert_eq!(bumped, 1_010);

        let mut request = post(BatchParam::None, false, &["a"]);
        request.since = Some(1_000);
        let err = storage.post(request, &ServerLimits::default()).unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(storage.record_count("bookmarks"), 0);

        let mut request = post(BatchParam::None, false, &["a"]);
        request.since = Some(bumped);
        storage.post(request, &ServerLimits::default()).unwrap();
    }

    #[test]
    fn batch_limits_are_enforced() {
        let storage = Storage::new(0);
        let limits = ServerLimits::default().with_max_total_records(2);

        let token = storage
            .post(post(BatchParam::Open, false, &["a", "b"]), &limits)
            .unwrap()
            .token
            .unwrap();
        let err = storage
            .post(post(BatchParam::Continue(token), false, &["c"]), &limits)
            .unwrap_err();
        assert!(matches!(err, ServerError::LimitExceeded(_)));
        assert_eq!(storage.open_batch_count(), 0);
    }

    #[test]
    fn timestamps_are_strictly_increasing_across_collections() {
        let storage = Storage::new(0);
        let first = storage.bump("a");
        let second = storage.bump("b");
        let third = storage.bump("a");
        assert!(first < second && second < third);
        assert!(third - second >= TIMESTAMP_STEP);
    }
}
