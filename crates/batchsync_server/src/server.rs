//! The storage server.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::{HandlerContext, RequestHandler, RequestLogEntry};
use crate::storage::{Storage, StoredRecord};
use batchsync_protocol::{HttpRequest, HttpResponse, LoopbackServer, ServerLimits};
use std::sync::Arc;

/// In-memory storage server speaking the batch upload protocol.
///
/// Requests arrive as [`HttpRequest`] values, either directly or through a
/// loopback client; there is no socket. The inspection methods exist so tests
/// can look at what a session produced.
///
/// # Example
///
/// ```
/// use batchsync_protocol::HttpRequest;
/// use batchsync_server::{ServerConfig, StorageServer};
///
/// let server = StorageServer::new(ServerConfig::default());
/// let response = server.handle_post(&HttpRequest::post(
///     "http://localhost/storage/bookmarks",
///     br#"[{"id":"a"}]"#.to_vec(),
/// ));
/// assert_eq!(response.status, 200);
/// assert_eq!(server.record_count("bookmarks"), 1);
/// ```
pub struct StorageServer {
    handler: RequestHandler,
    context: Arc<HandlerContext>,
}

impl StorageServer {
    /// Creates a server with empty storage.
    pub fn new(config: ServerConfig) -> Self {
        let storage = Arc::new(Storage::new(config.initial_timestamp));
        Self::with_storage(config, storage)
    }

    /// Creates a server over existing storage.
    pub fn with_storage(config: ServerConfig, storage: Arc<Storage>) -> Self {
        let context = Arc::new(HandlerContext::new(config, storage));
        let handler = RequestHandler::new(Arc::clone(&context));

        Self { handler, context }
    }

    /// Handles a POST.
    pub fn handle_post(&self, request: &HttpRequest) -> HttpResponse {
        self.handler.handle_post(request)
    }

    /// Limits the server enforces.
    pub fn limits(&self) -> ServerLimits {
        self.context.config.limits
    }

    /// The `info/configuration` document.
    pub fn info_configuration(&self) -> ServerResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.context.config.limits)?)
    }

    /// Simulates a write by another client and returns the new timestamp.
    pub fn bump_timestamp(&self, collection: &str) -> u64 {
        self.context.storage.bump(collection)
    }

    /// Current timestamp of a collection.
    pub fn last_modified(&self, collection: &str) -> u64 {
        self.context.storage.last_modified(collection)
    }

    /// All records of a collection.
    pub fn records(&self, collection: &str) -> Vec<StoredRecord> {
        self.context.storage.records(collection)
    }

    /// A single record.
    pub fn record(&self, collection: &str, id: &str) -> Option<StoredRecord> {
        self.context.storage.record(collection, id)
    }

    /// Number of records in a collection.
    pub fn record_count(&self, collection: &str) -> usize {
        self.context.storage.record_count(collection)
    }

    /// Batches opened and not committed.
    pub fn open_batch_count(&self) -> usize {
        self.context.storage.open_batch_count()
    }

    /// Every request handled so far, in order.
    pub fn request_log(&self) -> Vec<RequestLogEntry> {
        self.context.request_log()
    }

    /// Answers the next request with `status`.
    pub fn fail_next_request(&self, status: u16) {
        self.context.inject_status(status);
    }
}

impl LoopbackServer for StorageServer {
    fn handle_post(&self, request: &HttpRequest) -> HttpResponse {
        self.handler.handle_post(request)
    }
}
