//! Cross-crate integration test helpers.
//!
//! Runs complete upload sessions against the in-process storage server and
//! checks what came out.

use crate::fixtures::RecordingDelegate;
use batchsync_protocol::{HttpRequest, HttpResponse, ServerLimits, COMMIT_PARAM, PARAM_TRUE};
use batchsync_server::{RequestLogEntry, ServerConfig, StorageServer};
use batchsync_upload::{
    BatchingUploader, HttpClient, LoopbackClient, Record, UploadConfig, UploadResult, UploadStats,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Collection every harness session writes to.
pub const TEST_COLLECTION: &str = "bookmarks";

/// Collection URL every harness session posts to.
pub const TEST_URL: &str = "http://localhost/1.5/testkit/storage/bookmarks";

/// A loopback client that keeps a copy of every request.
pub struct InspectingClient {
    inner: LoopbackClient<Arc<StorageServer>>,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl InspectingClient {
    /// Wraps a loopback client for `server`.
    pub fn new(server: Arc<StorageServer>) -> Self {
        Self {
            inner: LoopbackClient::new(server),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared handle on the recorded requests.
    pub fn requests(&self) -> Arc<Mutex<Vec<HttpRequest>>> {
        Arc::clone(&self.requests)
    }
}

impl HttpClient for InspectingClient {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().push(request.clone());
        self.inner.post(request)
    }
}

/// A test harness for complete upload sessions.
pub struct SessionHarness {
    server: Arc<StorageServer>,
    limits: ServerLimits,
}

/// Everything a finished session produced.
pub struct SessionReport {
    /// Delegate callbacks.
    pub delegate: Arc<RecordingDelegate>,
    /// Final counters.
    pub stats: UploadStats,
    /// Requests as the client sent them.
    pub requests: Vec<HttpRequest>,
    /// Requests as the server logged them.
    pub server_log: Vec<RequestLogEntry>,
}

impl SessionHarness {
    /// Creates a harness whose client uses the server's limits.
    pub fn new(config: ServerConfig) -> Self {
        let limits = config.limits;
        Self {
            server: Arc::new(StorageServer::new(config)),
            limits,
        }
    }

    /// The server behind the harness.
    pub fn server(&self) -> &Arc<StorageServer> {
        &self.server
    }

    /// Uploads `records` in one session and waits for it to finish.
    pub fn run(&self, records: Vec<Record>) -> UploadResult<SessionReport> {
        let delegate = Arc::new(RecordingDelegate::new());
        let client = InspectingClient::new(Arc::clone(&self.server));
        let requests = client.requests();

        let config = UploadConfig::new(TEST_URL).with_limits(self.limits);
        let uploader = BatchingUploader::new(config, client, delegate.clone())?;
        for record in records {
            uploader.process(record);
        }
        uploader.no_more_records_to_upload();
        let stats = uploader.close();

        let requests = requests.lock().clone();
        Ok(SessionReport {
            delegate,
            stats,
            requests,
            server_log: self.server.request_log(),
        })
    }
}

impl SessionReport {
    /// Record ids carried by each request body, in order.
    pub fn posted_ids(&self) -> Vec<Vec<String>> {
        self.requests.iter().map(|r| body_ids(&r.body)).collect()
    }

    /// Requests grouped into batches; each group ends with a commit.
    pub fn batches(&self) -> Vec<Vec<&HttpRequest>> {
        let mut batches = Vec::new();
        let mut current = Vec::new();
        for request in &self.requests {
            current.push(request);
            if is_commit(request) {
                batches.push(std::mem::take(&mut current));
            }
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    /// Checks that every id was reported exactly once and that `store_done`
    /// came once, after all of them.
    pub fn check_exactly_once(&self, ids: &[String]) -> Result<(), String> {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for guid in self.delegate.reported() {
            *counts.entry(guid).or_default() += 1;
        }
        for guid in ids {
            match counts.get(guid) {
                Some(1) => {}
                Some(n) => return Err(format!("{guid} reported {n} times")),
                None => return Err(format!("{guid} never reported")),
            }
        }
        if counts.len() != ids.len() {
            return Err(format!("{} ids reported, expected {}", counts.len(), ids.len()));
        }

        let done = self.delegate.done_timestamps();
        if done.len() != 1 {
            return Err(format!("store_done called {} times", done.len()));
        }
        match self.delegate.events().last() {
            Some(crate::fixtures::DelegateEvent::Done(_)) => Ok(()),
            other => Err(format!("last event was {other:?}")),
        }
    }
}

/// Returns true if the request asks for a commit.
pub fn is_commit(request: &HttpRequest) -> bool {
    query_param(request, COMMIT_PARAM).as_deref() == Some(PARAM_TRUE)
}

/// Value of a query parameter of the request URL.
pub fn query_param(request: &HttpRequest, name: &str) -> Option<String> {
    let (_, query) = request.url.split_once('?')?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}

/// Record ids in a framed body.
pub fn body_ids(body: &[u8]) -> Vec<String> {
    serde_json::from_slice::<Vec<serde_json::Value>>(body)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .collect()
}
