//! Test fixtures: a recording delegate, a scripted HTTP client and record
//! builders.

use batchsync_protocol::{
    format_timestamp, HttpRequest, HttpResponse, PostResponseBody, LAST_MODIFIED_HEADER,
    STATUS_ACCEPTED, STATUS_OK,
};
use batchsync_upload::{HttpClient, Record, StoreDelegate, UploadError};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::time::Duration;

/// One callback received by a [`RecordingDelegate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DelegateEvent {
    /// `on_record_store_succeeded`.
    Succeeded(String),
    /// `on_record_store_failed`.
    Failed(String, UploadError),
    /// `on_store_failed`.
    StoreFailed(UploadError),
    /// `store_done`.
    Done(u64),
}

/// A delegate that records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    events: Mutex<Vec<DelegateEvent>>,
    done: Condvar,
}

impl RecordingDelegate {
    /// Creates an empty delegate.
    pub fn new() -> Self {
        Self::default()
    }

    /// All events so far.
    pub fn events(&self) -> Vec<DelegateEvent> {
        self.events.lock().clone()
    }

    /// Identifiers reported as stored, in report order.
    pub fn succeeded(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::Succeeded(guid) => Some(guid.clone()),
                _ => None,
            })
            .collect()
    }

    /// Identifiers reported as failed, with their errors.
    pub fn failed(&self) -> Vec<(String, UploadError)> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::Failed(guid, error) => Some((guid.clone(), error.clone())),
                _ => None,
            })
            .collect()
    }

    /// The error a record failed with, if it failed.
    pub fn failure(&self, guid: &str) -> Option<UploadError> {
        self.failed()
            .into_iter()
            .find(|(g, _)| g == guid)
            .map(|(_, e)| e)
    }

    /// Session-level failures.
    pub fn store_failures(&self) -> Vec<UploadError> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::StoreFailed(error) => Some(error.clone()),
                _ => None,
            })
            .collect()
    }

    /// Timestamps passed to `store_done`.
    pub fn done_timestamps(&self) -> Vec<u64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::Done(ts) => Some(*ts),
                _ => None,
            })
            .collect()
    }

    /// Every identifier reported either way, in report order.
    pub fn reported(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                DelegateEvent::Succeeded(guid) | DelegateEvent::Failed(guid, _) => {
                    Some(guid.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Blocks until `store_done` was called or the timeout elapsed.
    pub fn wait_for_done(&self, timeout: Duration) -> Option<u64> {
        let mut events = self.events.lock();
        loop {
            if let Some(ts) = events.iter().find_map(|e| match e {
                DelegateEvent::Done(ts) => Some(*ts),
                _ => None,
            }) {
                return Some(ts);
            }
            if self.done.wait_for(&mut events, timeout).timed_out() {
                return None;
            }
        }
    }

    fn push(&self, event: DelegateEvent) {
        let is_done = matches!(event, DelegateEvent::Done(_));
        self.events.lock().push(event);
        if is_done {
            self.done.notify_all();
        }
    }
}

impl StoreDelegate for RecordingDelegate {
    fn on_record_store_succeeded(&self, guid: &str) {
        self.push(DelegateEvent::Succeeded(guid.to_string()));
    }

    fn on_record_store_failed(&self, error: &UploadError, guid: &str) {
        self.push(DelegateEvent::Failed(guid.to_string(), error.clone()));
    }

    fn on_store_failed(&self, error: &UploadError) {
        self.push(DelegateEvent::StoreFailed(error.clone()));
    }

    fn store_done(&self, timestamp: u64) {
        self.push(DelegateEvent::Done(timestamp));
    }
}

/// An HTTP client that answers from a script and remembers every request.
///
/// Once the script runs out every call fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    script: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedClient {
    /// Creates a client with the given answers.
    pub fn new(answers: impl IntoIterator<Item = HttpResponse>) -> Self {
        Self {
            script: Mutex::new(answers.into_iter().map(Ok).collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Appends an answer.
    pub fn push_response(&self, response: HttpResponse) {
        self.script.lock().push_back(Ok(response));
    }

    /// Appends a transport failure.
    pub fn push_error(&self, message: impl Into<String>) {
        self.script.lock().push_back(Err(message.into()));
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Query strings of the requests received so far.
    pub fn queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .iter()
            .map(|r| r.url.split_once('?').map(|(_, q)| q.to_string()).unwrap_or_default())
            .collect()
    }
}

impl HttpClient for ScriptedClient {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        self.requests.lock().push(request);
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("no scripted response".to_string()))
    }
}

/// A `202` inside a batch.
pub fn accepted_response(token: &str, last_modified: u64, success: &[&str]) -> HttpResponse {
    response(
        STATUS_ACCEPTED,
        last_modified,
        PostResponseBody::accepted(token, success.iter().map(|s| s.to_string()).collect()),
    )
}

/// A `200` for an applied request.
pub fn applied_response(last_modified: u64, success: &[&str]) -> HttpResponse {
    response(
        STATUS_OK,
        last_modified,
        PostResponseBody::applied(success.iter().map(|s| s.to_string()).collect()),
    )
}

/// A success response with an arbitrary body.
pub fn response(status: u16, last_modified: u64, body: PostResponseBody) -> HttpResponse {
    HttpResponse::new(status)
        .with_header(LAST_MODIFIED_HEADER, format_timestamp(last_modified))
        .with_body(serde_json::to_vec(&body).unwrap_or_default())
}

/// A record `{"id":"<guid>"}`.
pub fn json_record(guid: &str) -> Record {
    Record::new(guid, format!(r#"{{"id":"{guid}"}}"#))
}

/// A record whose serialized form is exactly `size` bytes, or as small as
/// possible if `size` is below the minimum for that id.
pub fn record_with_size(guid: &str, size: usize) -> Record {
    let minimum = format!(r#"{{"id":"{guid}","p":""}}"#).len();
    let padding = "x".repeat(size.saturating_sub(minimum));
    Record::new(guid, format!(r#"{{"id":"{guid}","p":"{padding}"}}"#))
}

/// `count` records with ids `r0`, `r1`, ...
pub fn numbered_records(count: usize) -> Vec<Record> {
    (0..count).map(|i| json_record(&format!("r{i}"))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn record_with_size_is_exact() {
        for size in [20, 64, 300] {
            let record = record_with_size("abc", size);
            assert_eq!(record.payload.len(), size);
            let value: serde_json::Value = serde_json::from_slice(&record.payload).unwrap();
            assert_eq!(value["id"], "abc");
        }
        assert_eq!(record_with_size("abc", 1).payload.len(), 19);
    }

    #[test]
    fn scripted_client_replays_and_records() {
        let client = ScriptedClient::new([applied_response(1_000, &["a"])]);
        client.push_error("down");

        let first = client.post(HttpRequest::post("http://h/c?batch=true", Vec::new()));
        assert_eq!(first.unwrap().status, 200);
        assert_eq!(
            client.post(HttpRequest::post("http://h/c", Vec::new())),
            Err("down".to_string())
        );
        assert!(client.post(HttpRequest::post("http://h/c", Vec::new())).is_err());
        assert_eq!(client.queries(), vec!["batch=true", "", ""]);
    }

    #[test]
    fn delegate_wait_for_done() {
        let delegate = Arc::new(RecordingDelegate::new());
        assert_eq!(delegate.wait_for_done(Duration::from_millis(10)), None);

        let remote = Arc::clone(&delegate);
        let handle = thread::spawn(move || {
            remote.on_record_store_succeeded("a");
            remote.store_done(42);
        });
        assert_eq!(delegate.wait_for_done(Duration::from_secs(5)), Some(42));
        handle.join().unwrap();

        assert_eq!(delegate.succeeded(), vec!["a"]);
        assert_eq!(delegate.reported(), vec!["a"]);
        assert_eq!(delegate.done_timestamps(), vec![42]);
    }
}
