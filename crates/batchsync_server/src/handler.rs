//! Request handling for the storage endpoint.

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::storage::{BatchParam, IncomingRecord, Post, Storage};
use batchsync_protocol::{
    format_timestamp, parse_timestamp, HttpRequest, HttpResponse, PostResponseBody,
    BATCH_PARAM, COMMIT_PARAM, CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON,
    IF_UNMODIFIED_SINCE_HEADER, LAST_MODIFIED_HEADER, PARAM_TRUE, STATUS_ACCEPTED, STATUS_OK,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

/// One line of the request log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLogEntry {
    /// Request URL.
    pub url: String,
    /// Records in the body (0 if it could not be parsed).
    pub record_count: usize,
    /// Status the server answered with.
    pub status: u16,
}

/// Context for request handling.
pub struct HandlerContext {
    /// Server configuration.
    pub config: ServerConfig,
    /// Collections (shared across all handlers).
    pub storage: Arc<Storage>,
    log: Mutex<Vec<RequestLogEntry>>,
    injected: Mutex<VecDeque<u16>>,
}

impl HandlerContext {
    /// Creates a new handler context.
    pub fn new(config: ServerConfig, storage: Arc<Storage>) -> Self {
        Self {
            config,
            storage,
            log: Mutex::new(Vec::new()),
            injected: Mutex::new(VecDeque::new()),
        }
    }

    /// Requests handled so far.
    pub fn request_log(&self) -> Vec<RequestLogEntry> {
        self.log.lock().clone()
    }

    /// Answers the next request with `status` without looking at it.
    pub fn inject_status(&self, status: u16) {
        self.injected.lock().push_back(status);
    }
}

/// Handler for POSTs to `.../storage/<collection>`.
pub struct RequestHandler {
    context: Arc<HandlerContext>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(context: Arc<HandlerContext>) -> Self {
        Self { context }
    }

    /// Handles a POST and always produces a response.
    pub fn handle_post(&self, request: &HttpRequest) -> HttpResponse {
        let injected = self.context.injected.lock().pop_front();
        let (response, record_count) = match injected {
            Some(status) => (HttpResponse::new(status), 0),
            None => match self.process(request) {
                Ok(answered) => answered,
                Err(err) => {
                    if err.is_conflict() {
                        debug!(url = %request.url, %err, "precondition failed");
                    } else {
                        warn!(url = %request.url, %err, "request refused");
                    }
                    (
                        HttpResponse::new(err.status_code()).with_body(err.to_string()),
                        0,
                    )
                }
            },
        };

        self.context.log.lock().push(RequestLogEntry {
            url: request.url.clone(),
            record_count,
            status: response.status,
        });
        response
    }

    fn process(&self, request: &HttpRequest) -> ServerResult<(HttpResponse, usize)> {
        let config = &self.context.config;
        let (collection, mut batch, commit) = parse_target(&request.url)?;
        if !config.batching_enabled {
            batch = BatchParam::None;
        }

        let records = parse_records(&request.body, config)?;
        let record_count = records.len();
        let since = request
            .header(IF_UNMODIFIED_SINCE_HEADER)
            .map(parse_timestamp)
            .transpose()?;

        let mut body = PostResponseBody::default();
        let mut accepted = Vec::with_capacity(records.len());
        for record in records {
            if config.rejects(&record.id) {
                body = body.with_failed(record.id, "rejected by server");
            } else {
                body.success.push(record.id.clone());
                accepted.push(record);
            }
        }

        let post = Post {
            collection,
            batch,
            commit,
            since,
            records: accepted,
            posted_records: record_count as u64,
            posted_bytes: posted_bytes(request.body.len(), record_count),
        };
        let outcome = self.context.storage.post(post, &config.limits)?;

        let status = if outcome.token.is_some() {
            STATUS_ACCEPTED
        } else {
            STATUS_OK
        };
        body.batch = outcome.token;
        debug!(url = %request.url, status, records = record_count, "request handled");

        let response = HttpResponse::new(status)
            .with_header(LAST_MODIFIED_HEADER, format_timestamp(outcome.last_modified))
            .with_header(CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON)
            .with_body(body.to_bytes()?);
        Ok((response, record_count))
    }
}

/// Extracts the collection and the batch parameters from a request URL.
fn parse_target(raw: &str) -> ServerResult<(String, BatchParam, bool)> {
    let url = Url::parse(raw).map_err(|e| ServerError::InvalidRequest(e.to_string()))?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let collection = match segments.as_slice() {
        [.., "storage", name] => (*name).to_string(),
        _ => return Err(ServerError::NotFound(url.path().to_string())),
    };

    let mut batch = BatchParam::None;
    let mut commit = false;
    for (key, value) in url.query_pairs() {
        if key == BATCH_PARAM {
            batch = if value == PARAM_TRUE {
                BatchParam::Open
            } else {
                BatchParam::Continue(value.into_owned())
            };
        } else if key == COMMIT_PARAM {
            commit = value == PARAM_TRUE;
        }
    }
    Ok((collection, batch, commit))
}

/// Record bytes in a framed body: everything but the opening bracket, or
/// nothing for an empty array.
fn posted_bytes(body_len: usize, record_count: usize) -> u64 {
    if record_count == 0 {
        0
    } else {
        (body_len as u64).saturating_sub(1)
    }
}

/// Parses a body into records, enforcing per-request limits.
fn parse_records(body: &[u8], config: &ServerConfig) -> ServerResult<Vec<IncomingRecord>> {
    let limits = &config.limits;
    let size = body.len() as u64;
    if size > limits.max_request_bytes || size > limits.max_post_bytes {
        return Err(ServerError::LimitExceeded(format!("body of {size} bytes")));
    }

    let values: Vec<serde_json::Value> = serde_json::from_slice(body)?;
    if values.len() as u64 > limits.max_post_records {
        return Err(ServerError::LimitExceeded(format!(
            "{} records in one request",
            values.len()
        )));
    }

    values
        .into_iter()
        .map(|payload| {
            let id = payload
                .get("id")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| ServerError::InvalidRequest("record without string id".into()))?
                .to_string();
            Ok(IncomingRecord { id, payload })
        })
        .collect()
}
