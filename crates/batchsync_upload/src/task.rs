//! A single POST of one payload.

use crate::dispatcher::Dispatcher;
use crate::error::UploadError;
use crate::http::HttpClient;
use crate::payload::PayloadSnapshot;
use crate::response::ResponseHandler;
use batchsync_protocol::{
    format_timestamp, frame_records, HttpRequest, BATCH_PARAM, COMMIT_PARAM,
    CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON, IF_UNMODIFIED_SINCE_HEADER, PARAM_TRUE,
};
use tracing::debug;
use url::Url;

/// Uploads one payload snapshot and routes the outcome.
pub(crate) struct UploadTask {
    snapshot: PayloadSnapshot,
    is_commit: bool,
    is_last: bool,
}

impl UploadTask {
    pub(crate) fn new(snapshot: PayloadSnapshot, is_commit: bool, is_last: bool) -> Self {
        Self {
            snapshot,
            is_commit,
            is_last,
        }
    }

    pub(crate) fn run<C: HttpClient>(self, dispatcher: &Dispatcher<C>) {
        let handler = ResponseHandler::new(
            dispatcher,
            &self.snapshot.guids,
            self.is_commit,
            self.is_last,
        );

        if !dispatcher.may_upload() {
            debug!(
                records = self.snapshot.len(),
                "not posting payload, an earlier upload failed"
            );
            dispatcher.payload_failed_locally();
            handler.handle_request_error(UploadError::PreviousPostFailed);
            return;
        }
        if !dispatcher.client().is_healthy() {
            handler.handle_request_error(UploadError::Transport("client unavailable".into()));
            return;
        }

        let (token, last_modified) = dispatcher.batch_context();
        let request = build_request(
            dispatcher.endpoint(),
            token.as_deref(),
            last_modified,
            self.is_commit,
            &self.snapshot.records,
        );
        debug!(
            url = %request.url,
            records = self.snapshot.len(),
            bytes = request.body.len(),
            commit = self.is_commit,
            last = self.is_last,
            "posting payload"
        );
        dispatcher.payload_posted(request.body.len() as u64, self.is_commit);

        match dispatcher.client().post(request) {
            Ok(response) => handler.handle_response(response),
            Err(message) => handler.handle_request_error(UploadError::Transport(message)),
        }
    }
}

/// Collection URL with the batch parameters of one request.
///
/// `batch=true` opens a batch, `batch=<token>` continues it, and
/// `commit=true` asks the server to apply it.
pub(crate) fn build_post_url(endpoint: &Url, token: Option<&str>, is_commit: bool) -> Url {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(BATCH_PARAM, token.unwrap_or(PARAM_TRUE));
        if is_commit {
            query.append_pair(COMMIT_PARAM, PARAM_TRUE);
        }
    }
    url
}

pub(crate) fn build_request<R: AsRef<[u8]>>(
    endpoint: &Url,
    token: Option<&str>,
    last_modified: Option<u64>,
    is_commit: bool,
    records: &[R],
) -> HttpRequest {
    let url = build_post_url(endpoint, token, is_commit);
    let request = HttpRequest::post(url.as_str(), frame_records(records))
        .with_header(CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON);
    match last_modified {
        Some(timestamp) => {
            request.with_header(IF_UNMODIFIED_SINCE_HEADER, format_timestamp(timestamp))
        }
        None => request,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://sync.example.com/1.5/42/storage/bookmarks").unwrap()
    }

    #[test]
    fn first_payload_opens_batch() {
        let url = build_post_url(&endpoint(), None, false);
        assert_eq!(
            url.as_str(),
            "https://sync.example.com/1.5/42/storage/bookmarks?batch=true"
        );
    }

    #[test]
    fn later_payloads_carry_token_and_commit() {
        let url = build_post_url(&endpoint(), Some("1234"), true);
        assert_eq!(url.query(), Some("batch=1234&commit=true"));

        let url = build_post_url(&endpoint(), None, true);
        assert_eq!(url.query(), Some("batch=true&commit=true"));
    }

    #[test]
    fn existing_query_is_kept() {
        let endpoint = Url::parse("http://h/storage/c?full=1").unwrap();
        let url = build_post_url(&endpoint, Some("t"), false);
        assert_eq!(url.query(), Some("full=1&batch=t"));
    }

    #[test]
    fn request_has_body_and_headers() {
        let records = vec![br#"{"id":"a"}"#.to_vec(), br#"{"id":"b"}"#.to_vec()];
        let request = build_request(&endpoint(), None, Some(1_234_560), false, &records);

        assert_eq!(request.body, br#"[{"id":"a"},{"id":"b"}]"#);
        assert_eq!(request.header(CONTENT_TYPE_HEADER), Some(CONTENT_TYPE_JSON));
        assert_eq!(request.header(IF_UNMODIFIED_SINCE_HEADER), Some("1234.56"));
    }

    #[test]
    fn guard_header_absent_before_first_response() {
        let request = build_request::<Vec<u8>>(&endpoint(), None, None, true, &[]);
        assert_eq!(request.body, b"[]");
        assert_eq!(request.header(IF_UNMODIFIED_SINCE_HEADER), None);
    }
}
