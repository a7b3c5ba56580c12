//! Protocol messages and the names that appear on the wire.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Response header carrying the collection's last-modified timestamp.
pub const LAST_MODIFIED_HEADER: &str = "X-Last-Modified";
/// Request header carrying the guard timestamp precondition.
pub const IF_UNMODIFIED_SINCE_HEADER: &str = "X-If-Unmodified-Since";
/// Content type header.
pub const CONTENT_TYPE_HEADER: &str = "Content-Type";
/// Content type of every POST body.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Query parameter opening or continuing a batch.
pub const BATCH_PARAM: &str = "batch";
/// Query parameter finalizing a batch.
pub const COMMIT_PARAM: &str = "commit";
/// Value used to open a batch and to request a commit.
pub const PARAM_TRUE: &str = "true";

/// Request fully applied (non-batching upload or batch commit).
pub const STATUS_OK: u16 = 200;
/// Batch accepted, more payloads expected.
pub const STATUS_ACCEPTED: u16 = 202;
/// Malformed request or limit violation.
pub const STATUS_BAD_REQUEST: u16 = 400;
/// Unknown endpoint.
pub const STATUS_NOT_FOUND: u16 = 404;
/// Guard timestamp precondition failed.
pub const STATUS_PRECONDITION_FAILED: u16 = 412;

/// A POST request as handed to a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Absolute request URL including query parameters.
    pub url: String,
    /// Request headers in insertion order.
    pub headers: Vec<(String, String)>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Creates a POST request with no headers.
    pub fn post(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Looks up a header value (case-insensitive name match).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }
}

/// A response as returned by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response headers.
    pub headers: Vec<(String, String)>,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates an empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Adds a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Looks up a header value (case-insensitive name match).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header(&self.headers, name)
    }

    /// Returns true for the two success statuses of the upload protocol.
    pub fn is_upload_success(&self) -> bool {
        self.status == STATUS_OK || self.status == STATUS_ACCEPTED
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Body of a successful POST response.
///
/// `{"batch": token?, "success": [guid, ...], "failed": {guid: reason, ...}}`.
/// Absent `success`/`failed` keys read as empty; present ones must have the
/// right type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostResponseBody {
    /// Batch token, present while a batch is open.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch: Option<String>,
    /// Identifiers the server stored (or staged).
    #[serde(default)]
    pub success: Vec<String>,
    /// Identifiers the server refused, with the reason it gave.
    #[serde(default)]
    pub failed: BTreeMap<String, serde_json::Value>,
}

impl PostResponseBody {
    /// Body of a `202` inside an open batch.
    pub fn accepted(token: impl Into<String>, success: Vec<String>) -> Self {
        Self {
            batch: Some(token.into()),
            success,
            failed: BTreeMap::new(),
        }
    }

    /// Body of a `200` for an applied request.
    pub fn applied(success: Vec<String>) -> Self {
        Self {
            batch: None,
            success,
            failed: BTreeMap::new(),
        }
    }

    /// Adds a failed identifier with a textual reason.
    pub fn with_failed(mut self, guid: impl Into<String>, reason: impl Into<String>) -> Self {
        self.failed
            .insert(guid.into(), serde_json::Value::String(reason.into()));
        self
    }

    /// Parses a response body. The top-level value must be an object.
    pub fn parse(bytes: &[u8]) -> ProtocolResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        if !value.is_object() {
            return Err(ProtocolError::invalid_body("expected a JSON object"));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Serializes the body.
    pub fn to_bytes(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Renders the reason recorded for a failed identifier.
    pub fn failure_reason(&self, guid: &str) -> Option<String> {
        self.failed.get(guid).map(|reason| match reason {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_is_case_insensitive() {
        let response = HttpResponse::new(STATUS_OK).with_header("x-last-modified", "12.34");
        assert_eq!(response.header(LAST_MODIFIED_HEADER), Some("12.34"));
        assert_eq!(response.header("X-Missing"), None);

        let request = HttpRequest::post("http://h/c", Vec::new())
            .with_header(CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON);
        assert_eq!(request.header("content-type"), Some(CONTENT_TYPE_JSON));
    }

    #[test]
    fn upload_success_statuses() {
        assert!(HttpResponse::new(STATUS_OK).is_upload_success());
        assert!(HttpResponse::new(STATUS_ACCEPTED).is_upload_success());
        assert!(!HttpResponse::new(201).is_upload_success());
        assert!(!HttpResponse::new(STATUS_PRECONDITION_FAILED).is_upload_success());
    }

    #[test]
    fn parse_batch_response() {
        let body = PostResponseBody::parse(
            br#"{"batch":"abc","success":["a","b"],"failed":{"c":"too big","d":["x"]}}"#,
        )
        .unwrap();
        assert_eq!(body.batch.as_deref(), Some("abc"));
        assert_eq!(body.success, vec!["a", "b"]);
        assert_eq!(body.failure_reason("c").as_deref(), Some("too big"));
        assert_eq!(body.failure_reason("d").as_deref(), Some(r#"["x"]"#));
        assert_eq!(body.failure_reason("a"), None);
    }

    #[test]
    fn parse_tolerates_missing_lists() {
        let body = PostResponseBody::parse(b"{}").unwrap();
        assert!(body.batch.is_none());
        assert!(body.success.is_empty());
        assert!(body.failed.is_empty());
    }

    #[test]
    fn null_batch_reads_as_absent() {
        let body = PostResponseBody::parse(br#"{"batch":null,"success":[]}"#).unwrap();
        assert!(body.batch.is_none());
    }

    #[test]
    fn parse_rejects_wrong_shapes() {
        assert!(PostResponseBody::parse(b"not json").is_err());
        assert!(PostResponseBody::parse(br#"[["a"], {}]"#).is_err());
        assert!(PostResponseBody::parse(br#"{"success":"a"}"#).is_err());
        assert!(PostResponseBody::parse(br#"{"failed":["a"]}"#).is_err());
    }

    #[test]
    fn constructors_serialize_expected_keys() {
        let body = PostResponseBody::accepted("tok", vec!["a".into()]).with_failed("b", "nope");
        let json: serde_json::Value = serde_json::from_slice(&body.to_bytes().unwrap()).unwrap();
        assert_eq!(json["batch"], "tok");
        assert_eq!(json["success"][0], "a");
        assert_eq!(json["failed"]["b"], "nope");

        let body = PostResponseBody::applied(vec![]);
        let json: serde_json::Value = serde_json::from_slice(&body.to_bytes().unwrap()).unwrap();
        assert!(json.get("batch").is_none());
    }
}
