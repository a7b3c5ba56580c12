//! # batchsync protocol
//!
//! Wire vocabulary of the batched record-upload protocol.
//!
//! This crate provides:
//! - Body framing (`[` record (`,` record)* `]`) and its byte accounting constants
//! - Query parameter, header and status code names
//! - Decimal-seconds timestamp header encoding
//! - Server limits (`info/configuration`)
//! - The POST response body
//! - Transport-neutral request/response types and the loopback server seam
//!
//! This is a pure protocol crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod framing;
mod limits;
mod loopback;
mod messages;
mod timestamp;

pub use error::{ProtocolError, ProtocolResult};
pub use framing::{
    frame_records, framed_len, PER_PAYLOAD_OVERHEAD, PER_RECORD_OVERHEAD, RECORDS_END,
    RECORDS_START, RECORD_SEPARATOR,
};
pub use limits::{
    ServerLimits, DEFAULT_MAX_POST_BYTES, DEFAULT_MAX_POST_RECORDS, DEFAULT_MAX_REQUEST_BYTES,
    DEFAULT_MAX_TOTAL_BYTES, DEFAULT_MAX_TOTAL_RECORDS,
};
pub use loopback::LoopbackServer;
pub use messages::{
    HttpRequest, HttpResponse, PostResponseBody, BATCH_PARAM, COMMIT_PARAM, CONTENT_TYPE_HEADER,
    CONTENT_TYPE_JSON, IF_UNMODIFIED_SINCE_HEADER, LAST_MODIFIED_HEADER, PARAM_TRUE,
    STATUS_ACCEPTED, STATUS_BAD_REQUEST, STATUS_NOT_FOUND, STATUS_OK, STATUS_PRECONDITION_FAILED,
};
pub use timestamp::{format_timestamp, parse_timestamp};
