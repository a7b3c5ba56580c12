//! # batchsync upload
//!
//! Client side of a batched record upload protocol.
//!
//! This crate provides:
//! - Payload and batch size accounting against server limits
//! - The batch protocol (tokens, commits, guard timestamps)
//! - Per-record outcome reporting through [`StoreDelegate`]
//! - A serial upload worker so intake never waits for the network
//! - HTTP client abstraction with an in-process loopback client
//!
//! ## Model
//!
//! Records are packed into **payloads**, each sent as one POST whose body is
//! a JSON array of the records. Consecutive payloads form a **batch**: the
//! server stages them under a token and applies them atomically when a
//! payload is sent with `commit=true`. Servers that do not batch apply each
//! payload immediately; the uploader detects which kind it talks to from the
//! first unambiguous response.
//!
//! ## Key Invariants
//!
//! - No payload or batch exceeds the server's limits
//! - Payloads are posted one at a time, in order
//! - A record is reported as stored only once it is durable
//! - Every record is reported exactly once; `store_done` follows all of them
//! - After any failure nothing more is sent in the session

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Session code reports failures through the delegate; it never panics.
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod batch;
mod config;
mod delegate;
mod dispatcher;
mod error;
mod http;
mod payload;
mod queue;
mod record;
mod response;
mod size;
mod stats;
mod task;
mod uploader;

pub use batch::{BatchBudget, BatchState, BatchingMode};
pub use config::UploadConfig;
pub use delegate::StoreDelegate;
pub use error::{UploadError, UploadResult};
pub use http::{HttpClient, LoopbackClient};
pub use payload::{Payload, PayloadSnapshot};
pub use queue::WorkQueue;
pub use record::Record;
pub use size::SizeTracker;
pub use stats::UploadStats;
pub use uploader::BatchingUploader;
