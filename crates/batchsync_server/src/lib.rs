//! # batchsync server
//!
//! In-memory reference storage server for the batch upload protocol.
//!
//! This crate provides:
//! - `POST .../storage/<collection>` with optional `batch`/`commit` parameters
//! - Guard timestamp preconditions (`X-If-Unmodified-Since` → 412)
//! - Enforcement of the advertised per-request and per-batch limits
//! - Inspection of stored records and of the request log
//!
//! # Protocol
//!
//! - `batch=true` opens a batch and answers `202` with a token
//! - `batch=<token>` stages more records under that token (`202`)
//! - `commit=true` applies everything staged, advances the collection
//!   timestamp and answers `200` without a token
//! - Without `batch` (or with batching disabled) records are applied at once
//!
//! Every write advances the timestamp by at least 10 ms. Staged records are
//! invisible until their batch is committed.

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod handler;
mod server;
mod storage;

pub use config::{ServerConfig, DEFAULT_INITIAL_TIMESTAMP};
pub use error::{ServerError, ServerResult};
pub use handler::{HandlerContext, RequestHandler, RequestLogEntry};
pub use server::StorageServer;
pub use storage::{
    BatchParam, IncomingRecord, Post, PostOutcome, Storage, StoredRecord, TIMESTAMP_STEP,
};
