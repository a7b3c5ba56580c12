//! # batchsync testkit
//!
//! Test utilities for the batchsync uploader.
//!
//! This crate provides:
//! - A delegate that records every callback, and a scripted HTTP client
//! - Record and response builders
//! - Property-based test generators using proptest
//! - A session harness that runs uploads against the in-process server
//!
//! ## Usage
//!
//! ```rust,ignore
//! use batchsync_testkit::prelude::*;
//!
//! #[test]
//! fn uploads_everything() {
//!     let harness = SessionHarness::new(ServerConfig::default());
//!     let report = harness.run(numbered_records(10)).unwrap();
//!     assert_eq!(report.delegate.succeeded().len(), 10);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use batchsync_protocol::ServerLimits;
    pub use batchsync_server::ServerConfig;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
