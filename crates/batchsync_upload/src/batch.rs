//! Batch bookkeeping.
//!
//! A batch is tracked from two sides. The intake side owns a [`BatchBudget`]
//! that decides when a commit must be requested; it is replaced as soon as a
//! commit is handed to the worker. The worker side owns a [`BatchState`]
//! holding what the server told us (token, guard timestamp, batching mode,
//! staged successes); it is replaced once a commit is acknowledged.

use crate::error::{UploadError, UploadResult};
use crate::size::SizeTracker;
use batchsync_protocol::ServerLimits;

/// Whether the server groups payloads into batches.
///
/// Unknown until the first unambiguous response, then fixed for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchingMode {
    /// No unambiguous response seen yet.
    #[default]
    Unknown,
    /// Server returns batch tokens; records become durable on commit.
    Batching,
    /// Server applies every payload immediately.
    NonBatching,
}

impl BatchingMode {
    /// Resolves from whether a batch token was returned.
    pub fn from_token_present(present: bool) -> Self {
        if present {
            BatchingMode::Batching
        } else {
            BatchingMode::NonBatching
        }
    }

    /// Returns true once the mode is resolved.
    pub fn is_known(&self) -> bool {
        !matches!(self, BatchingMode::Unknown)
    }

    /// `Some(true)` when batching, `Some(false)` when not, `None` if unknown.
    pub fn as_option(&self) -> Option<bool> {
        match self {
            BatchingMode::Unknown => None,
            BatchingMode::Batching => Some(true),
            BatchingMode::NonBatching => Some(false),
        }
    }
}

/// Intake-side budget of the open batch.
#[derive(Debug, Clone)]
pub struct BatchBudget {
    tracker: SizeTracker,
    needs_commit: bool,
}

impl BatchBudget {
    /// Creates a budget bounded by the batch limits.
    pub fn new(limits: &ServerLimits) -> Self {
        Self {
            tracker: SizeTracker::new(limits.max_total_bytes, limits.max_total_records),
            needs_commit: false,
        }
    }

    /// Returns true if a record of `delta` bytes fits the open batch.
    pub fn can_fit(&self, delta: u64) -> bool {
        self.tracker.can_fit(delta)
    }

    /// Returns true if a record of `delta` bytes fits an empty batch.
    pub fn fits_when_empty(&self, delta: u64) -> bool {
        self.tracker.fits_when_empty(delta)
    }

    /// Adds a record and estimates whether the batch is full.
    pub fn add_and_estimate_if_full(&mut self, delta: u64) -> UploadResult<bool> {
        let full = self.tracker.add_and_estimate_if_full(delta)?;
        self.needs_commit = true;
        Ok(full)
    }

    /// True once a record was added since the last commit was requested.
    pub fn needs_commit(&self) -> bool {
        self.needs_commit
    }

    /// Stops enforcing batch limits (the server turned out not to batch).
    pub fn set_unlimited(&mut self) {
        self.tracker.set_unlimited(true);
    }

    /// Returns true if batch limits are not enforced.
    pub fn is_unlimited(&self) -> bool {
        self.tracker.is_unlimited()
    }

    /// Records added to the open batch.
    pub fn record_count(&self) -> u64 {
        self.tracker.record_count()
    }

    /// Budget for the batch following a commit.
    pub fn next_budget(&self) -> BatchBudget {
        BatchBudget {
            tracker: self.tracker.fresh(),
            needs_commit: false,
        }
    }
}

/// Worker-side protocol state of the open batch.
#[derive(Debug, Clone, Default)]
pub struct BatchState {
    token: Option<String>,
    last_modified: Option<u64>,
    mode: BatchingMode,
    succeeded: Vec<String>,
}

impl BatchState {
    /// Creates state for the first batch of a session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of the open batch, if the server issued one.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Last guard timestamp seen.
    pub fn last_modified(&self) -> Option<u64> {
        self.last_modified
    }

    /// Current batching mode.
    pub fn mode(&self) -> BatchingMode {
        self.mode
    }

    /// Fixes the batching mode. Has no effect once resolved.
    ///
    /// Returns the mode that was newly resolved, if any.
    pub fn resolve_mode(&mut self, batching: bool) -> Option<BatchingMode> {
        if self.mode.is_known() {
            return None;
        }
        self.mode = BatchingMode::from_token_present(batching);
        Some(self.mode)
    }

    /// Reconciles the token returned by the server.
    ///
    /// A commit must be answered without a token, which closes the batch.
    /// Otherwise the first token is adopted and every later response must
    /// repeat it.
    pub fn set_token(&mut self, token: Option<String>, is_commit: bool) -> UploadResult<()> {
        if is_commit {
            if token.is_some() {
                return Err(self.token_modified(token));
            }
            self.token = None;
            return Ok(());
        }

        match (&self.token, token) {
            (None, Some(token)) if self.mode == BatchingMode::NonBatching => {
                Err(UploadError::TokenModified {
                    expected: None,
                    actual: Some(token),
                })
            }
            (None, token) => {
                self.token = token;
                Ok(())
            }
            (Some(current), Some(token)) if *current == token => Ok(()),
            (Some(_), token) => Err(self.token_modified(token)),
        }
    }

    /// Reconciles the guard timestamp returned by the server.
    ///
    /// `expect_change` is true for commits and for non-batching uploads,
    /// where the collection is written; otherwise the timestamp must hold.
    pub fn set_last_modified(&mut self, current: u64, expect_change: bool) -> UploadResult<()> {
        if let Some(previous) = self.last_modified {
            if !expect_change && previous != current {
                return Err(UploadError::LastModifiedChangedUnexpectedly { previous, current });
            }
            if expect_change && previous == current {
                return Err(UploadError::LastModifiedDidNotChange(current));
            }
        }
        self.last_modified = Some(current);
        Ok(())
    }

    /// Stages an identifier the server acknowledged.
    pub fn record_succeeded(&mut self, guid: impl Into<String>) {
        self.succeeded.push(guid.into());
    }

    /// Number of staged identifiers.
    pub fn staged_count(&self) -> usize {
        self.succeeded.len()
    }

    /// Drains the staged identifiers.
    pub fn take_succeeded(&mut self) -> Vec<String> {
        std::mem::take(&mut self.succeeded)
    }

    /// State for the batch that follows a commit: same guard timestamp and
    /// mode, no token, nothing staged.
    pub fn next_batch_meta(&self) -> BatchState {
        BatchState {
            token: None,
            last_modified: self.last_modified,
            mode: self.mode,
            succeeded: Vec::new(),
        }
    }

    fn token_modified(&self, actual: Option<String>) -> UploadError {
        UploadError::TokenModified {
            expected: self.token.clone(),
            actual,
        }
    }
}
