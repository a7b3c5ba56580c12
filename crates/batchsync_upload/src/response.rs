//! Interpretation of upload responses.

use crate::batch::BatchingMode;
use crate::dispatcher::Dispatcher;
use crate::error::{UploadError, UploadResult};
use crate::http::HttpClient;
use batchsync_protocol::{
    parse_timestamp, HttpResponse, PostResponseBody, LAST_MODIFIED_HEADER, STATUS_OK,
    STATUS_PRECONDITION_FAILED,
};
use std::collections::HashSet;
use tracing::{debug, warn};

/// What a well-formed success response told us.
struct Acknowledgement {
    last_modified: u64,
    body: PostResponseBody,
}

/// Validates the response to one payload and reports the outcome.
pub(crate) struct ResponseHandler<'a, C: HttpClient> {
    dispatcher: &'a Dispatcher<C>,
    guids: &'a [String],
    is_commit: bool,
    is_last: bool,
}

impl<'a, C: HttpClient> ResponseHandler<'a, C> {
    pub(crate) fn new(
        dispatcher: &'a Dispatcher<C>,
        guids: &'a [String],
        is_commit: bool,
        is_last: bool,
    ) -> Self {
        Self {
            dispatcher,
            guids,
            is_commit,
            is_last,
        }
    }

    pub(crate) fn handle_response(&self, response: HttpResponse) {
        match self.check(&response) {
            Ok(ack) => self.acknowledge(ack),
            Err(error) => self.handle_request_error(error),
        }
    }

    /// Fails the whole payload.
    pub(crate) fn handle_request_error(&self, error: UploadError) {
        self.dispatcher
            .payload_failed(self.guids, error, self.is_last);
    }

    /// Checks status, headers, and body, then reconciles batch state.
    fn check(&self, response: &HttpResponse) -> UploadResult<Acknowledgement> {
        if !response.is_upload_success() {
            return Err(match response.status {
                STATUS_PRECONDITION_FAILED => UploadError::ConcurrentModification,
                status => UploadError::HttpStatus(status),
            });
        }

        let header = response
            .header(LAST_MODIFIED_HEADER)
            .ok_or(UploadError::MissingLastModified)?;
        let last_modified = parse_timestamp(header)?;
        let body = PostResponseBody::parse(&response.body)?;

        let applied = response.status == STATUS_OK;
        if !applied && body.batch.is_none() {
            return Err(UploadError::MissingBatchToken);
        }

        let resolved = self.dispatcher.with_batch(|batch| {
            if applied
                && !self.is_commit
                && batch.mode() == BatchingMode::Batching
                && batch.token().is_some()
            {
                return Err(UploadError::UnexpectedApplied);
            }

            // An applied commit without a token could come from either kind
            // of server, so it does not settle the mode.
            let ambiguous = applied && self.is_commit && body.batch.is_none();
            let resolved = if ambiguous {
                None
            } else {
                batch.resolve_mode(body.batch.is_some())
            };

            batch.set_token(body.batch.clone(), self.is_commit)?;
            let expect_change = self.is_commit || batch.mode() == BatchingMode::NonBatching;
            batch.set_last_modified(last_modified, expect_change)?;
            Ok(resolved)
        })?;

        match resolved {
            Some(BatchingMode::NonBatching) => self.dispatcher.enter_non_batching_mode(),
            Some(mode) => debug!(batching = ?mode.as_option(), "batching mode resolved"),
            None => {}
        }

        Ok(Acknowledgement {
            last_modified,
            body,
        })
    }

    /// Reports every posted record exactly once.
    ///
    /// `failed` takes precedence over `success`; posted records the server
    /// did not mention fail; identifiers we never posted are ignored.
    fn acknowledge(&self, ack: Acknowledgement) {
        let posted: HashSet<&str> = self.guids.iter().map(String::as_str).collect();
        let mut reported: HashSet<&str> = HashSet::with_capacity(posted.len());

        let mut rejected = Vec::new();
        for guid in ack.body.failed.keys() {
            if !posted.contains(guid.as_str()) {
                warn!(guid = %guid, "server rejected a record that was not posted");
                continue;
            }
            if reported.insert(guid) {
                let reason = ack.body.failure_reason(guid).unwrap_or_default();
                rejected.push((guid.as_str(), reason));
            }
        }

        let mut staged = Vec::new();
        for guid in &ack.body.success {
            if !posted.contains(guid.as_str()) {
                warn!(guid = %guid, "server acknowledged a record that was not posted");
                continue;
            }
            if reported.insert(guid) {
                staged.push(guid.clone());
            }
        }

        self.dispatcher.with_batch(|batch| {
            for guid in staged {
                batch.record_succeeded(guid);
            }
        });

        for (guid, reason) in rejected {
            self.dispatcher
                .record_failed(&UploadError::RecordRejected(reason), guid);
        }
        for guid in self.guids {
            if !reported.contains(guid.as_str()) {
                self.dispatcher
                    .record_failed(&UploadError::RecordNotAcknowledged, guid);
            }
        }

        self.dispatcher
            .payload_succeeded(ack.last_modified, self.is_commit, self.is_last);
    }
}
