//! In-process server seam.

use crate::messages::{HttpRequest, HttpResponse};

/// Trait for servers that can answer requests without a network.
///
/// Implemented by the reference storage server; wrapped by the upload
/// crate's loopback client.
pub trait LoopbackServer: Send + Sync {
    /// Handles a POST request and returns the response.
    fn handle_post(&self, request: &HttpRequest) -> HttpResponse;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for std::sync::Arc<S> {
    fn handle_post(&self, request: &HttpRequest) -> HttpResponse {
        (**self).handle_post(request)
    }
}
