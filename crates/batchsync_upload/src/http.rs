//! HTTP client seam.
//!
//! The uploader never talks to a network library directly. It hands a
//! fully built [`HttpRequest`] to an [`HttpClient`] and interprets the
//! [`HttpResponse`] it gets back. Real deployments plug in their HTTP stack
//! here; tests and the CLI use [`LoopbackClient`] to reach an in-process
//! server.

use batchsync_protocol::{HttpRequest, HttpResponse, LoopbackServer};
use std::sync::Arc;

/// HTTP client abstraction.
///
/// A call returns `Err` only when no response was obtained at all
/// (connection refused, timeout, ...). Any status code is an `Ok`.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response.
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client can currently send requests.
    fn is_healthy(&self) -> bool {
        true
    }
}

impl<C: HttpClient + ?Sized> HttpClient for Arc<C> {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        (**self).post(request)
    }

    fn is_healthy(&self) -> bool {
        (**self).is_healthy()
    }
}

/// A client that routes requests directly to an in-process server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// The server behind this client.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn post(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        Ok(self.server.handle_post(&request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchsync_protocol::{LAST_MODIFIED_HEADER, STATUS_OK};
    use parking_lot::Mutex;

    struct EchoServer {
        seen: Mutex<Vec<String>>,
    }

    impl LoopbackServer for EchoServer {
        fn handle_post(&self, request: &HttpRequest) -> HttpResponse {
            self.seen.lock().push(request.url.clone());
            HttpResponse::new(STATUS_OK)
                .with_header(LAST_MODIFIED_HEADER, "1.00")
                .with_body(request.body.clone())
        }
    }

    #[test]
    fn loopback_routes_to_server() {
        let server = Arc::new(EchoServer {
            seen: Mutex::new(Vec::new()),
        });
        let client = LoopbackClient::new(Arc::clone(&server));

        let response = client
            .post(HttpRequest::post("http://h/storage/c?batch=true", b"[]".to_vec()))
            .unwrap();
        assert_eq!(response.status, STATUS_OK);
        assert_eq!(response.body, b"[]");
        assert_eq!(response.header(LAST_MODIFIED_HEADER), Some("1.00"));
        assert_eq!(
            server.seen.lock().as_slice(),
            ["http://h/storage/c?batch=true".to_string()]
        );
        assert!(client.is_healthy());
    }

    struct DownClient;

    impl HttpClient for DownClient {
        fn post(&self, _request: HttpRequest) -> Result<HttpResponse, String> {
            Err("connection refused".into())
        }

        fn is_healthy(&self) -> bool {
            false
        }
    }

    #[test]
    fn arc_client_delegates() {
        let client: Arc<dyn HttpClient> = Arc::new(DownClient);
        assert!(!client.is_healthy());
        let err = client
            .post(HttpRequest::post("http://h/c", Vec::new()))
            .unwrap_err();
        assert_eq!(err, "connection refused");
    }
}
