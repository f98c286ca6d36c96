//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so any HTTP library (or
//! an in-process loopback) can carry the CBOR bodies.

use crate::config::{SessionConfig, DEFAULT_REQUEST_TIMEOUT};
use crate::error::{SyncError, SyncResult};
use crate::transport::DocumentStore;
use parking_lot::RwLock;
use revsync_protocol::{
    BulkWriteRequest, BulkWriteResponse, FetchRequest, FetchResponse, ProtocolResult,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Path suffix of the bulk write endpoint.
pub const BULK_DOCS_PATH: &str = "_bulk_docs";
/// Path suffix of the fetch endpoint.
pub const FETCH_PATH: &str = "_fetch";

/// HTTP client abstraction.
pub trait HttpClient: Send + Sync {
    /// Sends a POST request and returns the response body.
    fn post(&self, url: &str, body: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, HttpFailure>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// Why an HTTP call produced no usable body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    /// The request could not be delivered.
    Unreachable(String),
    /// The request was sent but no answer arrived in time.
    TimedOut,
    /// The server answered with an error status.
    Status(u16, String),
}

impl From<HttpFailure> for SyncError {
    fn from(failure: HttpFailure) -> Self {
        match failure {
            HttpFailure::Unreachable(message) => SyncError::transport_retryable(message),
            HttpFailure::TimedOut => SyncError::Timeout,
            HttpFailure::Status(code, message) if code >= 500 => {
                SyncError::ServerError(format!("{code}: {message}"))
            }
            HttpFailure::Status(code, message) => {
                SyncError::transport_fatal(format!("{code}: {message}"))
            }
        }
    }
}

/// HTTP-based document store transport.
///
/// Requests go to `POST {base_url}/{database}/_bulk_docs` and
/// `POST {base_url}/{database}/_fetch` with CBOR bodies.
pub struct HttpTransport<C: HttpClient> {
    base_url: String,
    database: String,
    client: C,
    timeout: Duration,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(base_url: impl Into<String>, database: impl Into<String>, client: C) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            database: database.into(),
            client,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Creates a transport for a session's database, using the session's
    /// request timeout.
    pub fn for_session(base_url: impl Into<String>, config: &SessionConfig, client: C) -> Self {
        Self::new(base_url, config.database.clone(), client).with_timeout(config.request_timeout)
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Returns the full URL of an endpoint.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, self.database, path)
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn post_cbor<Res>(
        &self,
        path: &str,
        body: ProtocolResult<Vec<u8>>,
        decode: fn(&[u8]) -> ProtocolResult<Res>,
    ) -> SyncResult<Res> {
        if !self.is_connected() {
            return Err(SyncError::NotConnected);
        }

        let body = body.map_err(|e| SyncError::Protocol(format!("failed to encode request: {e}")))?;

        let response = self
            .client
            .post(&self.endpoint(path), body, self.timeout)
            .map_err(|failure| {
                *self.last_error.write() = Some(format!("{failure:?}"));
                if matches!(failure, HttpFailure::Unreachable(_)) {
                    self.connected.store(false, Ordering::SeqCst);
                }
                SyncError::from(failure)
            })?;

        *self.last_error.write() = None;
        decode(&response).map_err(|e| SyncError::Protocol(format!("failed to decode response: {e}")))
    }
}

impl<C: HttpClient> DocumentStore for HttpTransport<C> {
    fn bulk_write(&self, request: &BulkWriteRequest) -> SyncResult<BulkWriteResponse> {
        self.post_cbor(BULK_DOCS_PATH, request.encode(), BulkWriteResponse::decode)
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        self.post_cbor(FETCH_PATH, request.encode(), FetchResponse::decode)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }

    fn close(&self) -> SyncResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer {
    /// Handles a POST to `/{database}/{endpoint}` and returns the response body.
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, HttpFailure>;
}

impl<S: LoopbackServer + ?Sized> LoopbackServer for std::sync::Arc<S> {
    fn handle_post(&self, path: &str, body: &[u8]) -> Result<Vec<u8>, HttpFailure> {
        (**self).handle_post(path, body)
    }
}

/// A loopback HTTP client that routes requests directly to an in-process server.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
    base_url: String,
}

impl<S: LoopbackServer + Send + Sync> LoopbackClient<S> {
    /// Creates a loopback client that strips `base_url` from request URLs.
    pub fn new(base_url: impl Into<String>, server: S) -> Self {
        Self {
            server,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

impl<S: LoopbackServer + Send + Sync> HttpClient for LoopbackClient<S> {
    fn post(&self, url: &str, body: Vec<u8>, _timeout: Duration) -> Result<Vec<u8>, HttpFailure> {
        let path = url.strip_prefix(self.base_url.as_str()).unwrap_or(url);
        self.server.handle_post(path, &body)
    }

    fn is_healthy(&self) -> bool {
        true
    }
}
