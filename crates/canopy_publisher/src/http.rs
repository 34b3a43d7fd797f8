//! HTTP transport implementation.
//!
//! The actual HTTP client is abstracted via a trait so the embedding
//! application can plug in its own client, with authentication and proxy
//! handling configured there.

use canopy_protocol::{HttpRequest, HttpResponse};
use canopy_receiver::ReceiverServer;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ReplicationError, ReplicationResult};
use crate::transport::ReceiverTransport;

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport.
pub trait HttpClient: Send + Sync {
    /// Executes a request and returns the response, whatever its status code.
    ///
    /// Returns an error only if no response was received.
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool;
}

/// HTTP-based receiver transport.
pub struct HttpTransport<C: HttpClient> {
    client: C,
    connected: AtomicBool,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpTransport<C> {
    /// Creates a new HTTP transport.
    pub fn new(client: C) -> Self {
        Self {
            client,
            connected: AtomicBool::new(true),
            last_error: RwLock::new(None),
        }
    }

    /// Returns the client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }
}

impl<C: HttpClient> ReceiverTransport for HttpTransport<C> {
    fn send(&self, request: &HttpRequest) -> ReplicationResult<HttpResponse> {
        debug!(method = %request.method, url = %request.url, "executing request");
        match self.client.execute(request) {
            Ok(response) => {
                self.clear_error();
                self.connected.store(true, Ordering::SeqCst);
                Ok(response)
            }
            Err(err) => {
                self.set_error(&err);
                self.connected.store(false, Ordering::SeqCst);
                Err(ReplicationError::transport(
                    format!("trouble accessing remote service for {}", request.url),
                    err,
                ))
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && self.client.is_healthy()
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request and returns the response.
    fn handle_request(&self, request: &HttpRequest) -> HttpResponse;
}

impl LoopbackServer for ReceiverServer {
    fn handle_request(&self, request: &HttpRequest) -> HttpResponse {
        self.handle(request)
    }
}

/// A loopback HTTP client that routes requests directly to a receiver server.
///
/// Useful for testing and for replicating between stores in one process.
pub struct LoopbackClient<S: LoopbackServer> {
    server: Arc<S>,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: Arc<S>) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &Arc<S> {
        &self.server
    }
}

impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, String> {
        Ok(self.server.handle_request(request))
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Creates a transport that talks to `server` in process.
pub fn loopback_transport(server: Arc<ReceiverServer>) -> Arc<dyn ReceiverTransport> {
    Arc::new(HttpTransport::new(LoopbackClient::new(server)))
}
