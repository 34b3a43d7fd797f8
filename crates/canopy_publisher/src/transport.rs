//! Transport layer abstraction for receiver calls.

use canopy_protocol::{HttpRequest, HttpResponse};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{ReplicationError, ReplicationResult};

/// A transport carries protocol requests to one receiver.
///
/// This trait abstracts the network layer, allowing for different
/// implementations (HTTP, in-process loopback, mocks for testing).
pub trait ReceiverTransport: Send + Sync {
    /// Sends a request and returns the receiver's answer, whatever its status code.
    ///
    /// Fails only if no answer was received.
    fn send(&self, request: &HttpRequest) -> ReplicationResult<HttpResponse>;

    /// Checks if the transport is connected.
    fn is_connected(&self) -> bool;
}

/// A mock transport for testing.
///
/// Answers with queued responses in order and records every request.
#[derive(Debug)]
pub struct MockTransport {
    connected: AtomicBool,
    responses: Mutex<VecDeque<HttpResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockTransport {
    /// Creates a new mock transport.
    pub fn new() -> Self {
        Self {
            connected: AtomicBool::new(true),
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a response.
    pub fn push_response(&self, response: HttpResponse) {
        self.responses.lock().push_back(response);
    }

    /// Queues a response with a JSON body.
    pub fn push_json(&self, code: u16, body: &str) {
        self.push_response(HttpResponse::new(code, body.as_bytes().to_vec()));
    }

    /// Returns the requests sent so far.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    /// Sets the connected state.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiverTransport for MockTransport {
    fn send(&self, request: &HttpRequest) -> ReplicationResult<HttpResponse> {
        self.requests.lock().push(request.clone());
        if !self.is_connected() {
            return Err(ReplicationError::transport(
                format!("sending {}", request.url),
                "not connected",
            ));
        }
        self.responses.lock().pop_front().ok_or_else(|| {
            ReplicationError::transport(format!("sending {}", request.url), "no mock response set")
        })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
