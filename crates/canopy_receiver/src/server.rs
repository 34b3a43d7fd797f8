//! Receiver server facade.

use canopy_protocol::{HttpRequest, HttpResponse, OperationUrl};
use canopy_store::ContentStore;
use std::sync::Arc;
use tracing::debug;

use crate::config::ReceiverConfig;
use crate::error::ReceiverError;
use crate::handler::RequestHandler;
use crate::receiver::PublicationReceiver;

/// The receiver server.
///
/// Routes operation URLs of the form `<base>.<operation>.<ext><suffix>` to
/// the [`RequestHandler`]. Binding the server to an actual HTTP listener is
/// left to the embedding application.
///
/// # Example
///
/// ```
/// use canopy_receiver::{ReceiverConfig, ReceiverServer};
/// use canopy_protocol::{params, HttpRequest, Method, Operation};
/// use canopy_store::MemoryStore;
/// use std::sync::Arc;
///
/// let server = ReceiverServer::new(ReceiverConfig::default(), Arc::new(MemoryStore::new()));
/// let url = Operation::ReleaseInfo.url("http://localhost/bin/receiver", "");
/// let request = HttpRequest::new(Method::Post, url).with_param(params::RELEASE_ROOT, "/content/site");
/// let response = server.handle(&request);
/// assert!(response.status_line.is_success());
/// ```
pub struct ReceiverServer {
    handler: RequestHandler,
    receiver: Arc<PublicationReceiver>,
}

impl ReceiverServer {
    /// Creates a receiver server on top of `store`.
    pub fn new(config: ReceiverConfig, store: Arc<dyn ContentStore>) -> Self {
        Self::with_receiver(Arc::new(PublicationReceiver::new(config, store)))
    }

    /// Creates a server around an existing receiver.
    pub fn with_receiver(receiver: Arc<PublicationReceiver>) -> Self {
        let handler = RequestHandler::new(Arc::clone(&receiver));
        Self { handler, receiver }
    }

    /// Handles one request.
    pub fn handle(&self, request: &HttpRequest) -> HttpResponse {
        match OperationUrl::parse(&request.url) {
            Ok(url) => {
                debug!(operation = %url.operation, suffix = %url.suffix, method = %request.method, "request");
                self.handler.handle(url.operation, &url.suffix, request)
            }
            Err(err) => self.handler.error_response(&ReceiverError::from(err)),
        }
    }

    /// Returns the receiver.
    pub fn receiver(&self) -> &Arc<PublicationReceiver> {
        &self.receiver
    }

    /// Returns the content store.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        self.receiver.store()
    }
}
