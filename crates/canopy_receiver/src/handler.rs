//! Request handlers for receiver operations.

use canopy_protocol::{
    params, Ack, CommitRequest, CompareParentsRequest, ContentState, HttpRequest, HttpResponse,
    Method, Operation, ParentComparison, Payload, ReleaseInfo, Response, Status, UpdateInfo,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::{ReceiverError, ReceiverResult};
use crate::receiver::PublicationReceiver;

const ENCODING_FAILED: &[u8] =
    br#"{"status":500,"success":false,"warning":false,"messages":[{"level":"error","text":"response encoding failed"}]}"#;

/// Decodes receiver requests, runs them and encodes the JSON status answer.
pub struct RequestHandler {
    receiver: Arc<PublicationReceiver>,
}

impl RequestHandler {
    /// Creates a new request handler.
    pub fn new(receiver: Arc<PublicationReceiver>) -> Self {
        Self { receiver }
    }

    /// Handles one request. Failures become error statuses, never panics.
    pub fn handle(&self, operation: Operation, suffix: &str, request: &HttpRequest) -> HttpResponse {
        if !method_allowed(operation, request.method) {
            return self.error_response(&ReceiverError::Validation(format!(
                "{operation} does not accept {}",
                request.method
            )));
        }
        match operation {
            Operation::StartUpdate => encode(self.handle_start_update(suffix, request)),
            Operation::ContentState => encode(self.handle_content_state(suffix, request)),
            Operation::PathUpload => encode(self.handle_path_upload(suffix, request)),
            Operation::CommitUpdate => encode(self.handle_commit(request)),
            Operation::AbortUpdate => encode(self.handle_abort(request)),
            Operation::ReleaseInfo => encode(self.handle_release_info(suffix, request)),
            Operation::CompareParents => encode(self.handle_compare_parents(suffix, request)),
        }
    }

    /// Answers a request that could not be routed.
    pub fn error_response(&self, err: &ReceiverError) -> HttpResponse {
        encode::<Ack>(Ok(Response::from_status(error_status(err))))
    }

    /// Handles `startupdate`: `releaseRoot` parameter, content path as suffix.
    pub fn handle_start_update(
        &self,
        suffix: &str,
        request: &HttpRequest,
    ) -> ReceiverResult<Response<UpdateInfo>> {
        let release_root = request.required_param(params::RELEASE_ROOT)?;
        let info = self.receiver.start_update(release_root, suffix)?;
        Ok(Response::ok(info))
    }

    /// Handles `contentstate`: content path as suffix, repeated `path` parameters.
    pub fn handle_content_state(
        &self,
        suffix: &str,
        request: &HttpRequest,
    ) -> ReceiverResult<Response<ContentState>> {
        let paths = owned(request.params(params::PATH));
        let versionables = self.receiver.content_state(suffix, &paths)?;
        Ok(Response::ok(ContentState { versionables }))
    }

    /// Handles `pathupload`: `updateId` parameter, package root as suffix, archive as body.
    pub fn handle_path_upload(
        &self,
        suffix: &str,
        request: &HttpRequest,
    ) -> ReceiverResult<Response<Ack>> {
        let update_id = request.required_param(params::UPDATE_ID)?;
        let body = request
            .body
            .as_deref()
            .ok_or_else(|| ReceiverError::Validation("no archive in request body".to_string()))?;
        self.receiver.path_upload(update_id, suffix, body)?;
        Ok(Response::ok(Ack {}))
    }

    /// Handles `commitupdate`: `updateId`, `releaseChangeId`, repeated
    /// `deletedpath`, and the child orderings as JSON body.
    pub fn handle_commit(&self, request: &HttpRequest) -> ReceiverResult<Response<Ack>> {
        let update_id = request.required_param(params::UPDATE_ID)?;
        let marker = request.required_param(params::RELEASE_CHANGE_ID)?;
        let deleted = owned(request.params(params::DELETED_PATH));
        let body: CommitRequest = match request.body.as_deref() {
            Some(bytes) if !bytes.is_empty() => serde_json::from_slice(bytes)
                .map_err(canopy_protocol::ProtocolError::from)?,
            _ => CommitRequest::default(),
        };
        self.receiver
            .commit(update_id, marker, &deleted, &body.orderings)?;
        Ok(Response::ok(Ack {}))
    }

    /// Handles `abortupdate`.
    pub fn handle_abort(&self, request: &HttpRequest) -> ReceiverResult<Response<Ack>> {
        let update_id = request.required_param(params::UPDATE_ID)?;
        self.receiver.abort(update_id)?;
        Ok(Response::ok(Ack {}))
    }

    /// Handles `releaseinfo`: `releaseRoot` parameter, or the suffix.
    pub fn handle_release_info(
        &self,
        suffix: &str,
        request: &HttpRequest,
    ) -> ReceiverResult<Response<ReleaseInfo>> {
        let release_root = request.param(params::RELEASE_ROOT).unwrap_or(suffix);
        let info = self.receiver.release_info(release_root)?;
        Ok(Response {
            status: Status::ok(),
            data: info,
        })
    }

    /// Handles `compareparents`: `releaseRoot` parameter, JSON body.
    pub fn handle_compare_parents(
        &self,
        suffix: &str,
        request: &HttpRequest,
    ) -> ReceiverResult<Response<ParentComparison>> {
        let release_root = request.param(params::RELEASE_ROOT).unwrap_or(suffix);
        let body = request
            .body
            .as_deref()
            .ok_or_else(|| ReceiverError::Validation("no comparison in request body".to_string()))?;
        let comparison: CompareParentsRequest =
            serde_json::from_slice(body).map_err(canopy_protocol::ProtocolError::from)?;
        let result = self.receiver.compare_parents(release_root, &comparison)?;
        Ok(Response::ok(result))
    }
}

fn method_allowed(operation: Operation, method: Method) -> bool {
    match operation {
        Operation::ContentState => matches!(method, Method::Get | Method::Post),
        _ => operation.method() == method,
    }
}

fn owned(values: Vec<&str>) -> Vec<String> {
    values.into_iter().map(str::to_string).collect()
}

fn error_status(err: &ReceiverError) -> Status {
    if err.is_client_error() {
        warn!(error = %err, "request rejected");
    } else {
        error!(error = %err, "request failed");
    }
    Status::error(err.status_code(), err.to_string()).with_retry_advice(err.retry_advice())
}

fn encode<T: Payload>(result: ReceiverResult<Response<T>>) -> HttpResponse {
    let response = result.unwrap_or_else(|err| Response::from_status(error_status(&err)));
    let code = response.status.status;
    match response.to_json() {
        Ok(body) => HttpResponse::new(code, body),
        Err(err) => {
            error!(error = %err, "could not encode response");
            HttpResponse::new(500, ENCODING_FAILED.to_vec())
        }
    }
}
