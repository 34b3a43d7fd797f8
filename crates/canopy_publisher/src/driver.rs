//! Protocol driver: one call per receiver operation.

use canopy_protocol::{
    params, Ack, ChildrenOrderInfo, CommitRequest, CompareParentsRequest, ContentState,
    HttpRequest, Operation, ParentComparison, Payload, ReleaseInfo, Response, UpdateInfo,
    VersionableInfo,
};
use canopy_store::{Archive, ContentStore};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{ReplicationError, ReplicationResult};
use crate::transport::ReceiverTransport;

/// Drives update sessions on one receiver.
///
/// Every call succeeds only if the answer decodes as a valid, successful
/// status. Failures carry the decoded status, the transport status line and
/// the receiver's retry advice. The facade never retries by itself.
pub struct ReceiverFacade {
    target_url: String,
    transport: Arc<dyn ReceiverTransport>,
    source: Arc<dyn ContentStore>,
}

impl ReceiverFacade {
    /// Creates a facade for the receiver at `target_url`, packaging content from `source`.
    pub fn new(
        target_url: impl Into<String>,
        transport: Arc<dyn ReceiverTransport>,
        source: Arc<dyn ContentStore>,
    ) -> Self {
        Self {
            target_url: target_url.into(),
            transport,
            source,
        }
    }

    /// Returns the receiver URL.
    pub fn target_url(&self) -> &str {
        &self.target_url
    }

    /// Opens an update session for `content_path` below `release_root`.
    pub fn start_update(&self, release_root: &str, content_path: &str) -> ReplicationResult<UpdateInfo> {
        info!(release_root, content_path, "start update");
        let request = self
            .request(Operation::StartUpdate, content_path)
            .with_param(params::RELEASE_ROOT, release_root);
        let what = format!("starting update of {content_path}");
        self.call::<UpdateInfo>(&what, request)?
            .data
            .ok_or_else(|| ReplicationError::rejected(format!("{what}: received no updateId"), None, None, None))
    }

    /// Lists the receiver's versionables below `paths`.
    pub fn content_state(
        &self,
        update: Option<&UpdateInfo>,
        content_path: &str,
        paths: &[String],
    ) -> ReplicationResult<Vec<VersionableInfo>> {
        info!(content_path, ?paths, "querying content state");
        let mut request = self
            .request(Operation::ContentState, content_path)
            .with_params(params::PATH, paths);
        if let Some(update) = update {
            request = request.with_param(params::UPDATE_ID, update.update_id.as_str());
        }
        let response = self.call::<ContentState>(&format!("querying content of {content_path}"), request)?;
        Ok(response.data.map(|d| d.versionables).unwrap_or_default())
    }

    /// Packages the subtree at `root` and uploads it into the session.
    ///
    /// Paths that no longer exist are uploaded too; the archive then carries
    /// only the ancestors. If nodes could not be read while packaging, the
    /// upload still happens and [`ReplicationError::Inconsistent`] is returned.
    pub fn path_upload(&self, update: &UpdateInfo, root: &str) -> ReplicationResult<()> {
        info!(update_id = %update.update_id, root, "uploading package");
        let mut archive = Archive::package(self.source.as_ref(), root)?;
        let body = archive.to_bytes()?;
        let request = self
            .request(Operation::PathUpload, root)
            .with_param(params::UPDATE_ID, update.update_id.as_str())
            .with_body(body);
        let what = format!("pathupload {root}");
        self.call::<Ack>(&what, request)?;

        let suppressed = archive.take_problems();
        if !suppressed.is_empty() {
            error!(root, count = suppressed.len(), "package was transmitted incomplete");
            return Err(ReplicationError::Inconsistent {
                message: format!("{what} transmitted incomplete content"),
                suppressed,
            });
        }
        Ok(())
    }

    /// Commits the session, recording `change_number` on the receiver's release root.
    pub fn commit_update(
        &self,
        update: &UpdateInfo,
        change_number: &str,
        deleted_paths: &[String],
        orderings: Vec<ChildrenOrderInfo>,
    ) -> ReplicationResult<()> {
        info!(update_id = %update.update_id, deleted = ?deleted_paths, "committing update");
        let body = serde_json::to_vec(&CommitRequest { orderings })
            .map_err(canopy_protocol::ProtocolError::from)?;
        let request = self
            .request(Operation::CommitUpdate, "")
            .with_param(params::UPDATE_ID, update.update_id.as_str())
            .with_param(params::RELEASE_CHANGE_ID, change_number)
            .with_params(params::DELETED_PATH, deleted_paths)
            .with_body(body);
        self.call::<Ack>(&format!("committing update {}", update.update_id), request)?;
        Ok(())
    }

    /// Discards the session.
    pub fn abort_update(&self, update: &UpdateInfo) -> ReplicationResult<()> {
        info!(update_id = %update.update_id, "aborting update");
        let request = self
            .request(Operation::AbortUpdate, "")
            .with_param(params::UPDATE_ID, update.update_id.as_str());
        self.call::<Ack>(&format!("aborting update {}", update.update_id), request)?;
        Ok(())
    }

    /// Reads the receiver's view of a release root.
    pub fn release_info(&self, release_root: &str) -> ReplicationResult<Option<ReleaseInfo>> {
        debug!(release_root, "get release info");
        let request = self
            .request(Operation::ReleaseInfo, "")
            .with_param(params::RELEASE_ROOT, release_root);
        Ok(self
            .call::<ReleaseInfo>(&format!("release info of {release_root}"), request)?
            .data)
    }

    /// Compares parent attributes and child orderings with the receiver.
    pub fn compare_parents(
        &self,
        release_root: &str,
        comparison: &CompareParentsRequest,
    ) -> ReplicationResult<ParentComparison> {
        info!(release_root, nodes = comparison.fingerprints.len(), "comparing parents");
        let body = serde_json::to_vec(comparison).map_err(canopy_protocol::ProtocolError::from)?;
        let request = self
            .request(Operation::CompareParents, "")
            .with_param(params::RELEASE_ROOT, release_root)
            .with_body(body);
        Ok(self
            .call::<ParentComparison>(&format!("comparing parents of {release_root}"), request)?
            .data
            .unwrap_or_default())
    }

    fn request(&self, operation: Operation, suffix: &str) -> HttpRequest {
        HttpRequest::new(operation.method(), operation.url(&self.target_url, suffix))
    }

    fn call<T: Payload>(&self, what: &str, request: HttpRequest) -> ReplicationResult<Response<T>> {
        debug!(url = %request.url, "executing request");
        let response = self.transport.send(&request).inspect_err(|err| {
            error!(error = %err, "{what} failed");
        })?;
        let status_line = response.status_line;
        match Response::<T>::from_json(&response.body) {
            Ok(decoded) if decoded.is_success() && status_line.is_success() => {
                debug!(code = status_line.code, reason = %status_line.reason, "{what} succeeded");
                Ok(decoded)
            }
            Ok(decoded) => {
                let message = if status_line.is_success() {
                    format!("received invalid status from remote system for {what}")
                } else {
                    format!("remote system answered {status_line} for {what}")
                };
                let err = ReplicationError::rejected(
                    message,
                    Some(decoded.status),
                    Some(status_line),
                    None,
                );
                error!(error = %err, "remote call failed");
                Err(err)
            }
            Err(decode) => {
                let err = ReplicationError::rejected(
                    format!("unreadable answer from remote system for {what}"),
                    None,
                    Some(status_line),
                    Some(decode.to_string()),
                );
                warn!(error = %err, cause = %decode, "remote call failed");
                Err(err)
            }
        }
    }
}
