//! Replication of changed paths to one target.
//!
//! A remote replication runs one update session:
//!
//! 1. `startupdate` at the common parent of the changed paths
//! 2. stop early if the receiver already carries the release's change number
//! 3. `contentstate` and a local versionable listing decide what to send
//! 4. `pathupload` per changed or deleted path
//! 5. `commitupdate` with the deleted paths and the relevant child orderings
//!
//! The abort flag and the release's change number are checked between steps.
//! Any failure after step 1 aborts the session.

use canopy_protocol::{
    children_order, fingerprint, versionables_below, ChildrenOrderInfo, CompareParentsRequest,
    UpdateId, UpdateInfo, VersionableDiff, VersionableInfo,
};
use canopy_store::{attrs, path, ContentStore, StoreResult};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::driver::ReceiverFacade;
use crate::error::{ReplicationError, ReplicationResult};
use crate::in_place::InPlaceReplicator;
use crate::release::Release;
use crate::target::{ReplicationKind, ReplicationTarget};
use crate::transport::ReceiverTransport;

/// How a replication ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplicationStatus {
    /// No changed path lies in the target's source path.
    NothingToDo,
    /// The receiver already had the release's change number.
    UpToDate,
    /// A session was committed on the receiver.
    Committed,
    /// Content was copied in place.
    Copied,
}

/// What one replication did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationSummary {
    /// The target.
    pub target_id: String,
    /// Outcome.
    pub status: ReplicationStatus,
    /// The session used, for remote targets.
    pub update_id: Option<UpdateId>,
    /// Paths sent or copied.
    pub transferred: Vec<String>,
    /// Paths deleted on the target.
    pub deleted: Vec<String>,
    /// Attempts needed, the successful one included.
    pub attempts: u32,
}

impl ReplicationSummary {
    pub(crate) fn new(target_id: &str, status: ReplicationStatus) -> Self {
        Self {
            target_id: target_id.to_string(),
            status,
            update_id: None,
            transferred: Vec::new(),
            deleted: Vec::new(),
            attempts: 1,
        }
    }
}

/// Comparison of the source with a remote receiver.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareResult {
    /// Change number of the local release root.
    pub local_change_number: Option<String>,
    /// Change number of the remote release root.
    pub remote_change_number: Option<String>,
    /// Whether both change numbers are the same.
    pub release_change_numbers_equal: bool,
    /// Versionables that differ or exist on one side only.
    pub different_versionables: Vec<String>,
    /// Structural nodes whose child ordering differs.
    pub changed_children_orders: Vec<String>,
    /// Structural nodes whose attributes differ.
    pub changed_parent_nodes: Vec<String>,
}

impl CompareResult {
    /// Returns true if nothing differs.
    pub fn is_equal(&self) -> bool {
        self.release_change_numbers_equal
            && self.different_versionables.is_empty()
            && self.changed_children_orders.is_empty()
            && self.changed_parent_nodes.is_empty()
    }
}

/// Stops a replication when it is aborted or the release moves on.
pub(crate) struct Checkpoint<'a> {
    abort: &'a AtomicBool,
    store: &'a dyn ContentStore,
    release: &'a Release,
}

impl<'a> Checkpoint<'a> {
    pub(crate) fn new(abort: &'a AtomicBool, store: &'a dyn ContentStore, release: &'a Release) -> Self {
        Self {
            abort,
            store,
            release,
        }
    }

    pub(crate) fn check(&self) -> ReplicationResult<()> {
        if self.abort.load(Ordering::SeqCst) {
            info!(release_root = %self.release.root, "replication aborted");
            return Err(ReplicationError::Cancelled);
        }
        let found = self
            .store
            .string_property(&self.release.root, attrs::CHANGE_NUMBER)?;
        if found.as_deref().unwrap_or_default() != self.release.change_number {
            info!(release_root = %self.release.root, expected = %self.release.change_number, ?found, "release changed during replication");
            return Err(ReplicationError::SourceChanged {
                release_root: self.release.root.clone(),
                expected: self.release.change_number.clone(),
                found,
            });
        }
        Ok(())
    }
}

/// Structural nodes whose attributes and orderings matter for `paths`.
///
/// These are the ancestors of every path up to and including the release
/// root, plus every path and its descendants that are not versionables
/// (descent stops at versionables). Missing nodes are skipped. The result is
/// sorted, so parents come before their children.
pub fn relevant_parent_nodes<S: AsRef<str>>(
    store: &dyn ContentStore,
    release_root: &str,
    paths: &[S],
) -> StoreResult<Vec<String>> {
    let mut nodes = BTreeSet::new();
    for changed in paths {
        let changed = changed.as_ref();
        let mut current = path::parent(changed);
        while let Some(parent) = current {
            if !path::is_same_or_descendant(release_root, parent) {
                break;
            }
            if store.exists(parent)? {
                nodes.insert(parent.to_string());
            }
            current = path::parent(parent);
        }
        collect_structural(store, changed, &mut nodes)?;
    }
    Ok(nodes.into_iter().collect())
}

fn collect_structural(store: &dyn ContentStore, node: &str, nodes: &mut BTreeSet<String>) -> StoreResult<()> {
    if !store.exists(node)? || store.is_versionable(node)? {
        return Ok(());
    }
    nodes.insert(node.to_string());
    for name in store.children(node)? {
        collect_structural(store, &path::child(node, &name), nodes)?;
    }
    Ok(())
}

/// Child orderings of the [`relevant_parent_nodes`].
pub fn relevant_orderings<S: AsRef<str>>(
    store: &dyn ContentStore,
    release_root: &str,
    paths: &[S],
) -> StoreResult<Vec<ChildrenOrderInfo>> {
    let mut orderings = Vec::new();
    for node in relevant_parent_nodes(store, release_root, paths)? {
        if let Some(order) = children_order(store, &node, None)? {
            orderings.push(order);
        }
    }
    Ok(orderings)
}

/// Aborts the remote session when dropped, unless it was committed.
struct SessionGuard<'a> {
    facade: &'a ReceiverFacade,
    update: &'a UpdateInfo,
    open: bool,
}

impl<'a> SessionGuard<'a> {
    fn new(facade: &'a ReceiverFacade, update: &'a UpdateInfo) -> Self {
        Self {
            facade,
            update,
            open: true,
        }
    }

    fn committed(mut self) {
        self.open = false;
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(err) = self.facade.abort_update(self.update) {
                error!(update_id = %self.update.update_id, error = %err, "could not abort update");
            }
        }
    }
}

/// Paths to send in one session.
#[derive(Debug, Default)]
struct UploadPlan {
    transmit: Vec<String>,
    deleted: Vec<String>,
}

/// Replicates to a remote receiver.
pub struct RemoteReplicator {
    target: ReplicationTarget,
    source: Arc<dyn ContentStore>,
    facade: ReceiverFacade,
}

impl RemoteReplicator {
    /// Creates a replicator for a remote target.
    pub fn new(
        target: ReplicationTarget,
        source: Arc<dyn ContentStore>,
        transport: Arc<dyn ReceiverTransport>,
    ) -> ReplicationResult<Self> {
        let remote = target.remote_config().ok_or_else(|| {
            ReplicationError::Validation(format!("target {} is not a remote target", target.id))
        })?;
        let facade = ReceiverFacade::new(remote.target_url.clone(), transport, Arc::clone(&source));
        Ok(Self {
            target,
            source,
            facade,
        })
    }

    /// Returns the protocol driver.
    pub fn facade(&self) -> &ReceiverFacade {
        &self.facade
    }

    /// Runs one update session for `paths`.
    pub fn replicate(
        &self,
        release: &Release,
        paths: &[String],
        abort: &AtomicBool,
    ) -> ReplicationResult<ReplicationSummary> {
        let paths = self.target.scope_paths(paths);
        let mut summary = ReplicationSummary::new(&self.target.id, ReplicationStatus::NothingToDo);
        if paths.is_empty() {
            debug!(target_id = %self.target.id, "no changed path in source path");
            return Ok(summary);
        }
        let store = self.source.as_ref();
        let checkpoint = Checkpoint::new(abort, store, release);
        checkpoint.check()?;

        let content_path = self.content_path(&release.root, &paths)?;
        let update = self.facade.start_update(&release.root, &content_path)?;
        let session = SessionGuard::new(&self.facade, &update);
        summary.update_id = Some(update.update_id.clone());

        if update.original_change_marker.as_deref() == Some(release.change_number.as_str()) {
            info!(target_id = %self.target.id, change_number = %release.change_number, "remote is up to date");
            summary.status = ReplicationStatus::UpToDate;
            return Ok(summary);
        }

        checkpoint.check()?;
        let remote = self.facade.content_state(Some(&update), &content_path, &paths)?;
        let plan = self.plan(&paths, &remote)?;

        for root in &plan.transmit {
            checkpoint.check()?;
            self.facade.path_upload(&update, root)?;
        }

        checkpoint.check()?;
        let orderings = relevant_orderings(store, &release.root, &paths)?;
        self.facade
            .commit_update(&update, &release.change_number, &plan.deleted, orderings)?;
        session.committed();

        info!(
            target_id = %self.target.id,
            update_id = %update.update_id,
            uploaded = plan.transmit.len(),
            deleted = plan.deleted.len(),
            "replication committed"
        );
        summary.status = ReplicationStatus::Committed;
        summary.transferred = plan.transmit;
        summary.deleted = plan.deleted;
        Ok(summary)
    }

    /// Compares the receiver's content with the source below `paths`.
    pub fn compare_tree(&self, release_root: &str, paths: &[String]) -> ReplicationResult<CompareResult> {
        let store = self.source.as_ref();
        let mut paths = self.target.scope_paths(paths);
        if paths.is_empty() {
            paths.push(self.target.source_path.clone());
        }

        let local_change_number = store.string_property(release_root, attrs::CHANGE_NUMBER)?;
        let remote_change_number = self
            .facade
            .release_info(release_root)?
            .and_then(|info| info.change_marker);

        let content_path = self.content_path(release_root, &paths)?;
        let remote = self.facade.content_state(None, &content_path, &paths)?;
        let diff = VersionableDiff::compute(&self.local_versionables(&paths)?, &remote);

        let nodes = relevant_parent_nodes(store, release_root, &paths)?;
        let mut request = CompareParentsRequest::default();
        for node in &nodes {
            // The release root carries replication bookkeeping on both sides.
            if node != release_root {
                request.fingerprints.push(fingerprint(store, node, None)?);
            }
            if let Some(order) = children_order(store, node, None)? {
                request.orderings.push(order);
            }
        }
        let parents = self.facade.compare_parents(release_root, &request)?;

        let result = CompareResult {
            release_change_numbers_equal: local_change_number == remote_change_number,
            local_change_number,
            remote_change_number,
            different_versionables: diff.changed.into_iter().chain(diff.deleted).collect(),
            changed_children_orders: parents.different_orderings,
            changed_parent_nodes: parents.different_attributes,
        };
        debug!(target_id = %self.target.id, equal = result.is_equal(), "compared tree");
        Ok(result)
    }

    fn content_path(&self, release_root: &str, paths: &[String]) -> ReplicationResult<String> {
        let content_path = path::common_parent(paths.iter().map(String::as_str))
            .unwrap_or_else(|| self.target.source_path.clone());
        if !path::is_same_or_descendant(release_root, &content_path) {
            return Err(ReplicationError::Validation(format!(
                "{content_path} is not in release {release_root}"
            )));
        }
        Ok(content_path)
    }

    fn local_versionables(&self, paths: &[String]) -> StoreResult<Vec<VersionableInfo>> {
        let mut local = Vec::new();
        for p in paths {
            local.extend(versionables_below(self.source.as_ref(), p, None)?);
        }
        Ok(local)
    }

    /// Decides which paths to send.
    ///
    /// Deleted paths are sent too, so the receiver can align their parents.
    /// A versionable whose version the receiver already has is skipped.
    /// Structural nodes carry no version and are always sent.
    fn plan(&self, paths: &[String], remote: &[VersionableInfo]) -> StoreResult<UploadPlan> {
        let store = self.source.as_ref();
        let mut plan = UploadPlan::default();
        for p in paths {
            if !store.exists(p)? {
                plan.deleted.push(p.clone());
                plan.transmit.push(p.clone());
                continue;
            }
            let local = versionables_below(store, p, None)?;
            let remote_below: Vec<VersionableInfo> = remote
                .iter()
                .filter(|v| path::is_same_or_descendant(p, &v.path))
                .cloned()
                .collect();
            let diff = VersionableDiff::compute(&local, &remote_below);
            if diff.is_empty() && store.is_versionable(p)? {
                debug!(path = %p, "remote version is current");
                continue;
            }
            plan.transmit.push(p.clone());
        }
        Ok(plan)
    }
}

/// A replicator for one target.
pub enum Replicator {
    /// Copies within the source store.
    InPlace(InPlaceReplicator),
    /// Talks to a remote receiver.
    Remote(RemoteReplicator),
}

impl Replicator {
    /// Builds the replicator for `target`.
    ///
    /// Remote targets need a transport.
    pub fn for_target(
        target: ReplicationTarget,
        source: Arc<dyn ContentStore>,
        transport: Option<Arc<dyn ReceiverTransport>>,
    ) -> ReplicationResult<Self> {
        target.validate()?;
        if target.kind == ReplicationKind::InPlace {
            return Ok(Self::InPlace(InPlaceReplicator::new(target, source)?));
        }
        match transport {
            Some(transport) => Ok(Self::Remote(RemoteReplicator::new(target, source, transport)?)),
            None => Err(ReplicationError::Validation(format!(
                "remote target {} needs a transport",
                target.id
            ))),
        }
    }

    /// Replicates `paths` of `release`.
    pub fn replicate(
        &self,
        release: &Release,
        paths: &[String],
        abort: &AtomicBool,
    ) -> ReplicationResult<ReplicationSummary> {
        match self {
            Replicator::InPlace(replicator) => replicator.replicate(release, paths, abort),
            Replicator::Remote(replicator) => replicator.replicate(release, paths, abort),
        }
    }

    /// Compares the target with the source. Only remote targets can be compared.
    pub fn compare_tree(&self, release_root: &str, paths: &[String]) -> ReplicationResult<CompareResult> {
        match self {
            Replicator::Remote(replicator) => replicator.compare_tree(release_root, paths),
            Replicator::InPlace(_) => Err(ReplicationError::Validation(
                "in-place targets cannot be compared".to_string(),
            )),
        }
    }
}
