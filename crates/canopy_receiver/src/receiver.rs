//! The publication receiver: update sessions against a content store.

use canopy_protocol::{
    children_order, consolidate_ordered, fingerprint, versionables_below, ChildrenOrderInfo, CompareParentsRequest,
    ParentComparison, ReleaseInfo, RetryAdvice, UpdateId, UpdateInfo, VersionableInfo,
};
use canopy_store::{attrs, path, Archive, ContentStore, Property, Value};
use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::apply;
use crate::config::ReceiverConfig;
use crate::error::{ReceiverError, ReceiverResult};
use crate::session::{self, SessionRegistry, SessionState, StagingGuard, StagingRecord};

/// Receives replicated content in update sessions.
///
/// A session is opened with [`start_update`](Self::start_update), filled by
/// any number of [`path_upload`](Self::path_upload) calls and finished by
/// either [`commit`](Self::commit) or [`abort`](Self::abort). Uploaded
/// content waits in a staging area below the configured `tmp_dir` until the
/// commit moves it into live content below `target_dir`.
///
/// Live content is not locked while a session runs. Instead, uploads and the
/// commit check that the release root's change marker still matches the one
/// seen at session start, and fail with a retryable
/// [`ReceiverError::Conflict`] otherwise.
pub struct PublicationReceiver {
    config: ReceiverConfig,
    store: Arc<dyn ContentStore>,
    sessions: SessionRegistry,
}

impl PublicationReceiver {
    /// Creates a receiver writing to `store`.
    pub fn new(config: ReceiverConfig, store: Arc<dyn ContentStore>) -> Self {
        Self {
            config,
            store,
            sessions: SessionRegistry::new(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Returns the content store.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Lifecycle state of a session this receiver has seen.
    pub fn session_state(&self, update_id: &UpdateId) -> Option<SessionState> {
        self.sessions.state(update_id)
    }

    /// Store path of the staging area of a session.
    pub fn staging_path(&self, update_id: &UpdateId) -> String {
        path::child(&self.config.tmp_dir, update_id.as_str())
    }

    /// Opens an update session for `content_path` below `release_root`.
    pub fn start_update(&self, release_root: &str, content_path: &str) -> ReceiverResult<UpdateInfo> {
        self.ensure_enabled()?;
        validate_path("release root", release_root)?;
        validate_path("content path", content_path)?;
        if !path::is_same_or_descendant(release_root, content_path) {
            return Err(ReceiverError::Validation(format!(
                "content path {content_path} is not within release root {release_root}"
            )));
        }
        self.cleanup_logged();

        let update_id = UpdateId::generate();
        let original_change_marker = self.change_marker(release_root)?;
        let record = StagingRecord {
            staging_path: self.staging_path(&update_id),
            update_id: update_id.clone(),
            release_root: release_root.to_string(),
            content_path: content_path.to_string(),
            original_change_marker: original_change_marker.clone(),
            updated_paths: Vec::new(),
        };
        record.create(self.store.as_ref())?;
        self.sessions.register(update_id.clone());

        info!(
            update_id = %update_id,
            release_root,
            content_path,
            marker = ?original_change_marker,
            "update started"
        );
        Ok(UpdateInfo {
            update_id,
            original_change_marker,
            created_at: Utc::now(),
        })
    }

    /// Imports an uploaded archive into the session's staging area.
    ///
    /// `package_root` must lie within the session's content path and match
    /// the archive's root. Repeated uploads of the same root replace the
    /// staged copy.
    pub fn path_upload(
        &self,
        update_id: &str,
        package_root: &str,
        archive: &[u8],
    ) -> ReceiverResult<()> {
        self.ensure_enabled()?;
        let mut record = self.open_session(update_id, SessionState::Uploading)?;
        validate_path("package root", package_root)?;
        if !path::is_same_or_descendant(&record.content_path, package_root) {
            return Err(ReceiverError::ConstraintViolation(format!(
                "package root {package_root} is not within content path {}",
                record.content_path
            )));
        }

        let archive = Archive::from_bytes(archive).map_err(|err| ReceiverError::Import {
            message: format!("unreadable archive for {package_root}: {err}"),
            advice: RetryAdvice::NoAutomaticRetry,
        })?;
        if archive.root_path != package_root {
            return Err(ReceiverError::ConstraintViolation(format!(
                "archive root {} does not match package root {package_root}",
                archive.root_path
            )));
        }

        let store = self.store.as_ref();
        session::touch(store, &record.staging_path)?;
        let report = archive.import_into(store, &record.staging_path);
        if report.has_errors() {
            return Err(ReceiverError::Import {
                message: report.errors.join("; "),
                advice: RetryAdvice::NoAutomaticRetry,
            });
        }
        record.add_updated_path(store, package_root)?;
        self.sessions.advance(&record.update_id, SessionState::Uploading);

        info!(
            update_id = %record.update_id,
            package_root,
            nodes = report.imported_nodes,
            "package staged"
        );
        Ok(())
    }

    /// Applies the staged content to live content and ends the session.
    ///
    /// Everything is validated before live content is touched; a validation
    /// or conflict failure leaves the session open. Once applying has begun
    /// the staging area is discarded on every exit path, and a failure is
    /// reported as [`ReceiverError::PartialCommit`]: changes made so far are
    /// not rolled back.
    pub fn commit(
        &self,
        update_id: &str,
        new_change_marker: &str,
        deleted_paths: &[String],
        orderings: &[ChildrenOrderInfo],
    ) -> ReceiverResult<()> {
        self.ensure_enabled()?;
        if new_change_marker.trim().is_empty() {
            return Err(ReceiverError::Validation("no change marker given".to_string()));
        }
        let record = self.open_session(update_id, SessionState::Committed)?;
        let store = self.store.as_ref();

        for deleted in deleted_paths {
            validate_path("deleted path", deleted)?;
            require_within(&record.content_path, deleted)?;
        }
        let deleted: BTreeSet<&str> = deleted_paths.iter().map(String::as_str).collect();
        // A staged package root holds every upload below it.
        let updated = consolidate_ordered(
            record
                .updated_paths
                .iter()
                .filter(|p| !deleted.contains(p.as_str())),
        );
        let updated: Vec<&str> = updated.iter().map(String::as_str).collect();
        for updated_path in &updated {
            require_within(&record.content_path, updated_path)?;
            if !store.exists(&record.staged(updated_path))? {
                return Err(ReceiverError::ConstraintViolation(format!(
                    "no staged content for {updated_path}"
                )));
            }
        }
        for ordering in orderings {
            validate_path("ordering path", &ordering.path)?;
            require_within(&record.release_root, &ordering.path)?;
        }

        let _staging = StagingGuard::new(store, record.staging_path.clone());
        match self.apply_commit(&record, new_change_marker, &deleted, &updated, orderings) {
            Ok(()) => {
                self.sessions.advance(&record.update_id, SessionState::Committed);
                info!(
                    update_id = %record.update_id,
                    release_root = %record.release_root,
                    marker = new_change_marker,
                    updated = updated.len(),
                    deleted = deleted.len(),
                    "update committed"
                );
                Ok(())
            }
            Err(err) => {
                self.sessions.advance(&record.update_id, SessionState::Aborted);
                error!(update_id = %record.update_id, error = %err, "commit failed after applying changes");
                Err(ReceiverError::PartialCommit {
                    update_id: record.update_id.to_string(),
                    source: Box::new(err),
                })
            }
        }
    }

    fn apply_commit(
        &self,
        record: &StagingRecord,
        new_change_marker: &str,
        deleted: &BTreeSet<&str>,
        updated: &[&str],
        orderings: &[ChildrenOrderInfo],
    ) -> ReceiverResult<()> {
        let store = self.store.as_ref();
        let target = self.config.target_dir.as_str();
        let staging = record.staging_path.as_str();
        store.ensure_node(target)?;

        for deleted_path in deleted {
            apply::delete_path(store, staging, target, deleted_path)?;
        }

        let release_root = self.live(&record.release_root);
        store.ensure_node(&release_root)?;

        for updated_path in updated {
            apply::replace_subtree(store, staging, target, updated_path)?;
        }
        for deleted_path in deleted {
            apply::remove_orphans(store, &release_root, &self.live(deleted_path))?;
        }

        for ordering in orderings {
            let node = self.live(&ordering.path);
            if store.exists(&node)? {
                apply::adjust_children_order(store, &node, &ordering.child_names)?;
            } else {
                error!(path = %node, "cannot order children of missing node");
            }
        }

        store.set_property(
            &release_root,
            attrs::LAST_REPLICATION_DATE,
            Property::date(Utc::now()),
        )?;
        store.set_property(
            &release_root,
            attrs::CHANGE_NUMBER,
            Property::string(new_change_marker),
        )?;
        Ok(())
    }

    /// Discards a session's staging area.
    ///
    /// Unknown and finished sessions are not an error.
    pub fn abort(&self, update_id: &str) -> ReceiverResult<()> {
        let id = UpdateId::parse(update_id)?;
        let removed = self.store.remove(&self.staging_path(&id))?;
        if self.sessions.check(&id, SessionState::Aborted).is_ok() && removed {
            self.sessions.advance(&id, SessionState::Aborted);
        }
        if removed {
            info!(update_id = %id, "update aborted");
        } else {
            debug!(update_id = %id, "abort of unknown or finished update");
        }
        Ok(())
    }

    /// Change marker and last replication date of a live release root.
    ///
    /// Returns `None` if the release root does not exist.
    pub fn release_info(&self, release_root: &str) -> ReceiverResult<Option<ReleaseInfo>> {
        self.ensure_enabled()?;
        validate_path("release root", release_root)?;
        let live = self.live(release_root);
        if !self.store.exists(&live)? {
            return Ok(None);
        }
        let last_replication = self
            .store
            .property(&live, attrs::LAST_REPLICATION_DATE)?
            .and_then(|p| p.values().first().and_then(Value::as_date));
        Ok(Some(ReleaseInfo {
            change_marker: self.store.string_property(&live, attrs::CHANGE_NUMBER)?,
            last_replication,
        }))
    }

    /// Versionables in live content below `paths`, or below `content_path`
    /// if `paths` is empty.
    ///
    /// Reported paths have the target directory removed.
    pub fn content_state(
        &self,
        content_path: &str,
        paths: &[String],
    ) -> ReceiverResult<Vec<VersionableInfo>> {
        self.ensure_enabled()?;
        validate_path("content path", content_path)?;
        let roots: Vec<&str> = if paths.is_empty() {
            vec![content_path]
        } else {
            paths.iter().map(String::as_str).collect()
        };

        let offset = Some(self.config.target_dir.as_str());
        let mut versionables = Vec::new();
        for root in roots {
            validate_path("path", root)?;
            require_within(content_path, root)?;
            versionables.extend(versionables_below(
                self.store.as_ref(),
                &self.live(root),
                offset,
            )?);
        }
        debug!(content_path, count = versionables.len(), "content state");
        Ok(versionables)
    }

    /// Compares sender fingerprints and child orderings with live content.
    ///
    /// Missing nodes count as different.
    pub fn compare_parents(
        &self,
        release_root: &str,
        request: &CompareParentsRequest,
    ) -> ReceiverResult<ParentComparison> {
        self.ensure_enabled()?;
        validate_path("release root", release_root)?;
        if !self.store.exists(&self.live(release_root))? {
            return Err(ReceiverError::Validation(format!(
                "release root {release_root} does not exist"
            )));
        }
        let store = self.store.as_ref();
        let offset = Some(self.config.target_dir.as_str());
        let mut result = ParentComparison::default();

        for expected in &request.fingerprints {
            validate_path("fingerprint path", &expected.path)?;
            require_within(release_root, &expected.path)?;
            let live = self.live(&expected.path);
            if !store.exists(&live)? || fingerprint(store, &live, offset)? != *expected {
                result.different_attributes.push(expected.path.clone());
            }
        }
        for expected in &request.orderings {
            validate_path("ordering path", &expected.path)?;
            require_within(release_root, &expected.path)?;
            match children_order(store, &self.live(&expected.path), offset)? {
                Some(actual) if actual.child_names == expected.child_names => {}
                _ => result.different_orderings.push(expected.path.clone()),
            }
        }
        debug!(
            release_root,
            attributes = result.different_attributes.len(),
            orderings = result.different_orderings.len(),
            "parents compared"
        );
        Ok(result)
    }

    /// Removes staging areas unused for longer than `cleanup_days`.
    ///
    /// Returns the number of removed areas.
    /// Finished sessions are forgotten after the same period, or after a
    /// day when staging cleanup is switched off.
    pub fn cleanup_stale(&self) -> ReceiverResult<usize> {
        let retention = Duration::days(i64::from(self.config.cleanup_days.max(1)));
        self.sessions.purge_finished(Utc::now() - retention);
        if self.config.cleanup_days < 1 {
            return Ok(0);
        }
        let expiry = Utc::now() - Duration::days(i64::from(self.config.cleanup_days));

        let store = self.store.as_ref();
        if !store.exists(&self.config.tmp_dir)? {
            return Ok(0);
        }
        let mut removed = 0;
        for name in store.children(&self.config.tmp_dir)? {
            let Ok(id) = UpdateId::parse(&name) else {
                continue;
            };
            let staging = self.staging_path(&id);
            let stale = match session::last_used(store, &staging)? {
                Some(used) => used < expiry,
                None => false,
            };
            if stale {
                store.remove(&staging)?;
                self.sessions.forget(&id);
                error!(update_id = %id, "removed stale staging area of an unfinished update");
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn cleanup_logged(&self) {
        if let Err(err) = self.cleanup_stale() {
            warn!(error = %err, "staging cleanup failed");
        }
    }

    /// Resolves a session: runs cleanup and checks the release root's change
    /// marker.
    fn open_session(&self, update_id: &str, to: SessionState) -> ReceiverResult<StagingRecord> {
        self.cleanup_logged();
        let id = UpdateId::parse(update_id)?;
        self.sessions.check(&id, to)?;

        let store = self.store.as_ref();
        let staging = self.staging_path(&id);
        if !store.exists(&staging)? {
            return Err(ReceiverError::UnknownUpdate(id.to_string()));
        }
        let record = StagingRecord::load(store, id, staging)?;

        let current = self.change_marker(&record.release_root)?;
        if current != record.original_change_marker {
            warn!(
                update_id = %record.update_id,
                expected = ?record.original_change_marker,
                found = ?current,
                "release changed during update"
            );
            return Err(ReceiverError::Conflict {
                release_root: record.release_root,
                expected: record.original_change_marker,
                found: current,
            });
        }
        Ok(record)
    }

    fn change_marker(&self, release_root: &str) -> ReceiverResult<Option<String>> {
        let live = self.live(release_root);
        if !self.store.exists(&live)? {
            return Ok(None);
        }
        Ok(self.store.string_property(&live, attrs::CHANGE_NUMBER)?)
    }

    fn live(&self, content_path: &str) -> String {
        path::append_paths(&self.config.target_dir, content_path)
    }

    fn ensure_enabled(&self) -> ReceiverResult<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(ReceiverError::Disabled)
        }
    }
}

fn validate_path(what: &str, content_path: &str) -> ReceiverResult<()> {
    if content_path.trim().is_empty() {
        return Err(ReceiverError::Validation(format!("no {what} given")));
    }
    path::validate(content_path)
        .map_err(|err| ReceiverError::Validation(format!("{what}: {err}")))
}

fn require_within(parent: &str, content_path: &str) -> ReceiverResult<()> {
    if path::is_same_or_descendant(parent, content_path) {
        Ok(())
    } else {
        Err(ReceiverError::ConstraintViolation(format!(
            "{content_path} is not within {parent}"
        )))
    }
}
