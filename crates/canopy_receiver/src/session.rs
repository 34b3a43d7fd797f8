//! Update sessions: lifecycle states, the session registry and staging areas.
//!
//! A session's durable state lives on its staging node
//! `<tmpDir>/<updateId>` as plain attributes, next to the uploaded content.
//! The in-memory registry only tracks lifecycle states so finished sessions
//! can be told apart from unknown ones.

use canopy_protocol::UpdateId;
use canopy_store::{attrs, path, ContentStore, Property, StoreResult, Value};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, error};

use crate::error::{ReceiverError, ReceiverResult};

/// Staging attribute holding the session's release root.
pub const RELEASE_ROOT_ATTR: &str = "releaseRoot";
/// Staging attribute holding the session's content path.
pub const CONTENT_PATH_ATTR: &str = "contentPath";
/// Staging attribute holding the change marker seen at session start.
pub const ORIGINAL_MARKER_ATTR: &str = "originalChangeMarker";
/// Staging attribute listing the uploaded package roots.
pub const UPDATED_PATHS_ATTR: &str = "updatedPaths";

/// Lifecycle state of an update session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Staging allocated, nothing uploaded yet.
    Started,
    /// At least one package uploaded.
    Uploading,
    /// Staged content applied to live content.
    Committed,
    /// Staging discarded.
    Aborted,
}

impl SessionState {
    /// Returns true for states no operation can leave.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Committed | SessionState::Aborted)
    }

    /// Returns true if the session may move from `self` to `to`.
    pub fn can_transition_to(self, to: SessionState) -> bool {
        match self {
            SessionState::Started | SessionState::Uploading => to != SessionState::Started,
            SessionState::Committed | SessionState::Aborted => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Started => "started",
            SessionState::Uploading => "uploading",
            SessionState::Committed => "committed",
            SessionState::Aborted => "aborted",
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionEntry {
    state: SessionState,
    since: DateTime<Utc>,
}

/// Lifecycle states of the sessions this receiver has seen.
#[derive(Default)]
pub(crate) struct SessionRegistry {
    sessions: RwLock<HashMap<UpdateId, SessionEntry>>,
}

impl SessionRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: UpdateId) {
        let entry = SessionEntry {
            state: SessionState::Started,
            since: Utc::now(),
        };
        self.sessions.write().insert(id, entry);
    }

    pub(crate) fn state(&self, id: &UpdateId) -> Option<SessionState> {
        self.sessions.read().get(id).map(|e| e.state)
    }

    /// Fails if the session is known and may not move to `to`.
    ///
    /// Sessions missing from the registry (e.g. after a restart) count as
    /// started; their staging area is the authority.
    pub(crate) fn check(&self, id: &UpdateId, to: SessionState) -> ReceiverResult<()> {
        match self.state(id) {
            Some(from) if !from.can_transition_to(to) => {
                Err(ReceiverError::InvalidStateTransition { from, to })
            }
            _ => Ok(()),
        }
    }

    pub(crate) fn advance(&self, id: &UpdateId, to: SessionState) {
        let entry = SessionEntry {
            state: to,
            since: Utc::now(),
        };
        self.sessions.write().insert(id.clone(), entry);
    }

    /// Drops a session, e.g. when its staging area expired.
    pub(crate) fn forget(&self, id: &UpdateId) {
        self.sessions.write().remove(id);
    }

    /// Drops finished sessions older than `expiry`.
    pub(crate) fn purge_finished(&self, expiry: DateTime<Utc>) {
        self.sessions
            .write()
            .retain(|_, e| !(e.state.is_terminal() && e.since < expiry));
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.sessions.read().len()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, id: &UpdateId, by: chrono::Duration) {
        if let Some(entry) = self.sessions.write().get_mut(id) {
            entry.since = entry.since - by;
        }
    }
}

/// Session data persisted on the staging node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRecord {
    /// The session.
    pub update_id: UpdateId,
    /// Store path of the staging area.
    pub staging_path: String,
    /// Release root the session works in.
    pub release_root: String,
    /// Subtree the session may change.
    pub content_path: String,
    /// Change marker of the live release root at session start.
    pub original_change_marker: Option<String>,
    /// Package roots uploaded so far, in upload order.
    pub updated_paths: Vec<String>,
}

impl StagingRecord {
    /// Creates the staging node and writes the record to it.
    pub(crate) fn create(&self, store: &dyn ContentStore) -> StoreResult<()> {
        store.ensure_node(&self.staging_path)?;
        let node = self.staging_path.as_str();
        store.set_property(node, RELEASE_ROOT_ATTR, Property::string(&self.release_root))?;
        store.set_property(node, CONTENT_PATH_ATTR, Property::string(&self.content_path))?;
        if let Some(marker) = &self.original_change_marker {
            store.set_property(node, ORIGINAL_MARKER_ATTR, Property::string(marker))?;
        }
        store.set_property(
            node,
            UPDATED_PATHS_ATTR,
            Property::strings(self.updated_paths.iter().cloned()),
        )?;
        touch(store, node)
    }

    /// Reads the record of an existing staging node.
    pub(crate) fn load(
        store: &dyn ContentStore,
        update_id: UpdateId,
        staging_path: String,
    ) -> ReceiverResult<Self> {
        let required = |name: &str| -> ReceiverResult<String> {
            store.string_property(&staging_path, name)?.ok_or_else(|| {
                ReceiverError::UnknownUpdate(format!("{update_id}: staging area lacks {name}"))
            })
        };
        let release_root = required(RELEASE_ROOT_ATTR)?;
        let content_path = required(CONTENT_PATH_ATTR)?;
        let original_change_marker = store.string_property(&staging_path, ORIGINAL_MARKER_ATTR)?;
        let updated_paths = store
            .property(&staging_path, UPDATED_PATHS_ATTR)?
            .map(|p| {
                p.values()
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            update_id,
            staging_path,
            release_root,
            content_path,
            original_change_marker,
            updated_paths,
        })
    }

    /// Appends an uploaded package root and persists the list.
    pub(crate) fn add_updated_path(
        &mut self,
        store: &dyn ContentStore,
        package_root: &str,
    ) -> StoreResult<()> {
        if !self.updated_paths.iter().any(|p| p == package_root) {
            self.updated_paths.push(package_root.to_string());
        }
        store.set_property(
            &self.staging_path,
            UPDATED_PATHS_ATTR,
            Property::strings(self.updated_paths.iter().cloned()),
        )
    }

    /// Staging location of a content path.
    pub fn staged(&self, content_path: &str) -> String {
        path::append_paths(&self.staging_path, content_path)
    }
}

/// Marks a staging node as used now.
pub(crate) fn touch(store: &dyn ContentStore, staging_path: &str) -> StoreResult<()> {
    store.set_property(staging_path, attrs::LAST_MODIFIED, Property::date(Utc::now()))
}

/// When a staging node was last used.
pub(crate) fn last_used(
    store: &dyn ContentStore,
    staging_path: &str,
) -> StoreResult<Option<DateTime<Utc>>> {
    for name in [attrs::LAST_MODIFIED, attrs::CREATED] {
        let date = store
            .property(staging_path, name)?
            .and_then(|p| p.values().first().and_then(Value::as_date));
        if date.is_some() {
            return Ok(date);
        }
    }
    Ok(None)
}

/// Removes a staging area when dropped.
pub(crate) struct StagingGuard<'a> {
    store: &'a dyn ContentStore,
    path: String,
}

impl<'a> StagingGuard<'a> {
    pub(crate) fn new(store: &'a dyn ContentStore, path: impl Into<String>) -> Self {
        Self {
            store,
            path: path.into(),
        }
    }
}

impl Drop for StagingGuard<'_> {
    fn drop(&mut self) {
        match self.store.remove(&self.path) {
            Ok(_) => debug!(staging = %self.path, "staging area removed"),
            Err(err) => error!(staging = %self.path, error = %err, "could not remove staging area"),
        }
    }
}
