//! Versionable listings, their comparison, and child orderings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use canopy_store::{attrs, path, ContentStore, StoreError, StoreResult};

/// The last replicated version of a versionable node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionableInfo {
    /// Path of the versionable.
    pub path: String,
    /// Its version marker.
    pub version: String,
}

impl VersionableInfo {
    /// Creates a new versionable info.
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            version: version.into(),
        }
    }
}

/// Child ordering of a structural node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildrenOrderInfo {
    /// Node path.
    pub path: String,
    /// Names of its children, in order.
    pub child_names: Vec<String>,
}

fn report_path(node_path: &str, offset: Option<&str>) -> StoreResult<String> {
    match offset {
        None => Ok(node_path.to_string()),
        Some(offset) => path::strip_base(offset, node_path)
            .ok_or_else(|| StoreError::invalid_path(node_path, format!("not below {offset}"))),
    }
}

/// Reads the version marker of a versionable node.
///
/// Returns `None` for non-versionables and, with a warning, for versionables
/// without a usable version.
pub fn versionable_info(
    store: &dyn ContentStore,
    node_path: &str,
    offset: Option<&str>,
) -> StoreResult<Option<VersionableInfo>> {
    if !store.is_versionable(node_path)? {
        return Ok(None);
    }
    match store.string_property(node_path, attrs::REPLICATED_VERSION)? {
        Some(version) if !version.trim().is_empty() => Ok(Some(VersionableInfo {
            path: report_path(node_path, offset)?,
            version,
        })),
        _ => {
            warn!(path = node_path, "versionable without version, skipped");
            Ok(None)
        }
    }
}

/// Lists the versionables at and below `root`, in pre-order.
///
/// Descent stops at versionables: nested versionables belong to their
/// enclosing one. A missing `root` yields an empty list.
pub fn versionables_below(
    store: &dyn ContentStore,
    root: &str,
    offset: Option<&str>,
) -> StoreResult<Vec<VersionableInfo>> {
    let mut result = Vec::new();
    if store.exists(root)? {
        collect_versionables(store, root, offset, &mut result)?;
    }
    Ok(result)
}

fn collect_versionables(
    store: &dyn ContentStore,
    node_path: &str,
    offset: Option<&str>,
    result: &mut Vec<VersionableInfo>,
) -> StoreResult<()> {
    if store.is_versionable(node_path)? {
        if let Some(info) = versionable_info(store, node_path, offset)? {
            result.push(info);
        }
        return Ok(());
    }
    for name in store.children(node_path)? {
        collect_versionables(store, &path::child(node_path, &name), offset, result)?;
    }
    Ok(())
}

/// Reads the child ordering of a node, or `None` if the node does not exist.
pub fn children_order(
    store: &dyn ContentStore,
    node_path: &str,
    offset: Option<&str>,
) -> StoreResult<Option<ChildrenOrderInfo>> {
    if !store.exists(node_path)? {
        return Ok(None);
    }
    Ok(Some(ChildrenOrderInfo {
        path: report_path(node_path, offset)?,
        child_names: store.children(node_path)?,
    }))
}

/// Difference between a local and a remote versionable listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionableDiff {
    /// Paths missing remotely or with a different version, in local order.
    pub changed: Vec<String>,
    /// Paths present only remotely, in remote order.
    pub deleted: Vec<String>,
}

impl VersionableDiff {
    /// Compares a local listing against a remote one.
    pub fn compute(local: &[VersionableInfo], remote: &[VersionableInfo]) -> Self {
        let remote_versions: BTreeMap<&str, &str> = remote
            .iter()
            .map(|v| (v.path.as_str(), v.version.as_str()))
            .collect();
        let local_paths: BTreeMap<&str, &str> = local
            .iter()
            .map(|v| (v.path.as_str(), v.version.as_str()))
            .collect();

        let changed = local
            .iter()
            .filter(|v| remote_versions.get(v.path.as_str()) != Some(&v.version.as_str()))
            .map(|v| v.path.clone())
            .collect();
        let deleted = remote
            .iter()
            .filter(|v| !local_paths.contains_key(v.path.as_str()))
            .map(|v| v.path.clone())
            .collect();
        Self { changed, deleted }
    }

    /// Returns true if both listings agree.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }
}
