//! Transferable subtree archives.
//!
//! An archive holds the content below one root path together with the
//! attributes of every ancestor of that root, so a receiver can bring the
//! parents of an uploaded subtree in line with the sender. Archives of
//! deleted paths carry no subtree, only the ancestors.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::node::NodeTree;
use crate::path;
use crate::store::ContentStore;
use crate::value::Property;

/// The writable attributes of one ancestor of the archive root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AncestorEntry {
    /// Absolute path of the ancestor.
    pub path: String,
    /// Its non-protected attributes.
    pub properties: BTreeMap<String, Property>,
}

/// A packaged subtree.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Archive {
    /// Root path of the packaged subtree, as seen by the sender.
    pub root_path: String,
    /// Ancestors of the root from the top down, excluding `/`.
    pub ancestors: Vec<AncestorEntry>,
    /// The subtree, or `None` if the root does not exist.
    pub tree: Option<NodeTree>,
    #[serde(skip)]
    problems: Vec<StoreError>,
}

/// Outcome of [`Archive::import_into`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Number of subtree nodes written.
    pub imported_nodes: usize,
    /// Problems met while writing, one message each.
    pub errors: Vec<String>,
}

impl ImportReport {
    /// Returns true if anything went wrong.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

impl Archive {
    /// Packages the subtree at `root_path`.
    ///
    /// Nodes that cannot be read are left out and recorded; see
    /// [`Archive::problems`]. Only an invalid root path fails outright.
    pub fn package(store: &dyn ContentStore, root_path: &str) -> StoreResult<Self> {
        path::validate(root_path)?;
        let mut problems = Vec::new();

        let mut ancestors = Vec::new();
        for ancestor in path::ancestors(root_path) {
            match store.exists(&ancestor) {
                Ok(true) => {}
                Ok(false) => continue,
                Err(err) => {
                    problems.push(err);
                    continue;
                }
            }
            match store.unprotected_properties(&ancestor) {
                Ok(entries) => ancestors.push(AncestorEntry {
                    path: ancestor,
                    properties: entries.into_iter().map(|e| (e.name, e.property)).collect(),
                }),
                Err(err) => problems.push(err),
            }
        }

        let tree = match store.exists(root_path) {
            Ok(true) => pack_node(store, root_path, &mut problems),
            Ok(false) => None,
            Err(err) => {
                problems.push(err);
                None
            }
        };

        if !problems.is_empty() {
            warn!(root = root_path, count = problems.len(), "problems while packaging");
        }
        debug!(
            root = root_path,
            nodes = tree.as_ref().map_or(0, NodeTree::node_count),
            "packaged archive"
        );

        Ok(Self {
            root_path: root_path.to_string(),
            ancestors,
            tree,
            problems,
        })
    }

    /// Errors met while packaging. They do not survive serialization.
    pub fn problems(&self) -> &[StoreError] {
        &self.problems
    }

    /// Takes the recorded packaging errors out of the archive.
    pub fn take_problems(&mut self) -> Vec<StoreError> {
        std::mem::take(&mut self.problems)
    }

    /// Encodes the archive as JSON.
    pub fn to_bytes(&self) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes an archive produced by [`Archive::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> StoreResult<Self> {
        let archive: Self = serde_json::from_slice(bytes)?;
        path::validate(&archive.root_path)?;
        for ancestor in &archive.ancestors {
            path::validate(&ancestor.path)?;
        }
        Ok(archive)
    }

    /// Writes the archive below `staging_root`.
    ///
    /// Every path is prefixed with `staging_root`. Ancestors get their
    /// attributes set; the subtree replaces anything at its root. Failures
    /// are collected per node instead of stopping the import.
    pub fn import_into(&self, store: &dyn ContentStore, staging_root: &str) -> ImportReport {
        let mut report = ImportReport::default();

        for ancestor in &self.ancestors {
            let target = path::append_paths(staging_root, &ancestor.path);
            if let Err(err) = store.ensure_node(&target) {
                report.errors.push(format!("{target}: {err}"));
                continue;
            }
            for (name, property) in &ancestor.properties {
                if let Err(err) = store.set_property(&target, name, property.clone()) {
                    report.errors.push(format!("{target}@{name}: {err}"));
                }
            }
        }

        if let Some(tree) = &self.tree {
            let target = path::append_paths(staging_root, &self.root_path);
            match store.remove(&target) {
                Ok(_) => write_node(store, &target, tree, &mut report),
                Err(err) => report.errors.push(format!("{target}: {err}")),
            }
        }

        report
    }
}

fn pack_node(
    store: &dyn ContentStore,
    node_path: &str,
    problems: &mut Vec<StoreError>,
) -> Option<NodeTree> {
    let mut node = NodeTree::new();
    match store.unprotected_properties(node_path) {
        Ok(entries) => {
            node.properties = entries.into_iter().map(|e| (e.name, e.property)).collect();
        }
        Err(err) => {
            problems.push(err);
            return None;
        }
    }
    match store.children(node_path) {
        Ok(names) => {
            for name in names {
                let child_path = path::child(node_path, &name);
                if let Some(child) = pack_node(store, &child_path, problems) {
                    node.children.push((name, child));
                }
            }
        }
        Err(err) => problems.push(err),
    }
    Some(node)
}

fn write_node(store: &dyn ContentStore, target: &str, node: &NodeTree, report: &mut ImportReport) {
    if let Err(err) = store.ensure_node(target) {
        report.errors.push(format!("{target}: {err}"));
        return;
    }
    report.imported_nodes += 1;
    for (name, property) in &node.properties {
        if let Err(err) = store.set_property(target, name, property.clone()) {
            report.errors.push(format!("{target}@{name}: {err}"));
        }
    }
    for (name, child) in &node.children {
        write_node(store, &path::child(target, name), child, report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;

    fn source() -> MemoryStore {
        let store = MemoryStore::new();
        store.ensure_node("/content/site/a/b").unwrap();
        store
            .set_property("/content/site", "title", Property::string("Site"))
            .unwrap();
        store
            .set_property("/content/site/a", "body", Property::binary(vec![1u8, 2, 3]))
            .unwrap();
        store
    }

    #[test]
    fn package_captures_ancestors_and_subtree() {
        let archive = Archive::package(&source(), "/content/site/a").unwrap();
        assert_eq!(archive.root_path, "/content/site/a");
        let paths: Vec<_> = archive.ancestors.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["/content", "/content/site"]);
        assert!(archive.ancestors[1].properties.contains_key("title"));
        assert_eq!(archive.tree.as_ref().unwrap().node_count(), 2);
        assert!(archive.problems().is_empty());
    }

    #[test]
    fn package_missing_root_has_no_tree() {
        let archive = Archive::package(&source(), "/content/site/gone").unwrap();
        assert!(archive.tree.is_none());
        assert_eq!(archive.ancestors.len(), 2);
    }

    #[test]
    fn bytes_round_trip_and_import() {
        let archive = Archive::package(&source(), "/content/site/a").unwrap();
        let bytes = archive.to_bytes().unwrap();
        let decoded = Archive::from_bytes(&bytes).unwrap();

        let staging = MemoryStore::new();
        staging.ensure_node("/tmp/upd").unwrap();
        let report = decoded.import_into(&staging, "/tmp/upd");
        assert!(!report.has_errors(), "{:?}", report.errors);
        assert_eq!(report.imported_nodes, 2);
        assert_eq!(
            staging.string_property("/tmp/upd/content/site", "title").unwrap(),
            Some("Site".to_string())
        );
        assert_eq!(
            staging.property("/tmp/upd/content/site/a", "body").unwrap(),
            Some(Property::binary(vec![1u8, 2, 3]))
        );
        assert!(staging.exists("/tmp/upd/content/site/a/b").unwrap());
    }

    #[test]
    fn import_reports_rejected_properties() {
        let mut archive = Archive::package(&source(), "/content/site/a").unwrap();
        if let Some(tree) = archive.tree.as_mut() {
            tree.properties.insert("uuid".into(), Property::string("x"));
        }
        let staging = MemoryStore::new();
        let report = archive.import_into(&staging, "/tmp/upd");
        assert!(report.has_errors());
        assert_eq!(report.imported_nodes, 2);
    }

    #[test]
    fn from_bytes_rejects_garbage() {
        assert!(Archive::from_bytes(b"not json").is_err());
        let bad = br#"{"rootPath":"relative","ancestors":[],"tree":null}"#;
        assert!(matches!(
            Archive::from_bytes(bad),
            Err(StoreError::InvalidPath { .. })
        ));
    }
}
