//! In-memory content store.

use parking_lot::RwLock;
use std::collections::BTreeSet;

use crate::attrs;
use crate::error::{StoreError, StoreResult};
use crate::node::NodeTree;
use crate::path::{self, ROOT};
use crate::store::{ContentStore, PropertyEntry};
use crate::value::Property;

/// A content store held entirely in memory.
///
/// Suitable for unit tests, integration tests and the command line tool,
/// which loads and saves whole trees as JSON.
///
/// # Thread Safety
///
/// The tree sits behind a single `RwLock`; every call takes the lock once,
/// so individual operations are atomic but sequences of calls are not.
///
/// # Example
///
/// ```rust
/// use canopy_store::{ContentStore, MemoryStore, Property};
///
/// let store = MemoryStore::new();
/// store.ensure_node("/content/site").unwrap();
/// store.set_property("/content/site", "title", Property::string("Site")).unwrap();
/// assert_eq!(store.children("/content").unwrap(), vec!["site"]);
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    root: RwLock<NodeTree>,
    protected: BTreeSet<String>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::from_tree(NodeTree::new())
    }
}

impl MemoryStore {
    /// Creates an empty store containing only the root node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store whose root node is `tree`.
    #[must_use]
    pub fn from_tree(tree: NodeTree) -> Self {
        Self {
            root: RwLock::new(tree),
            protected: attrs::DEFAULT_PROTECTED.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Replaces the set of protected attribute names.
    #[must_use]
    pub fn with_protected<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.protected = names.into_iter().map(Into::into).collect();
        self
    }

    /// Returns a copy of the whole tree.
    #[must_use]
    pub fn snapshot(&self) -> NodeTree {
        self.root.read().clone()
    }

    fn lookup<'a>(root: &'a NodeTree, path: &str) -> StoreResult<&'a NodeTree> {
        path::validate(path)?;
        root.descendant(path).ok_or_else(|| StoreError::not_found(path))
    }

    fn lookup_mut<'a>(root: &'a mut NodeTree, path: &str) -> StoreResult<&'a mut NodeTree> {
        path::validate(path)?;
        root.descendant_mut(path).ok_or_else(|| StoreError::not_found(path))
    }

    fn parent_of(path: &str) -> StoreResult<&str> {
        path::parent(path).ok_or_else(|| StoreError::invalid_path(path, "the root has no parent"))
    }

    fn create_path<'a>(root: &'a mut NodeTree, path: &str) -> &'a mut NodeTree {
        let mut node = root;
        for seg in path::segments(path) {
            let idx = match node.children.iter().position(|(n, _)| n == seg) {
                Some(idx) => idx,
                None => {
                    node.children.push((seg.to_string(), NodeTree::new()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx].1;
        }
        node
    }
}

impl ContentStore for MemoryStore {
    fn exists(&self, path: &str) -> StoreResult<bool> {
        path::validate(path)?;
        Ok(self.root.read().descendant(path).is_some())
    }

    fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        let root = self.root.read();
        Ok(Self::lookup(&root, path)?.child_names())
    }

    fn properties(&self, path: &str) -> StoreResult<Vec<PropertyEntry>> {
        let root = self.root.read();
        let node = Self::lookup(&root, path)?;
        Ok(node
            .properties
            .iter()
            .map(|(name, property)| PropertyEntry {
                name: name.clone(),
                property: property.clone(),
                protected: self.protected.contains(name),
            })
            .collect())
    }

    fn property(&self, path: &str, name: &str) -> StoreResult<Option<Property>> {
        let root = self.root.read();
        Ok(Self::lookup(&root, path)?.properties.get(name).cloned())
    }

    fn set_property(&self, path: &str, name: &str, property: Property) -> StoreResult<()> {
        if self.is_protected(name) {
            return Err(StoreError::Protected {
                path: path.to_string(),
                name: name.to_string(),
            });
        }
        let mut root = self.root.write();
        Self::lookup_mut(&mut root, path)?
            .properties
            .insert(name.to_string(), property);
        Ok(())
    }

    fn remove_property(&self, path: &str, name: &str) -> StoreResult<bool> {
        let mut root = self.root.write();
        Ok(Self::lookup_mut(&mut root, path)?
            .properties
            .remove(name)
            .is_some())
    }

    fn is_protected(&self, name: &str) -> bool {
        self.protected.contains(name)
    }

    fn ensure_node(&self, path: &str) -> StoreResult<()> {
        path::validate(path)?;
        let mut root = self.root.write();
        Self::create_path(&mut root, path);
        Ok(())
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        let parent = Self::parent_of(path)?;
        path::validate(path)?;
        let mut root = self.root.write();
        match root.descendant_mut(parent) {
            Some(node) => Ok(node.take_child(path::name(path)).is_some()),
            None => Ok(false),
        }
    }

    fn move_node(&self, from: &str, to: &str) -> StoreResult<()> {
        let from_parent = Self::parent_of(from)?;
        let to_parent = Self::parent_of(to)?;
        path::validate(from)?;
        path::validate(to)?;
        if path::is_same_or_descendant(from, to) {
            return Err(StoreError::invalid_path(to, "cannot move a node below itself"));
        }

        let mut root = self.root.write();
        if root.descendant(to).is_some() {
            return Err(StoreError::AlreadyExists {
                path: to.to_string(),
            });
        }
        if root.descendant(to_parent).is_none() {
            return Err(StoreError::not_found(to_parent));
        }
        let node = Self::lookup_mut(&mut root, from_parent)?
            .take_child(path::name(from))
            .ok_or_else(|| StoreError::not_found(from))?;
        Self::lookup_mut(&mut root, to_parent)?
            .children
            .push((path::name(to).to_string(), node));
        Ok(())
    }

    fn order_before(&self, parent: &str, child: &str, before: Option<&str>) -> StoreResult<()> {
        let mut root = self.root.write();
        let node = Self::lookup_mut(&mut root, parent)?;
        if let Some(sibling) = before {
            if node.child(sibling).is_none() {
                return Err(StoreError::not_found(path::child(parent, sibling)));
            }
        }
        let moved = node
            .take_child(child)
            .ok_or_else(|| StoreError::not_found(path::child(parent, child)))?;
        let idx = before
            .and_then(|sibling| node.children.iter().position(|(n, _)| n == sibling))
            .unwrap_or(node.children.len());
        node.children.insert(idx, (child.to_string(), moved));
        Ok(())
    }

    fn export(&self, path: &str) -> StoreResult<NodeTree> {
        let root = self.root.read();
        Ok(Self::lookup(&root, path)?.clone())
    }

    fn import(&self, path: &str, tree: NodeTree) -> StoreResult<()> {
        path::validate(path)?;
        let mut root = self.root.write();
        if path == ROOT {
            *root = tree;
            return Ok(());
        }
        let parent = Self::parent_of(path)?;
        Self::create_path(&mut root, parent).put_child(path::name(path).to_string(), tree);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.ensure_node("/content/site/a").unwrap();
        store.ensure_node("/content/site/b").unwrap();
        store.ensure_node("/content/site/c").unwrap();
        store
    }

    #[test]
    fn memory_new_has_only_root() {
        let store = MemoryStore::new();
        assert!(store.exists("/").unwrap());
        assert!(store.children("/").unwrap().is_empty());
        assert!(!store.exists("/content").unwrap());
    }

    #[test]
    fn memory_ensure_node_creates_parents() {
        let store = store();
        assert!(store.exists("/content").unwrap());
        assert_eq!(store.children("/content/site").unwrap(), vec!["a", "b", "c"]);

        store.ensure_node("/content/site/a").unwrap();
        assert_eq!(store.children("/content/site").unwrap().len(), 3);
    }

    #[test]
    fn memory_children_of_missing_node_fails() {
        let store = store();
        let result = store.children("/nope");
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn memory_invalid_path_rejected() {
        let store = store();
        assert!(matches!(
            store.exists("content"),
            Err(StoreError::InvalidPath { .. })
        ));
    }

    #[test]
    fn memory_protected_properties() {
        let store = store();
        let err = store
            .set_property("/content/site", "uuid", Property::string("x"))
            .unwrap_err();
        assert!(matches!(err, StoreError::Protected { .. }));

        let store = MemoryStore::new().with_protected(["secret"]);
        store.ensure_node("/n").unwrap();
        store.set_property("/n", "uuid", Property::string("x")).unwrap();
        assert!(store.set_property("/n", "secret", Property::string("x")).is_err());
    }

    #[test]
    fn memory_properties_flag_protected() {
        let tree = NodeTree::new().with_child(
            "n",
            NodeTree::new()
                .with_property("uuid", Property::string("1234"))
                .with_property("title", Property::string("T")),
        );
        let store = MemoryStore::from_tree(tree);
        let entries = store.properties("/n").unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().any(|e| e.name == "uuid" && e.protected));
        assert_eq!(store.unprotected_properties("/n").unwrap().len(), 1);
    }

    #[test]
    fn memory_remove() {
        let store = store();
        assert!(store.remove("/content/site/b").unwrap());
        assert!(!store.remove("/content/site/b").unwrap());
        assert!(!store.remove("/missing/x").unwrap());
        assert!(store.remove("/").is_err());
    }

    #[test]
    fn memory_move_node() {
        let store = store();
        store.ensure_node("/content/site/a/deep").unwrap();
        store.move_node("/content/site/a", "/content/moved").unwrap();
        assert!(!store.exists("/content/site/a").unwrap());
        assert!(store.exists("/content/moved/deep").unwrap());

        let err = store.move_node("/content/site/b", "/content/site/c").unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists { .. }));

        let err = store.move_node("/content/site/b", "/nope/b").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));

        let err = store.move_node("/content/site", "/content/site/b/x").unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath { .. }));
    }

    #[test]
    fn memory_order_before() {
        let store = store();
        store.order_before("/content/site", "c", Some("a")).unwrap();
        assert_eq!(store.children("/content/site").unwrap(), vec!["c", "a", "b"]);

        store.order_before("/content/site", "c", None).unwrap();
        assert_eq!(store.children("/content/site").unwrap(), vec!["a", "b", "c"]);

        assert!(store.order_before("/content/site", "x", None).is_err());
        assert!(store.order_before("/content/site", "a", Some("x")).is_err());
        assert_eq!(store.children("/content/site").unwrap().len(), 3);
    }

    #[test]
    fn memory_export_import() {
        let store = store();
        store
            .set_property("/content/site/a", "title", Property::string("A"))
            .unwrap();
        let tree = store.export("/content/site").unwrap();

        store.import("/copy/site", tree.clone()).unwrap();
        assert_eq!(store.export("/copy/site").unwrap(), tree);

        store.import("/copy/site", NodeTree::new()).unwrap();
        assert!(store.children("/copy/site").unwrap().is_empty());
    }

    #[test]
    fn memory_is_versionable() {
        let store = store();
        assert!(!store.is_versionable("/content/site/a").unwrap());
        store
            .set_property(
                "/content/site/a",
                attrs::MIXIN_TYPES,
                Property::names(["mix:referenceable", attrs::MIX_VERSIONABLE]),
            )
            .unwrap();
        assert!(store.is_versionable("/content/site/a").unwrap());
    }
}
