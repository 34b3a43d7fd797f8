//! Content store trait definition.

use crate::attrs;
use crate::error::StoreResult;
use crate::node::NodeTree;
use crate::value::Property;

/// An attribute as listed by [`ContentStore::properties`].
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyEntry {
    /// Attribute name.
    pub name: String,
    /// Attribute value.
    pub property: Property,
    /// Whether the store manages this attribute itself.
    pub protected: bool,
}

/// A hierarchical content store.
///
/// Nodes are addressed by absolute `/`-separated paths, carry named
/// attributes and keep their children in a defined order. The root node `/`
/// always exists.
///
/// All methods take `&self`; implementations use interior mutability so a
/// store can be shared between a receiver and the sessions it runs.
///
/// # Invariants
///
/// - Attributes reported as `protected` are never written by callers;
///   `set_property` rejects them
/// - `children` returns names in the order set by `order_before`
/// - `export` followed by `import` at another path reproduces the
///   non-protected content
///
/// # Implementors
///
/// - [`crate::MemoryStore`] - For testing and the CLI
pub trait ContentStore: Send + Sync {
    /// Returns true if a node exists at `path`.
    fn exists(&self, path: &str) -> StoreResult<bool>;

    /// Returns the names of the node's children, in order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if the node does not exist.
    fn children(&self, path: &str) -> StoreResult<Vec<String>>;

    /// Lists all attributes of the node, protected ones included and flagged.
    fn properties(&self, path: &str) -> StoreResult<Vec<PropertyEntry>>;

    /// Reads one attribute.
    fn property(&self, path: &str, name: &str) -> StoreResult<Option<Property>>;

    /// Writes one attribute.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Protected`] for protected attribute names.
    fn set_property(&self, path: &str, name: &str, property: Property) -> StoreResult<()>;

    /// Removes one attribute, returning whether it was present.
    fn remove_property(&self, path: &str, name: &str) -> StoreResult<bool>;

    /// Returns true if the store manages the named attribute itself.
    fn is_protected(&self, name: &str) -> bool;

    /// Creates the node and any missing ancestors. Existing nodes are left untouched.
    fn ensure_node(&self, path: &str) -> StoreResult<()>;

    /// Removes the node and its subtree, returning whether it existed.
    fn remove(&self, path: &str) -> StoreResult<bool>;

    /// Moves a subtree. The destination must not exist; its parent must.
    fn move_node(&self, from: &str, to: &str) -> StoreResult<()>;

    /// Moves `child` of `parent` directly before `before`, or to the end if `before` is `None`.
    fn order_before(&self, parent: &str, child: &str, before: Option<&str>) -> StoreResult<()>;

    /// Snapshots the subtree at `path`.
    fn export(&self, path: &str) -> StoreResult<NodeTree>;

    /// Writes `tree` at `path`, replacing whatever was there and creating missing ancestors.
    fn import(&self, path: &str, tree: NodeTree) -> StoreResult<()>;

    /// Returns true if the node carries the versionable marker.
    fn is_versionable(&self, path: &str) -> StoreResult<bool> {
        Ok(self
            .property(path, attrs::MIXIN_TYPES)?
            .is_some_and(|p| p.contains_str(attrs::MIX_VERSIONABLE)))
    }

    /// Reads a single string-like attribute.
    fn string_property(&self, path: &str, name: &str) -> StoreResult<Option<String>> {
        Ok(self
            .property(path, name)?
            .and_then(|p| p.as_str().map(str::to_string)))
    }

    /// Lists only the attributes callers may write.
    fn unprotected_properties(&self, path: &str) -> StoreResult<Vec<PropertyEntry>> {
        let mut entries = self.properties(path)?;
        entries.retain(|e| !e.protected);
        Ok(entries)
    }
}
