//! Owned node trees.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::value::Property;

/// A node with its attributes and ordered children.
///
/// Used both as the in-memory representation of [`crate::MemoryStore`] and as
/// the snapshot format for exports, imports and archives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeTree {
    /// Attributes keyed by name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Property>,
    /// Children in their defined order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<(String, NodeTree)>,
}

impl NodeTree {
    /// Creates an empty node.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an attribute (builder style).
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, property: Property) -> Self {
        self.properties.insert(name.into(), property);
        self
    }

    /// Appends a child, replacing an existing child of the same name in place.
    #[must_use]
    pub fn with_child(mut self, name: impl Into<String>, child: NodeTree) -> Self {
        self.put_child(name.into(), child);
        self
    }

    /// Returns the child with the given name.
    pub fn child(&self, name: &str) -> Option<&NodeTree> {
        self.children.iter().find(|(n, _)| n == name).map(|(_, c)| c)
    }

    /// Returns the child with the given name, mutably.
    pub fn child_mut(&mut self, name: &str) -> Option<&mut NodeTree> {
        self.children
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, c)| c)
    }

    /// Inserts or replaces a child, keeping the position of a replaced child.
    pub fn put_child(&mut self, name: String, child: NodeTree) {
        match self.children.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = child,
            None => self.children.push((name, child)),
        }
    }

    /// Removes and returns the child with the given name.
    pub fn take_child(&mut self, name: &str) -> Option<NodeTree> {
        let idx = self.children.iter().position(|(n, _)| n == name)?;
        Some(self.children.remove(idx).1)
    }

    /// Names of the children, in order.
    pub fn child_names(&self) -> Vec<String> {
        self.children.iter().map(|(n, _)| n.clone()).collect()
    }

    /// Resolves a path relative to this node (segments separated by `/`).
    pub fn descendant(&self, relative: &str) -> Option<&NodeTree> {
        crate::path::segments(relative).try_fold(self, |node, seg| node.child(seg))
    }

    /// Resolves a relative path mutably.
    pub fn descendant_mut(&mut self, relative: &str) -> Option<&mut NodeTree> {
        crate::path::segments(relative).try_fold(self, |node, seg| node.child_mut(seg))
    }

    /// Number of nodes in this tree, including the node itself.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(|(_, c)| c.node_count()).sum::<usize>()
    }
}
