//! Moving staged content into live content.
//!
//! All functions take sender-side content paths and resolve them against a
//! staging root and a target root.

use canopy_store::{path, ContentStore, StoreError, StoreResult};
use std::collections::BTreeSet;
use tracing::{debug, error, warn};

/// Makes the unprotected attributes of `to` equal to those of `from`.
pub(crate) fn sync_attributes(store: &dyn ContentStore, from: &str, to: &str) -> StoreResult<()> {
    let source = store.unprotected_properties(from)?;
    let names: BTreeSet<&str> = source.iter().map(|e| e.name.as_str()).collect();
    for entry in store.unprotected_properties(to)? {
        if !names.contains(entry.name.as_str()) {
            store.remove_property(to, &entry.name)?;
        }
    }
    for entry in source {
        store.set_property(to, &entry.name, entry.property)?;
    }
    Ok(())
}

/// Removes a path from live content, bringing its ancestors in line first.
///
/// Ancestor attributes are synchronized top-down as long as both the staged
/// and the live ancestor exist.
pub(crate) fn delete_path(
    store: &dyn ContentStore,
    staging_root: &str,
    target_root: &str,
    content_path: &str,
) -> StoreResult<()> {
    for ancestor in path::ancestors(content_path) {
        let staged = path::append_paths(staging_root, &ancestor);
        let live = path::append_paths(target_root, &ancestor);
        if !store.exists(&staged)? || !store.exists(&live)? {
            break;
        }
        sync_attributes(store, &staged, &live)?;
    }
    let live = path::append_paths(target_root, content_path);
    if store.remove(&live)? {
        debug!(path = %live, "deleted");
    } else {
        warn!(path = %live, "path to delete is not present");
    }
    Ok(())
}

/// Replaces a live subtree with its staged copy.
///
/// Missing live ancestors are created and all ancestors get the staged
/// attributes. An existing live node keeps its identity: its attributes are
/// synchronized and its children replaced.
pub(crate) fn replace_subtree(
    store: &dyn ContentStore,
    staging_root: &str,
    target_root: &str,
    content_path: &str,
) -> StoreResult<()> {
    for ancestor in path::ancestors(content_path) {
        let staged = path::append_paths(staging_root, &ancestor);
        let live = path::append_paths(target_root, &ancestor);
        if !store.exists(&staged)? {
            return Err(StoreError::not_found(staged));
        }
        store.ensure_node(&live)?;
        sync_attributes(store, &staged, &live)?;
    }

    let staged = path::append_paths(staging_root, content_path);
    let live = path::append_paths(target_root, content_path);
    if store.exists(&live)? {
        sync_attributes(store, &staged, &live)?;
        for name in store.children(&live)? {
            store.remove(&path::child(&live, &name))?;
        }
        for name in store.children(&staged)? {
            store.move_node(&path::child(&staged, &name), &path::child(&live, &name))?;
        }
    } else {
        store.move_node(&staged, &live)?;
    }
    debug!(path = %live, "replaced from staging");
    Ok(())
}

/// Removes structural nodes left empty by a deletion.
///
/// Starts at the nearest existing ancestor of `deleted` and walks up while
/// nodes are strictly below `release_root`, not versionable and childless.
/// Returns the number of removed nodes.
pub(crate) fn remove_orphans(
    store: &dyn ContentStore,
    release_root: &str,
    deleted: &str,
) -> StoreResult<usize> {
    let mut candidate = deleted.to_string();
    while !store.exists(&candidate)? {
        match path::parent(&candidate) {
            Some(parent) => candidate = parent.to_string(),
            None => return Ok(0),
        }
    }

    let mut removed = 0;
    while path::is_descendant(release_root, &candidate)
        && !store.is_versionable(&candidate)?
        && store.children(&candidate)?.is_empty()
    {
        store.remove(&candidate)?;
        debug!(path = %candidate, "removed orphan");
        removed += 1;
        match path::parent(&candidate) {
            Some(parent) => candidate = parent.to_string(),
            None => break,
        }
    }
    Ok(removed)
}

/// Reorders the children of a live node to follow `desired`.
///
/// Names in `desired` that do not exist are skipped; children not named in
/// `desired` end up first. Returns whether the final order equals `desired`.
pub(crate) fn adjust_children_order(
    store: &dyn ContentStore,
    node: &str,
    desired: &[String],
) -> StoreResult<bool> {
    let current = store.children(node)?;
    if current == desired {
        return Ok(true);
    }
    for name in desired {
        if current.contains(name) {
            store.order_before(node, name, None)?;
        } else {
            warn!(path = node, child = %name, "cannot order missing child");
        }
    }
    let result = store.children(node)?;
    let matches = result == desired;
    if !matches {
        error!(path = node, expected = ?desired, actual = ?result, "child ordering differs after reordering");
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_store::{attrs, MemoryStore, NodeTree, Property};

    fn page() -> NodeTree {
        NodeTree::new().with_property(attrs::MIXIN_TYPES, Property::names([attrs::MIX_VERSIONABLE]))
    }

    #[test]
    fn sync_copies_and_removes_attributes() {
        let store = MemoryStore::new();
        store.ensure_node("/from").unwrap();
        store.ensure_node("/to").unwrap();
        store.set_property("/from", "title", Property::string("new")).unwrap();
        store.set_property("/to", "title", Property::string("old")).unwrap();
        store.set_property("/to", "stale", Property::boolean(true)).unwrap();

        sync_attributes(&store, "/from", "/to").unwrap();
        assert_eq!(store.string_property("/to", "title").unwrap().as_deref(), Some("new"));
        assert!(store.property("/to", "stale").unwrap().is_none());
    }

    #[test]
    fn replace_keeps_live_node_but_swaps_children() {
        let store = MemoryStore::new();
        store
            .import("/live/a", NodeTree::new().with_child("old", NodeTree::new()))
            .unwrap();
        store
            .import(
                "/stage/a",
                NodeTree::new()
                    .with_property("title", Property::string("A"))
                    .with_child("new", NodeTree::new()),
            )
            .unwrap();

        replace_subtree(&store, "/stage", "/live", "/a").unwrap();
        assert_eq!(store.children("/live/a").unwrap(), vec!["new"]);
        assert_eq!(store.string_property("/live/a", "title").unwrap().as_deref(), Some("A"));
        assert!(store.children("/stage/a").unwrap().is_empty());
    }

    #[test]
    fn replace_moves_new_subtree_and_creates_parents() {
        let store = MemoryStore::new();
        store.import("/stage/x/y", page()).unwrap();
        store.set_property("/stage/x", "title", Property::string("X")).unwrap();

        replace_subtree(&store, "/stage", "/live", "/x/y").unwrap();
        assert!(store.is_versionable("/live/x/y").unwrap());
        assert_eq!(store.string_property("/live/x", "title").unwrap().as_deref(), Some("X"));
        assert!(!store.exists("/stage/x/y").unwrap());
    }

    #[test]
    fn replace_requires_staged_ancestors() {
        let store = MemoryStore::new();
        let err = replace_subtree(&store, "/stage", "/live", "/x/y").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[test]
    fn delete_tolerates_missing_paths() {
        let store = MemoryStore::new();
        store.ensure_node("/live/a").unwrap();
        delete_path(&store, "/stage", "/live", "/a/gone").unwrap();
        delete_path(&store, "/stage", "/live", "/a").unwrap();
        assert!(!store.exists("/live/a").unwrap());
    }

    #[test]
    fn orphans_stop_at_versionables_and_release_root() {
        let store = MemoryStore::new();
        store.ensure_node("/site/f1/f2").unwrap();
        store.import("/site/p", page()).unwrap();
        store.ensure_node("/site/p/f3").unwrap();

        assert_eq!(remove_orphans(&store, "/site", "/site/f1/f2/deleted").unwrap(), 2);
        assert!(!store.exists("/site/f1").unwrap());
        assert!(store.exists("/site").unwrap());

        assert_eq!(remove_orphans(&store, "/site", "/site/p/f3/deleted").unwrap(), 1);
        assert!(store.exists("/site/p").unwrap());
    }

    #[test]
    fn orphans_keep_empty_release_root() {
        let store = MemoryStore::new();
        store.ensure_node("/site").unwrap();
        assert_eq!(remove_orphans(&store, "/site", "/site/a").unwrap(), 0);
        assert!(store.exists("/site").unwrap());
    }

    #[test]
    fn reorders_children() {
        let store = MemoryStore::new();
        for name in ["a", "b", "c"] {
            store.ensure_node(&format!("/n/{name}")).unwrap();
        }
        let desired: Vec<String> = ["c", "a", "b"].iter().map(|s| s.to_string()).collect();
        assert!(adjust_children_order(&store, "/n", &desired).unwrap());
        assert_eq!(store.children("/n").unwrap(), desired);

        let unknown: Vec<String> = ["zz", "b"].iter().map(|s| s.to_string()).collect();
        assert!(!adjust_children_order(&store, "/n", &unknown).unwrap());
    }
}
