//! Test fixtures: sample content trees and store helpers.

use canopy_store::{
    attrs, ContentStore, MemoryStore, NodeTree, Property, PropertyEntry, StoreError, StoreResult,
};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Release root of the sample site.
pub const SITE_ROOT: &str = "/content/site";

/// Change marker the sample site starts with.
pub const INITIAL_CHANGE_NUMBER: &str = "cn-0001";

/// A versionable page with the given version and title.
pub fn page(version: &str, title: &str) -> NodeTree {
    NodeTree::new()
        .with_property(attrs::MIXIN_TYPES, Property::names([attrs::MIX_VERSIONABLE]))
        .with_property(attrs::REPLICATED_VERSION, Property::string(version))
        .with_property("title", Property::string(title))
        .with_child(
            "content",
            NodeTree::new()
                .with_property("text", Property::string(format!("Text of {title}")))
                .with_property("image", Property::binary(title.as_bytes().to_vec())),
        )
}

/// A structural (non-versionable) folder.
pub fn folder(title: &str) -> NodeTree {
    NodeTree::new().with_property("title", Property::string(title))
}

/// The sample site below [`SITE_ROOT`]:
///
/// ```text
/// /content/site            changeNumber = cn-0001
/// /content/site/a          folder
/// /content/site/a/b        page v1
/// /content/site/a/x        page v1
/// /content/site/c          page v1
/// /content/site/d          page v1
/// ```
pub fn sample_site() -> NodeTree {
    let site = NodeTree::new()
        .with_property("title", Property::string("Sample Site"))
        .with_property(attrs::CHANGE_NUMBER, Property::string(INITIAL_CHANGE_NUMBER))
        .with_child(
            "a",
            folder("Folder A")
                .with_child("b", page("v1", "Page B"))
                .with_child("x", page("v1", "Page X")),
        )
        .with_child("c", page("v1", "Page C"))
        .with_child("d", page("v1", "Page D"));
    NodeTree::new().with_child("content", NodeTree::new().with_child("site", site))
}

/// A store holding [`sample_site`].
pub fn sample_store() -> MemoryStore {
    MemoryStore::from_tree(sample_site())
}

/// Creates or updates a page in `store`.
pub fn put_page(store: &dyn ContentStore, path: &str, version: &str, title: &str) {
    store
        .import(path, page(version, title))
        .expect("Failed to import page");
}

/// Sets the replicated version of an existing versionable.
pub fn set_version(store: &dyn ContentStore, path: &str, version: &str) {
    store
        .set_property(path, attrs::REPLICATED_VERSION, Property::string(version))
        .expect("Failed to set version");
}

/// Sets the change marker of a release root.
pub fn set_change_number(store: &dyn ContentStore, root: &str, marker: &str) {
    store
        .set_property(root, attrs::CHANGE_NUMBER, Property::string(marker))
        .expect("Failed to set change number");
}

/// Reads the change marker of a release root.
pub fn change_number(store: &dyn ContentStore, root: &str) -> Option<String> {
    store
        .string_property(root, attrs::CHANGE_NUMBER)
        .expect("Failed to read change number")
}

/// Non-protected content of a subtree, for comparing two stores.
///
/// Release bookkeeping attributes are left out.
pub fn content_of(store: &dyn ContentStore, path: &str) -> Option<NodeTree> {
    if !store.exists(path).expect("Failed to check path") {
        return None;
    }
    let mut tree = store.export(path).expect("Failed to export");
    strip(&mut tree, store);
    Some(tree)
}

fn strip(tree: &mut NodeTree, store: &dyn ContentStore) {
    tree.properties.retain(|name, _| {
        !store.is_protected(name)
            && name != attrs::CHANGE_NUMBER
            && name != attrs::LAST_REPLICATION_DATE
    });
    for (_, child) in &mut tree.children {
        strip(child, store);
    }
}

/// A store wrapper that fails reads of selected paths.
///
/// Used to provoke packaging problems.
pub struct FailingStore {
    inner: MemoryStore,
    failing: RwLock<BTreeSet<String>>,
}

impl FailingStore {
    /// Wraps a store; nothing fails until [`FailingStore::fail_reads_of`] is called.
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing: RwLock::new(BTreeSet::new()),
        }
    }

    /// Makes attribute reads of `path` fail.
    pub fn fail_reads_of(&self, path: &str) {
        self.failing.write().insert(path.to_string());
    }

    /// The wrapped store.
    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self, path: &str) -> StoreResult<()> {
        if self.failing.read().contains(path) {
            return Err(StoreError::Unavailable {
                path: path.to_string(),
                reason: "simulated read failure".to_string(),
            });
        }
        Ok(())
    }
}

impl ContentStore for FailingStore {
    fn exists(&self, path: &str) -> StoreResult<bool> {
        self.inner.exists(path)
    }

    fn children(&self, path: &str) -> StoreResult<Vec<String>> {
        self.inner.children(path)
    }

    fn properties(&self, path: &str) -> StoreResult<Vec<PropertyEntry>> {
        self.check(path)?;
        self.inner.properties(path)
    }

    fn property(&self, path: &str, name: &str) -> StoreResult<Option<Property>> {
        self.check(path)?;
        self.inner.property(path, name)
    }

    fn set_property(&self, path: &str, name: &str, property: Property) -> StoreResult<()> {
        self.inner.set_property(path, name, property)
    }

    fn remove_property(&self, path: &str, name: &str) -> StoreResult<bool> {
        self.inner.remove_property(path, name)
    }

    fn is_protected(&self, name: &str) -> bool {
        self.inner.is_protected(name)
    }

    fn ensure_node(&self, path: &str) -> StoreResult<()> {
        self.inner.ensure_node(path)
    }

    fn remove(&self, path: &str) -> StoreResult<bool> {
        self.inner.remove(path)
    }

    fn move_node(&self, from: &str, to: &str) -> StoreResult<()> {
        self.inner.move_node(from, to)
    }

    fn order_before(&self, parent: &str, child: &str, before: Option<&str>) -> StoreResult<()> {
        self.inner.order_before(parent, child, before)
    }

    fn export(&self, path: &str) -> StoreResult<NodeTree> {
        self.check(path)?;
        self.inner.export(path)
    }

    fn import(&self, path: &str, tree: NodeTree) -> StoreResult<()> {
        self.inner.import(path, tree)
    }
}

/// A JSON tree file in a temporary directory.
pub struct TreeFile {
    dir: TempDir,
    path: PathBuf,
}

impl TreeFile {
    /// Writes `tree` as `<name>.json` into a fresh temporary directory.
    pub fn write(name: &str, tree: &NodeTree) -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let path = dir.path().join(format!("{name}.json"));
        let json = serde_json::to_vec_pretty(tree).expect("Failed to encode tree");
        std::fs::write(&path, json).expect("Failed to write tree file");
        Self { dir, path }
    }

    /// Path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The temporary directory holding the file.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Reads the tree back.
    pub fn read(&self) -> NodeTree {
        let bytes = std::fs::read(&self.path).expect("Failed to read tree file");
        serde_json::from_slice(&bytes).expect("Failed to decode tree")
    }
}
