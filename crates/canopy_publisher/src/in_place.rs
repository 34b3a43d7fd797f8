//! Replication into another location of the source store.

use canopy_store::{attrs, path, ContentStore, NodeTree, Property, StoreResult};
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ReplicationError, ReplicationResult};
use crate::release::Release;
use crate::replicator::{relevant_parent_nodes, Checkpoint, ReplicationStatus, ReplicationSummary};
use crate::target::ReplicationTarget;

/// Copies changed subtrees from the target's source path to its target path.
pub struct InPlaceReplicator {
    target: ReplicationTarget,
    target_path: String,
    store: Arc<dyn ContentStore>,
}

impl InPlaceReplicator {
    /// Creates a replicator for an in-place target.
    pub fn new(target: ReplicationTarget, store: Arc<dyn ContentStore>) -> ReplicationResult<Self> {
        let target_path = target.target_path.clone().ok_or_else(|| {
            ReplicationError::Validation(format!("in-place target {} has no target path", target.id))
        })?;
        Ok(Self {
            target,
            target_path,
            store,
        })
    }

    /// Copies `paths`, removes copies of deleted paths and stamps the target path.
    pub fn replicate(
        &self,
        release: &Release,
        paths: &[String],
        abort: &AtomicBool,
    ) -> ReplicationResult<ReplicationSummary> {
        let paths = self.target.scope_paths(paths);
        let mut summary = ReplicationSummary::new(&self.target.id, ReplicationStatus::NothingToDo);
        if paths.is_empty() {
            return Ok(summary);
        }
        let store = self.store.as_ref();
        let checkpoint = Checkpoint::new(abort, store, release);

        for source in &paths {
            checkpoint.check()?;
            let copy = self.copy_path(source)?;
            self.sync_ancestors(source)?;
            if store.exists(source)? {
                let tree = without_protected(store.export(source)?, store);
                store.import(&copy, tree)?;
                debug!(from = %source, to = %copy, "copied");
                summary.transferred.push(source.clone());
            } else {
                if store.remove(&copy)? {
                    debug!(path = %copy, "removed copy");
                } else {
                    warn!(path = %copy, "copy to delete is not present");
                }
                summary.deleted.push(source.clone());
            }
        }

        checkpoint.check()?;
        for node in relevant_parent_nodes(store, &self.target.source_path, &paths)? {
            let copy = self.copy_path(&node)?;
            if store.exists(&copy)? {
                order_like(store, &store.children(&node)?, &copy)?;
            }
        }

        store.ensure_node(&self.target_path)?;
        store.set_property(
            &self.target_path,
            attrs::CHANGE_NUMBER,
            Property::string(&release.change_number),
        )?;
        store.set_property(&self.target_path, attrs::LAST_REPLICATION_DATE, Property::date(Utc::now()))?;

        info!(
            target_id = %self.target.id,
            copied = summary.transferred.len(),
            deleted = summary.deleted.len(),
            "in-place replication done"
        );
        summary.status = ReplicationStatus::Copied;
        Ok(summary)
    }

    fn copy_path(&self, source: &str) -> ReplicationResult<String> {
        let relative = path::relative_path(&self.target.source_path, source).ok_or_else(|| {
            ReplicationError::Validation(format!("{source} is not below {}", self.target.source_path))
        })?;
        Ok(path::append_paths(&self.target_path, relative))
    }

    /// Gives the copies of the ancestors of `source` the source's attributes.
    fn sync_ancestors(&self, source: &str) -> ReplicationResult<()> {
        let store = self.store.as_ref();
        let ancestors = path::ancestors(source)
            .into_iter()
            .filter(|a| path::is_same_or_descendant(&self.target.source_path, a));
        for ancestor in ancestors {
            if !store.exists(&ancestor)? {
                break;
            }
            let copy = self.copy_path(&ancestor)?;
            store.ensure_node(&copy)?;
            sync_attributes(store, &ancestor, &copy)?;
        }
        Ok(())
    }
}

/// Makes the unprotected attributes of `to` those of `from`, leaving release bookkeeping alone.
fn sync_attributes(store: &dyn ContentStore, from: &str, to: &str) -> StoreResult<()> {
    let source = store.unprotected_properties(from)?;
    let names: BTreeSet<&str> = source.iter().map(|e| e.name.as_str()).collect();
    for entry in store.unprotected_properties(to)? {
        if !names.contains(entry.name.as_str()) && !is_bookkeeping(&entry.name) {
            store.remove_property(to, &entry.name)?;
        }
    }
    for entry in source {
        if !is_bookkeeping(&entry.name) {
            store.set_property(to, &entry.name, entry.property)?;
        }
    }
    Ok(())
}

fn is_bookkeeping(name: &str) -> bool {
    name == attrs::CHANGE_NUMBER || name == attrs::LAST_REPLICATION_DATE
}

fn without_protected(mut tree: NodeTree, store: &dyn ContentStore) -> NodeTree {
    tree.properties.retain(|name, _| !store.is_protected(name));
    for (_, child) in &mut tree.children {
        *child = without_protected(std::mem::take(child), store);
    }
    tree
}

fn order_like(store: &dyn ContentStore, desired: &[String], node: &str) -> StoreResult<()> {
    let current = store.children(node)?;
    if current == desired {
        return Ok(());
    }
    for name in desired.iter().filter(|n| current.contains(n)) {
        store.order_before(node, name, None)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_store::MemoryStore;
    use canopy_testkit::prelude::*;

    const COPY_ROOT: &str = "/content/copy";

    fn replicator(store: Arc<MemoryStore>) -> InPlaceReplicator {
        let target = ReplicationTarget::in_place("copy", SITE_ROOT, COPY_ROOT, "preview");
        InPlaceReplicator::new(target, store).unwrap()
    }

    fn release() -> Release {
        Release::new(SITE_ROOT, INITIAL_CHANGE_NUMBER)
    }

    #[test]
    fn copies_changed_subtrees() {
        let store = Arc::new(sample_store());
        let summary = replicator(store.clone())
            .replicate(&release(), &["/content/site/a".to_string()], &AtomicBool::new(false))
            .unwrap();

        assert_eq!(summary.status, ReplicationStatus::Copied);
        assert_eq!(summary.transferred, vec!["/content/site/a"]);
        assert_eq!(
            content_of(store.as_ref(), "/content/site/a"),
            content_of(store.as_ref(), "/content/copy/a")
        );
        assert!(!store.exists("/content/copy/c").unwrap());
        assert_eq!(change_number(store.as_ref(), COPY_ROOT).as_deref(), Some(INITIAL_CHANGE_NUMBER));
        assert_eq!(
            store.string_property(COPY_ROOT, "title").unwrap().as_deref(),
            Some("Sample Site")
        );
    }

    #[test]
    fn removes_copies_of_deleted_paths() {
        let store = Arc::new(sample_store());
        let replicator = replicator(store.clone());
        let paths = vec!["/content/site/c".to_string(), "/content/site/d".to_string()];
        replicator.replicate(&release(), &paths, &AtomicBool::new(false)).unwrap();
        assert!(store.exists("/content/copy/d").unwrap());

        store.remove("/content/site/d").unwrap();
        let summary = replicator
            .replicate(&release(), &["/content/site/d".to_string()], &AtomicBool::new(false))
            .unwrap();
        assert_eq!(summary.deleted, vec!["/content/site/d"]);
        assert!(!store.exists("/content/copy/d").unwrap());
        assert!(store.exists("/content/copy/c").unwrap());
    }

    #[test]
    fn copies_follow_source_ordering() {
        let store = Arc::new(sample_store());
        let replicator = replicator(store.clone());
        let all = vec!["/content/site".to_string()];
        replicator.replicate(&release(), &all, &AtomicBool::new(false)).unwrap();

        store.order_before(SITE_ROOT, "d", Some("a")).unwrap();
        replicator
            .replicate(&release(), &["/content/site/d".to_string()], &AtomicBool::new(false))
            .unwrap();
        assert_eq!(store.children(COPY_ROOT).unwrap(), vec!["d", "a", "c"]);
    }

    #[test]
    fn protected_attributes_are_not_copied() {
        let store = Arc::new(sample_store());
        store
            .import(
                "/content/site/c/content/x",
                NodeTree::new().with_property("uuid", Property::string("1234")),
            )
            .unwrap();
        replicator(store.clone())
            .replicate(&release(), &["/content/site/c".to_string()], &AtomicBool::new(false))
            .unwrap();
        assert!(store.exists("/content/copy/c/content/x").unwrap());
        assert!(store.property("/content/copy/c/content/x", "uuid").unwrap().is_none());
    }
}
