//! Releases and the change events reported for them.

use canopy_store::{attrs, ContentStore, StoreResult};
use serde::{Deserialize, Serialize};

/// A release of the source content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Release {
    /// Release root.
    pub root: String,
    /// Change number of the release at the time of the event.
    pub change_number: String,
    /// Stages the release is marked for, e.g. `public` or `preview`.
    #[serde(default)]
    pub marks: Vec<String>,
}

impl Release {
    /// Creates a release without marks.
    pub fn new(root: impl Into<String>, change_number: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            change_number: change_number.into(),
            marks: Vec::new(),
        }
    }

    /// Reads the release's current change number from the store.
    ///
    /// A release root without change number gets an empty one.
    pub fn current(store: &dyn ContentStore, root: &str) -> StoreResult<Self> {
        let change_number = store
            .string_property(root, attrs::CHANGE_NUMBER)?
            .unwrap_or_default();
        Ok(Self::new(root, change_number))
    }

    /// Adds marks.
    pub fn with_marks<I, S>(mut self, marks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.marks.extend(marks.into_iter().map(Into::into));
        self
    }

    /// Returns true if the release carries the mark, ignoring case.
    pub fn has_mark(&self, stage: &str) -> bool {
        self.marks.iter().any(|m| m.eq_ignore_ascii_case(stage))
    }
}

/// Paths changed in one release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    /// The changed release.
    pub release: Release,
    /// Paths created or moved here.
    #[serde(default)]
    pub new_or_moved: Vec<String>,
    /// Paths removed or moved away.
    #[serde(default)]
    pub removed_or_moved: Vec<String>,
    /// Paths changed in place.
    #[serde(default)]
    pub updated: Vec<String>,
}

impl ChangeEvent {
    /// Creates an event without paths.
    pub fn new(release: Release) -> Self {
        Self {
            release,
            new_or_moved: Vec::new(),
            removed_or_moved: Vec::new(),
            updated: Vec::new(),
        }
    }

    /// Adds updated paths.
    pub fn with_updated<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.updated.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Adds created or moved paths.
    pub fn with_new_or_moved<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.new_or_moved.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Adds removed paths.
    pub fn with_removed<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.removed_or_moved.extend(paths.into_iter().map(Into::into));
        self
    }

    /// All changed paths, consolidated, in report order.
    pub fn changed_paths(&self) -> Vec<String> {
        canopy_protocol::consolidate_ordered(
            self.new_or_moved
                .iter()
                .chain(&self.removed_or_moved)
                .chain(&self.updated),
        )
    }

    /// Returns true if no paths were reported.
    pub fn is_empty(&self) -> bool {
        self.new_or_moved.is_empty() && self.removed_or_moved.is_empty() && self.updated.is_empty()
    }
}
