//! Replication targets.

use canopy_store::path;
use serde::{Deserialize, Serialize};

use crate::error::{ReplicationError, ReplicationResult};
use crate::release::Release;

/// Connection settings of a remote receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteConfig {
    /// Base URL of the receiver; operation selectors are appended to it.
    pub target_url: String,
    /// Key of the credentials the HTTP client should use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_id: Option<String>,
    /// Key of the proxy the HTTP client should use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_key: Option<String>,
}

impl RemoteConfig {
    /// Creates a remote configuration without credentials or proxy.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            target_url: target_url.into(),
            credential_id: None,
            proxy_key: None,
        }
    }

    /// Sets the credential id.
    pub fn with_credential_id(mut self, id: impl Into<String>) -> Self {
        self.credential_id = Some(id.into());
        self
    }

    /// Sets the proxy key.
    pub fn with_proxy_key(mut self, key: impl Into<String>) -> Self {
        self.proxy_key = Some(key.into());
        self
    }
}

/// How a target receives content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ReplicationKind {
    /// Copies content to another location of the source store.
    InPlace,
    /// Sends content to a remote receiver.
    Remote(RemoteConfig),
}

/// One configured replication target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicationTarget {
    /// Unique id.
    pub id: String,
    /// Display title.
    #[serde(default)]
    pub title: String,
    /// Subtree of the release that is replicated.
    pub source_path: String,
    /// Where in-place targets put the content. Remote receivers use their own target directory.
    #[serde(default)]
    pub target_path: Option<String>,
    /// Release mark this target replicates, e.g. `public`.
    pub stage: String,
    /// Whether the target is active.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// Delivery kind.
    pub kind: ReplicationKind,
}

fn enabled_default() -> bool {
    true
}

impl ReplicationTarget {
    /// Creates an enabled remote target.
    pub fn remote(
        id: impl Into<String>,
        source_path: impl Into<String>,
        stage: impl Into<String>,
        remote: RemoteConfig,
    ) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            source_path: source_path.into(),
            target_path: None,
            stage: stage.into(),
            enabled: true,
            kind: ReplicationKind::Remote(remote),
        }
    }

    /// Creates an enabled in-place target.
    pub fn in_place(
        id: impl Into<String>,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            title: id.clone(),
            id,
            source_path: source_path.into(),
            target_path: Some(target_path.into()),
            stage: stage.into(),
            enabled: true,
            kind: ReplicationKind::InPlace,
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Enables or disables the target.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Returns the remote settings of remote targets.
    pub fn remote_config(&self) -> Option<&RemoteConfig> {
        match &self.kind {
            ReplicationKind::Remote(remote) => Some(remote),
            ReplicationKind::InPlace => None,
        }
    }

    /// Returns true if the target is enabled and its stage is one of the release's marks.
    pub fn applies_to(&self, release: &Release) -> bool {
        self.enabled && release.has_mark(&self.stage)
    }

    /// Checks the target for consistency.
    pub fn validate(&self) -> ReplicationResult<()> {
        if self.id.trim().is_empty() {
            return Err(ReplicationError::Validation("target without id".to_string()));
        }
        if self.stage.trim().is_empty() {
            return Err(ReplicationError::Validation(format!(
                "target {} has no stage",
                self.id
            )));
        }
        path::validate(&self.source_path)?;
        match &self.kind {
            ReplicationKind::Remote(remote) => {
                if remote.target_url.trim().is_empty() {
                    return Err(ReplicationError::Validation(format!(
                        "remote target {} has no target url",
                        self.id
                    )));
                }
            }
            ReplicationKind::InPlace => {
                let target = self.target_path.as_deref().ok_or_else(|| {
                    ReplicationError::Validation(format!(
                        "in-place target {} has no target path",
                        self.id
                    ))
                })?;
                path::validate(target)?;
                if path::is_same_or_descendant(&self.source_path, target)
                    || path::is_same_or_descendant(target, &self.source_path)
                {
                    return Err(ReplicationError::Validation(format!(
                        "in-place target {}: {} and {} overlap",
                        self.id, self.source_path, target
                    )));
                }
            }
        }
        Ok(())
    }

    /// Restricts changed paths to the replicated subtree.
    ///
    /// Paths above the source path stand for the whole source path; paths
    /// outside of it are dropped. The result is consolidated.
    pub fn scope_paths<S: AsRef<str>>(&self, paths: &[S]) -> Vec<String> {
        let scoped = paths.iter().filter_map(|p| {
            let p = p.as_ref();
            if path::is_same_or_descendant(&self.source_path, p) {
                Some(p.to_string())
            } else if path::is_descendant(p, &self.source_path) {
                Some(self.source_path.clone())
            } else {
                None
            }
        });
        canopy_protocol::consolidate_ordered(scoped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(marks: &[&str]) -> Release {
        Release::new("/content/site", "cn-1").with_marks(marks.iter().copied())
    }

    #[test]
    fn applies_to_matching_stage() {
        let target = ReplicationTarget::remote(
            "pub1",
            "/content/site",
            "Public",
            RemoteConfig::new("http://pub1/bin/receiver"),
        );
        assert!(target.applies_to(&release(&["public"])));
        assert!(!target.applies_to(&release(&["preview"])));
        assert!(!target.clone().with_enabled(false).applies_to(&release(&["public"])));
    }

    #[test]
    fn scope_paths_restricts_to_source() {
        let target = ReplicationTarget::in_place("copy", "/content/site/a", "/content/copy", "public");
        let scoped = target.scope_paths(&["/content/site/a/b", "/content/site/c", "/content/site/a/x"]);
        assert_eq!(scoped, vec!["/content/site/a/b", "/content/site/a/x"]);

        let scoped = target.scope_paths(&["/content/site/a/b", "/content/site"]);
        assert_eq!(scoped, vec!["/content/site/a"]);
    }

    #[test]
    fn validation() {
        let ok = ReplicationTarget::in_place("copy", "/content/site", "/content/copy", "public");
        assert!(ok.validate().is_ok());

        let nested = ReplicationTarget::in_place("copy", "/content/site", "/content/site/copy", "public");
        assert!(matches!(nested.validate(), Err(ReplicationError::Validation(_))));

        let no_url = ReplicationTarget::remote("r", "/content/site", "public", RemoteConfig::new(" "));
        assert!(no_url.validate().is_err());

        let bad_path = ReplicationTarget::remote("r", "content", "public", RemoteConfig::new("http://r"));
        assert!(matches!(bad_path.validate(), Err(ReplicationError::Store(_))));
    }

    #[test]
    fn target_from_json() {
        let json = r#"{
            "id": "pub1",
            "sourcePath": "/content/site",
            "stage": "public",
            "kind": {"type": "remote", "targetUrl": "http://pub1/bin/receiver", "credentialId": "pub1-cred"}
        }"#;
        let target: ReplicationTarget = serde_json::from_str(json).unwrap();
        assert!(target.enabled);
        assert_eq!(
            target.remote_config().unwrap().credential_id.as_deref(),
            Some("pub1-cred")
        );

        let json = r#"{"id":"copy","sourcePath":"/a","targetPath":"/b","stage":"preview","kind":{"type":"inPlace"}}"#;
        let target: ReplicationTarget = serde_json::from_str(json).unwrap();
        assert_eq!(target.kind, ReplicationKind::InPlace);
    }
}
