//! Receiver configuration.

use serde::{Deserialize, Serialize};

/// Default location of staging areas.
pub const DEFAULT_TMP_DIR: &str = "/tmp/canopy/receiver";

/// Configuration for the publication receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReceiverConfig {
    /// Whether the receiver accepts requests at all.
    pub enabled: bool,
    /// Store path below which each session gets its staging area.
    pub tmp_dir: String,
    /// Store path prepended to every content path before it touches live content.
    pub target_dir: String,
    /// Staging areas untouched for this many days are removed; 0 disables cleanup.
    pub cleanup_days: u32,
}

impl ReceiverConfig {
    /// Creates an enabled configuration with default locations.
    pub fn new() -> Self {
        Self {
            enabled: true,
            tmp_dir: DEFAULT_TMP_DIR.to_string(),
            target_dir: "/".to_string(),
            cleanup_days: 1,
        }
    }

    /// Enables or disables the receiver.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Sets the staging directory.
    pub fn with_tmp_dir(mut self, tmp_dir: impl Into<String>) -> Self {
        self.tmp_dir = tmp_dir.into();
        self
    }

    /// Sets the target directory.
    pub fn with_target_dir(mut self, target_dir: impl Into<String>) -> Self {
        self.target_dir = target_dir.into();
        self
    }

    /// Sets the staging expiry in days.
    pub fn with_cleanup_days(mut self, days: u32) -> Self {
        self.cleanup_days = days;
        self
    }
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self::new()
    }
}
