//! Update session identity and release bookkeeping.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::error::{ProtocolError, ProtocolResult};

/// Prefix of every update id.
pub const UPDATE_ID_PREFIX: &str = "upd-";

const UPDATE_ID_RANDOM_LEN: usize = 12;

static UPDATE_ID_PATTERN: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^upd-[A-Za-z0-9]{12}$"));

fn matches_pattern(s: &str) -> bool {
    UPDATE_ID_PATTERN.as_ref().is_ok_and(|re| re.is_match(s))
}

/// Identifier of an update session: `upd-` followed by 12 alphanumerics.
///
/// Deserialization does not validate; call [`UpdateId::is_well_formed`] or
/// construct through [`UpdateId::parse`] where it matters. The id doubles as
/// a path segment of the staging area, so receivers must parse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpdateId(String);

impl UpdateId {
    /// Generates a fresh random id.
    pub fn generate() -> Self {
        let random: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(UPDATE_ID_RANDOM_LEN)
            .map(char::from)
            .collect();
        Self(format!("{UPDATE_ID_PREFIX}{random}"))
    }

    /// Parses and validates an id.
    pub fn parse(s: &str) -> ProtocolResult<Self> {
        if matches_pattern(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ProtocolError::InvalidUpdateId(s.to_string()))
        }
    }

    /// Returns true if the id matches the update id pattern.
    pub fn is_well_formed(&self) -> bool {
        matches_pattern(&self.0)
    }

    /// The id as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a receiver reports when a session is started.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInfo {
    /// The session id.
    pub update_id: UpdateId,
    /// Change marker of the receiver's release root when the session started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_change_marker: Option<String>,
    /// Session start.
    pub created_at: DateTime<Utc>,
}

/// A receiver's view of a release root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseInfo {
    /// The change marker recorded by the last commit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub change_marker: Option<String>,
    /// When the last commit happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_replication: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_well_formed() {
        let a = UpdateId::generate();
        let b = UpdateId::generate();
        assert!(a.is_well_formed());
        assert_eq!(a.as_str().len(), UPDATE_ID_PREFIX.len() + UPDATE_ID_RANDOM_LEN);
        assert_ne!(a, b);
        assert_eq!(UpdateId::parse(a.as_str()).unwrap(), a);
    }

    #[test]
    fn parse_rejects_bad_ids() {
        for bad in ["", "upd-", "upd-abc", "upd-abcdefghijk!", "xyz-abcdefghijkl", "upd-abcdefghijklm", "upd-../../etc/pa"] {
            assert!(UpdateId::parse(bad).is_err(), "{bad}");
        }
        assert!(UpdateId::parse("upd-AbC123xyz789").is_ok());
    }

    #[test]
    fn update_info_json() {
        let info = UpdateInfo {
            update_id: UpdateId::parse("upd-abcdefghijkl").unwrap(),
            original_change_marker: None,
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["updateId"], "upd-abcdefghijkl");
        assert!(json.get("originalChangeMarker").is_none());
        let back: UpdateInfo = serde_json::from_value(json).unwrap();
        assert_eq!(back, info);
    }
}
