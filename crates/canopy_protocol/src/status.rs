//! Status responses exchanged between publisher and receiver.
//!
//! Every receiver answer is a JSON object with the status fields at the top
//! level and the operation's result under `data`:
//!
//! ```json
//! {"status":200,"success":true,"warning":false,"messages":[],"data":{...}}
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ProtocolResult;
use crate::fingerprint::NodeFingerprint;
use crate::update::{ReleaseInfo, UpdateInfo};
use crate::versionable::{ChildrenOrderInfo, VersionableInfo};

/// Severity of a status message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageLevel {
    /// Diagnostic detail.
    Debug,
    /// Progress information.
    Info,
    /// Something unexpected that did not stop the operation.
    Warn,
    /// The operation failed.
    Error,
}

/// A human readable message attached to a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Severity.
    pub level: MessageLevel,
    /// Message text.
    pub text: String,
}

impl Message {
    /// Creates a message.
    pub fn new(level: MessageLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}

/// What a sender should do after a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryAdvice {
    /// The failure is transient; restarting the session will likely succeed.
    RetryImmediately,
    /// Retrying without intervention will fail again.
    NoAutomaticRetry,
}

/// Status fields common to all responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// HTTP-like status code.
    pub status: u16,
    /// Whether the operation succeeded.
    pub success: bool,
    /// Whether warnings were emitted.
    #[serde(default)]
    pub warning: bool,
    /// Optional title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Messages collected while processing.
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Advice for failed calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_advice: Option<RetryAdvice>,
}

impl Status {
    /// A successful status.
    pub fn ok() -> Self {
        Self {
            status: 200,
            success: true,
            warning: false,
            title: None,
            messages: Vec::new(),
            retry_advice: None,
        }
    }

    /// A failed status with one error message.
    pub fn error(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            success: false,
            warning: false,
            title: None,
            messages: vec![Message::new(MessageLevel::Error, text)],
            retry_advice: None,
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the retry advice.
    #[must_use]
    pub fn with_retry_advice(mut self, advice: Option<RetryAdvice>) -> Self {
        self.retry_advice = advice;
        self
    }

    /// Adds a message; warnings set the warning flag.
    #[must_use]
    pub fn with_message(mut self, level: MessageLevel, text: impl Into<String>) -> Self {
        if level == MessageLevel::Warn {
            self.warning = true;
        }
        self.messages.push(Message::new(level, text));
        self
    }

    /// Texts of all error messages, joined.
    pub fn error_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.level == MessageLevel::Error)
            .map(|m| m.text.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Operation data carried in a [`Response`].
pub trait Payload: Serialize + DeserializeOwned {
    /// Whether a successful response must carry this payload.
    const REQUIRED: bool = true;

    /// Operation-specific validity of a decoded payload.
    fn is_valid(&self) -> bool {
        true
    }
}

/// A status with optional operation data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    /// The status fields, inlined.
    #[serde(flatten)]
    pub status: Status,
    /// Operation data.
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Payload> Response<T> {
    /// A successful response with data.
    pub fn ok(data: T) -> Self {
        Self {
            status: Status::ok(),
            data: Some(data),
        }
    }

    /// A response without data.
    pub fn from_status(status: Status) -> Self {
        Self { status, data: None }
    }

    /// Structural validity: data present where required and well formed.
    pub fn is_valid(&self) -> bool {
        match &self.data {
            Some(data) => data.is_valid(),
            None => !T::REQUIRED || !self.status.success,
        }
    }

    /// Valid and successful.
    pub fn is_success(&self) -> bool {
        self.status.success && self.is_valid()
    }

    /// Encodes as JSON.
    pub fn to_json(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON.
    pub fn from_json(bytes: &[u8]) -> ProtocolResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Empty payload of acknowledgement-only operations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}

impl Payload for Ack {
    const REQUIRED: bool = false;
}

impl Payload for UpdateInfo {
    fn is_valid(&self) -> bool {
        self.update_id.is_well_formed()
    }
}

impl Payload for ReleaseInfo {
    const REQUIRED: bool = false;
}

/// Result of `contentstate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentState {
    /// Versionables found below the queried paths.
    pub versionables: Vec<VersionableInfo>,
}

impl Payload for ContentState {}

/// Request body of `compareparents`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareParentsRequest {
    /// Sender fingerprints of parent nodes.
    pub fingerprints: Vec<NodeFingerprint>,
    /// Sender child orderings.
    pub orderings: Vec<ChildrenOrderInfo>,
}

/// Result of `compareparents`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentComparison {
    /// Paths whose attributes differ.
    pub different_attributes: Vec<String>,
    /// Paths whose child ordering differs.
    pub different_orderings: Vec<String>,
}

impl ParentComparison {
    /// Returns true if nothing differs.
    pub fn is_empty(&self) -> bool {
        self.different_attributes.is_empty() && self.different_orderings.is_empty()
    }
}

impl Payload for ParentComparison {}

/// Request body of `commitupdate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    /// Child orderings to apply after the content is in place.
    pub orderings: Vec<ChildrenOrderInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::update::UpdateId;
    use chrono::Utc;

    #[test]
    fn status_is_flattened() {
        let response = Response::ok(ContentState {
            versionables: vec![VersionableInfo::new("/a", "1")],
        });
        let json: serde_json::Value = serde_json::from_slice(&response.to_json().unwrap()).unwrap();
        assert_eq!(json["status"], 200);
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["versionables"][0]["path"], "/a");
    }

    #[test]
    fn validity_requires_data() {
        let missing: Response<ContentState> = Response::from_status(Status::ok());
        assert!(!missing.is_valid());

        let ack: Response<Ack> = Response::from_status(Status::ok());
        assert!(ack.is_success());

        let failed: Response<ContentState> =
            Response::from_status(Status::error(409, "conflict"));
        assert!(failed.is_valid());
        assert!(!failed.is_success());
    }

    #[test]
    fn start_update_requires_update_id() {
        let json = br#"{"status":200,"success":true,"data":{"updateId":"","createdAt":"2024-01-01T00:00:00Z"}}"#;
        let response = Response::<UpdateInfo>::from_json(json).unwrap();
        assert!(!response.is_valid());

        let good = Response::ok(UpdateInfo {
            update_id: UpdateId::generate(),
            original_change_marker: Some("c1".into()),
            created_at: Utc::now(),
        });
        let decoded = Response::<UpdateInfo>::from_json(&good.to_json().unwrap()).unwrap();
        assert!(decoded.is_success());
    }

    #[test]
    fn error_status_carries_advice() {
        let status = Status::error(409, "release changed")
            .with_retry_advice(Some(RetryAdvice::RetryImmediately))
            .with_message(MessageLevel::Warn, "careful");
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["retryAdvice"], "retryImmediately");
        assert_eq!(json["warning"], true);
        assert_eq!(status.error_text(), "release changed");
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Response::<Ack>::from_json(b"<html>").is_err());
        assert!(Response::<Ack>::from_json(b"{}").is_err());
    }
}
