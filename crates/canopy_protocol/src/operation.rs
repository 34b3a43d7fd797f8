//! Protocol operations and their URLs.
//!
//! An operation URL is `<targetUrl>.<operation>.<json|zip><suffix>`, where
//! the suffix is a content path (possibly empty).

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{ProtocolError, ProtocolResult};
use crate::http::Method;

/// The operations a receiver offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Opens an update session.
    StartUpdate,
    /// Lists versionables below a path.
    ContentState,
    /// Uploads one archive into a session.
    PathUpload,
    /// Commits a session.
    CommitUpdate,
    /// Discards a session.
    AbortUpdate,
    /// Reports the release root's change marker.
    ReleaseInfo,
    /// Compares parent attributes and child orderings.
    CompareParents,
}

/// Response/payload extension of an operation URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Extension {
    /// JSON request and response.
    Json,
    /// Archive upload.
    Zip,
}

impl Extension {
    /// The extension as written in URLs.
    pub fn as_str(self) -> &'static str {
        match self {
            Extension::Json => "json",
            Extension::Zip => "zip",
        }
    }
}

impl Operation {
    /// All operations.
    pub const ALL: [Operation; 7] = [
        Operation::StartUpdate,
        Operation::ContentState,
        Operation::PathUpload,
        Operation::CommitUpdate,
        Operation::AbortUpdate,
        Operation::ReleaseInfo,
        Operation::CompareParents,
    ];

    /// The selector name used in URLs.
    pub fn name(self) -> &'static str {
        match self {
            Operation::StartUpdate => "startupdate",
            Operation::ContentState => "contentstate",
            Operation::PathUpload => "pathupload",
            Operation::CommitUpdate => "commitupdate",
            Operation::AbortUpdate => "abortupdate",
            Operation::ReleaseInfo => "releaseinfo",
            Operation::CompareParents => "compareparents",
        }
    }

    /// Looks up an operation by selector name.
    pub fn from_name(name: &str) -> ProtocolResult<Self> {
        Self::ALL
            .into_iter()
            .find(|op| op.name() == name)
            .ok_or_else(|| ProtocolError::UnknownOperation(name.to_string()))
    }

    /// HTTP method the publisher uses.
    pub fn method(self) -> Method {
        match self {
            Operation::PathUpload | Operation::CompareParents => Method::Put,
            _ => Method::Post,
        }
    }

    /// Extension the publisher uses.
    pub fn extension(self) -> Extension {
        match self {
            Operation::PathUpload => Extension::Zip,
            _ => Extension::Json,
        }
    }

    /// Builds the URL of this operation.
    pub fn url(self, target_url: &str, suffix: &str) -> String {
        format!(
            "{}.{}.{}{}",
            target_url.trim_end_matches('/'),
            self.name(),
            self.extension().as_str(),
            suffix
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed operation URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationUrl {
    /// Everything before the operation selector.
    pub base: String,
    /// The operation.
    pub operation: Operation,
    /// The extension.
    pub extension: Extension,
    /// Content path suffix, empty if absent.
    pub suffix: String,
}

static OPERATION_URL: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"^(?P<base>.+?)\.(?P<op>[a-z]+)\.(?P<ext>json|zip)(?P<suffix>/.*)?$")
});

impl OperationUrl {
    /// Splits a URL into its parts.
    pub fn parse(url: &str) -> ProtocolResult<Self> {
        let malformed = || ProtocolError::MalformedUrl(url.to_string());
        let re = OPERATION_URL.as_ref().map_err(|_| malformed())?;
        let caps = re.captures(url).ok_or_else(malformed)?;
        let extension = match &caps["ext"] {
            "zip" => Extension::Zip,
            _ => Extension::Json,
        };
        Ok(Self {
            base: caps["base"].to_string(),
            operation: Operation::from_name(&caps["op"])?,
            extension,
            suffix: caps
                .name("suffix")
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_urls() {
        let url = Operation::StartUpdate.url("http://pub.example/bin/receiver", "/content/site");
        assert_eq!(url, "http://pub.example/bin/receiver.startupdate.json/content/site");
        assert_eq!(
            Operation::PathUpload.url("http://h/r/", "/a"),
            "http://h/r.pathupload.zip/a"
        );
        assert_eq!(Operation::AbortUpdate.url("http://h/r", ""), "http://h/r.abortupdate.json");
    }

    #[test]
    fn parses_urls() {
        for op in Operation::ALL {
            let url = op.url("http://a.b.example:8080/bin/recv", "/content/x.y");
            let parsed = OperationUrl::parse(&url).unwrap();
            assert_eq!(parsed.operation, op);
            assert_eq!(parsed.base, "http://a.b.example:8080/bin/recv");
            assert_eq!(parsed.suffix, "/content/x.y");
            assert_eq!(parsed.extension, op.extension());
        }
        let parsed = OperationUrl::parse("http://h/r.releaseinfo.json").unwrap();
        assert_eq!(parsed.suffix, "");
    }

    #[test]
    fn rejects_unknown() {
        assert!(matches!(
            OperationUrl::parse("http://h/r.dance.json/a"),
            Err(ProtocolError::UnknownOperation(_))
        ));
        assert!(matches!(
            OperationUrl::parse("http://h/r"),
            Err(ProtocolError::MalformedUrl(_))
        ));
    }
}
