//! Transport-neutral HTTP request and response values.

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};

/// HTTP method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET.
    Get,
    /// POST.
    Post,
    /// PUT.
    Put,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
        })
    }
}

/// A request to a receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: Method,
    /// Full operation URL.
    pub url: String,
    /// Form or query parameters; names may repeat.
    pub form: Vec<(String, String)>,
    /// Request body.
    pub body: Option<Vec<u8>>,
}

impl HttpRequest {
    /// Creates a request without parameters or body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            form: Vec::new(),
            body: None,
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    /// Adds a parameter once per value.
    #[must_use]
    pub fn with_params<I, S>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.form
            .extend(values.into_iter().map(|v| (name.to_string(), v.into())));
        self
    }

    /// Sets the body.
    #[must_use]
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    /// First value of a parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.form
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// First value of a required parameter.
    pub fn required_param(&self, name: &str) -> ProtocolResult<&str> {
        self.param(name)
            .ok_or_else(|| ProtocolError::MissingParameter(name.to_string()))
    }

    /// All values of a parameter, in order.
    pub fn params(&self, name: &str) -> Vec<&str> {
        self.form
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// Status line of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Status code.
    pub code: u16,
    /// Reason phrase.
    pub reason: String,
}

impl StatusLine {
    /// Creates a status line with the standard reason phrase.
    pub fn from_code(code: u16) -> Self {
        let reason = match code {
            200 => "OK",
            400 => "Bad Request",
            404 => "Not Found",
            409 => "Conflict",
            500 => "Internal Server Error",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            _ => "",
        };
        Self {
            code,
            reason: reason.to_string(),
        }
    }

    /// Returns true for 2xx codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP/1.1 {} {}", self.code, self.reason)
    }
}

/// A receiver's answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status line.
    pub status_line: StatusLine,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response.
    pub fn new(code: u16, body: Vec<u8>) -> Self {
        Self {
            status_line: StatusLine::from_code(code),
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_params() {
        let request = HttpRequest::new(Method::Post, "http://h/r.commitupdate.json")
            .with_param("updateId", "upd-abcdefghijkl")
            .with_params("deletedpath", ["/a", "/b"]);
        assert_eq!(request.param("updateId"), Some("upd-abcdefghijkl"));
        assert_eq!(request.params("deletedpath"), vec!["/a", "/b"]);
        assert!(request.required_param("releaseRoot").is_err());
    }

    #[test]
    fn status_line() {
        let line = StatusLine::from_code(409);
        assert!(!line.is_success());
        assert_eq!(line.to_string(), "HTTP/1.1 409 Conflict");
        assert!(StatusLine::from_code(204).is_success());
    }
}
