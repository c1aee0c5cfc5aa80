//! Request and response payloads

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Errors raised when a request is rejected at submission time
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Invalid operation kind: '{0}' (expected 'read' or 'write')")]
    InvalidKind(String),

    #[error("Request URL must not be empty")]
    EmptyUrl,

    #[error("Invalid HTTP method: '{0}'")]
    InvalidMethod(String),
}

/// Whether an operation may share the backend with other operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Safe to run concurrently with other reads
    Read,
    /// Requires exclusive access to the backend
    Write,
}

impl OperationKind {
    /// Single-letter label used in queue renderings
    pub fn label(&self) -> char {
        match self {
            OperationKind::Read => 'R',
            OperationKind::Write => 'W',
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Read => write!(f, "read"),
            OperationKind::Write => write!(f, "write"),
        }
    }
}

impl FromStr for OperationKind {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "read" => Ok(OperationKind::Read),
            "write" => Ok(OperationKind::Write),
            _ => Err(RequestError::InvalidKind(s.to_string())),
        }
    }
}

/// A request submitted to the queue
///
/// The queue never looks inside the payload beyond `url` (for
/// `ignore_previous_by_url` matching and diagnostics) and the method/kind pair
/// used to decide whether this is a read or a write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// HTTP method; `None` means GET
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    /// Target URL, also the identity used by `ignore_previous_by_url`
    pub url: String,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Explicit kind, overriding the one derived from the method
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<OperationKind>,

    /// Drop the listeners of earlier requests to the same URL and cancel them
    #[serde(default, rename = "ignore-previous-by-url")]
    pub ignore_previous_by_url: bool,
}

impl Request {
    /// Create a request with an explicit method
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: Some(method.into()),
            url: url.into(),
            headers: BTreeMap::new(),
            body: None,
            kind: None,
            ignore_previous_by_url: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new("GET", url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new("POST", url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new("PUT", url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new("DELETE", url)
    }

    /// Override the kind derived from the method
    pub fn with_kind(mut self, kind: OperationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Suppress earlier requests to the same URL when this one is submitted
    pub fn ignore_previous_by_url(mut self) -> Self {
        self.ignore_previous_by_url = true;
        self
    }

    /// The method to send, defaulting to GET
    pub fn method_or_default(&self) -> Cow<'_, str> {
        match &self.method {
            Some(m) if !m.trim().is_empty() => Cow::Owned(m.trim().to_uppercase()),
            _ => Cow::Borrowed("GET"),
        }
    }

    /// Validate the request and resolve its operation kind
    ///
    /// An explicit `kind` wins; otherwise a missing method or GET is a read and
    /// everything else is a write.
    pub fn resolve_kind(&self) -> Result<OperationKind, RequestError> {
        debug!(url = %self.url, method = ?self.method, kind = ?self.kind, "Request::resolve_kind: called");
        if self.url.trim().is_empty() {
            return Err(RequestError::EmptyUrl);
        }

        if let Some(method) = &self.method {
            let method = method.trim();
            if !method.is_empty() && !is_method_token(method) {
                debug!(%method, "Request::resolve_kind: method is not a valid token");
                return Err(RequestError::InvalidMethod(method.to_string()));
            }
        }

        if let Some(kind) = self.kind {
            return Ok(kind);
        }

        if self.method_or_default() == "GET" {
            Ok(OperationKind::Read)
        } else {
            Ok(OperationKind::Write)
        }
    }
}

/// RFC 9110 token characters
fn is_method_token(method: &str) -> bool {
    method
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c))
}

/// A completed response, passed to the completion listener unchanged
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Status code; 0 means the transport never reached the backend
    pub status: u16,

    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Status 0 is how transports report that no connection was made
    pub fn is_no_connection(&self) -> bool {
        self.status == 0
    }

    /// The backend answered, but with an error status
    pub fn is_application_error(&self) -> bool {
        self.status >= 400
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_derived_from_method() {
        assert_eq!(Request::put("/a").resolve_kind(), Ok(OperationKind::Write));
        assert_eq!(Request::get("/a").resolve_kind(), Ok(OperationKind::Read));
        assert_eq!(Request::post("/a").resolve_kind(), Ok(OperationKind::Write));
        assert_eq!(Request::new("get", "/a").resolve_kind(), Ok(OperationKind::Read));
        assert_eq!(Request::delete("/a").resolve_kind(), Ok(OperationKind::Write));
    }

    #[test]
    fn test_missing_method_is_read() {
        let request: Request = serde_json::from_str(r#"{"url": "/users"}"#).unwrap();
        assert_eq!(request.method_or_default(), "GET");
        assert_eq!(request.resolve_kind(), Ok(OperationKind::Read));
    }

    #[test]
    fn test_kind_override_wins() {
        let request = Request::post("/search").with_kind(OperationKind::Read);
        assert_eq!(request.resolve_kind(), Ok(OperationKind::Read));

        let request = Request::get("/touch").with_kind(OperationKind::Write);
        assert_eq!(request.resolve_kind(), Ok(OperationKind::Write));
    }

    #[test]
    fn test_rejects_misuse() {
        assert_eq!(Request::get("  ").resolve_kind(), Err(RequestError::EmptyUrl));
        assert_eq!(
            Request::new("PO ST", "/a").resolve_kind(),
            Err(RequestError::InvalidMethod("PO ST".to_string()))
        );
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("read".parse::<OperationKind>(), Ok(OperationKind::Read));
        assert_eq!(" WRITE ".parse::<OperationKind>(), Ok(OperationKind::Write));
        assert_eq!(
            "delete".parse::<OperationKind>(),
            Err(RequestError::InvalidKind("delete".to_string()))
        );
    }

    #[test]
    fn test_invalid_kind_rejected_on_deserialize() {
        let result: Result<Request, _> = serde_yaml::from_str("url: /a\nkind: sideways\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_request_options() {
        let yaml = r#"
url: /users/1
method: put
kind: write
ignore-previous-by-url: true
body:
  name: alice
"#;
        let request: Request = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(request.method_or_default(), "PUT");
        assert!(request.ignore_previous_by_url);
        assert_eq!(request.body, Some(serde_json::json!({"name": "alice"})));
    }

    #[test]
    fn test_response_helpers() {
        let response = Response::new(404).with_body(r#"{"error":"missing"}"#);
        assert!(response.is_application_error());
        assert!(!response.is_no_connection());
        assert_eq!(response.text(), r#"{"error":"missing"}"#);

        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["error"], "missing");

        assert!(Response::new(0).is_no_connection());
        assert!(!Response::new(204).is_application_error());
    }
}
