//! Request/response values, HTTP transport, and status mapping.

pub mod transport;
#[cfg(test)]
pub(crate) mod testing;

pub use transport::{HttpTransport, Transport};

use reqwest::header::AUTHORIZATION;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CellarError;

/// Tenant header understood by the backend's winery middleware.
pub const DEFAULT_TENANT_HEADER: &str = "X-Winery-ID";

/// A backend request that can be dispatched more than once.
///
/// Paths are relative to the configured API base URL.
///
/// # Example
/// ```
/// use cellar::http::ApiRequest;
///
/// let request = ApiRequest::get("/equipment/tanks/").query("page", "2");
/// assert_eq!(request.path, "/equipment/tanks/");
/// assert!(!request.bypass);
/// ```
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    /// Skip header injection and rejection recovery.
    pub bypass: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
            bypass: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, CellarError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    /// Set a header, replacing any existing value (names compare case-insensitively).
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_header(name.into(), value.into());
        self
    }

    /// Mark the request as exempt from the authorization pipeline.
    pub fn bypass(mut self) -> Self {
        self.bypass = true;
        self
    }

    /// Attach an explicit bearer token.
    pub fn bearer(self, token: &str) -> Self {
        self.header(AUTHORIZATION.as_str(), format!("Bearer {token}"))
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The bearer token this request carries, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.header_value(AUTHORIZATION.as_str())
            .and_then(|value| value.strip_prefix("Bearer "))
    }

    pub(crate) fn set_header(&mut self, name: String, value: String) {
        self.remove_header(&name);
        self.headers.push((name, value));
    }

    pub(crate) fn remove_header(&mut self, name: &str) {
        self.headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    }
}

/// A fully-read backend response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, CellarError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Pass successful responses through; map everything else to an error.
    pub fn error_for_status(self) -> Result<Self, CellarError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(status_to_error(self.status, &self.body))
        }
    }

    pub fn message(&self) -> String {
        error_message(&self.body)
    }
}

/// Map a non-success HTTP status to an error.
pub fn status_to_error(status: u16, body: &str) -> CellarError {
    let message = error_message(body);
    match status {
        401 => CellarError::Unauthorized { message },
        _ => CellarError::api(status, message),
    }
}

/// Extract a human-readable message from a REST framework error body.
///
/// Understands `{"detail": ..}`, `{"error": ..}`, and field error maps such as
/// `{"email": ["already registered"]}`; anything else is returned verbatim.
pub fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.trim().to_string();
    };
    for key in ["detail", "error", "message"] {
        if let Some(text) = value.get(key).and_then(|v| v.as_str()) {
            return text.to_string();
        }
    }
    if let Some(fields) = value.as_object() {
        let parts: Vec<String> = fields
            .iter()
            .map(|(field, errors)| {
                let text = match errors {
                    serde_json::Value::Array(items) => items
                        .iter()
                        .map(|item| item.as_str().map(String::from).unwrap_or_else(|| item.to_string()))
                        .collect::<Vec<_>>()
                        .join(" "),
                    serde_json::Value::String(text) => text.clone(),
                    other => other.to_string(),
                };
                format!("{field}: {text}")
            })
            .collect();
        if !parts.is_empty() {
            return parts.join("; ");
        }
    }
    body.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_replaces_case_insensitively() {
        let request = ApiRequest::get("/x")
            .header("authorization", "Bearer a1")
            .bearer("a2");
        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.bearer_token(), Some("a2"));
    }

    #[test]
    fn error_message_reads_detail() {
        let body = r#"{"detail":"Given token not valid for any token type","code":"token_not_valid"}"#;
        assert_eq!(error_message(body), "Given token not valid for any token type");
    }

    #[test]
    fn error_message_flattens_field_errors() {
        let body = r#"{"email":["user with this email already exists."]}"#;
        assert_eq!(
            error_message(body),
            "email: user with this email already exists."
        );
    }

    #[test]
    fn error_message_passes_plain_text_through() {
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }

    #[test]
    fn status_401_maps_to_unauthorized() {
        assert!(matches!(
            status_to_error(401, r#"{"detail":"nope"}"#),
            CellarError::Unauthorized { .. }
        ));
        assert!(matches!(
            status_to_error(503, ""),
            CellarError::Api { status: 503, .. }
        ));
    }
}
