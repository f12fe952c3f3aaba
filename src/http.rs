use std::time::Duration;

use reqwest::{header::HeaderMap, StatusCode};

use crate::{
    errors::{ApiError, Error},
    REQUEST_ID_HEADER,
};

/// Optional per-call settings for API requests.
#[derive(Clone, Default)]
pub struct RequestOptions {
    pub request_id: Option<String>,
    pub headers: HeaderList,
    pub timeout: Option<Duration>,
    /// When false, a 401 response is surfaced as-is instead of triggering the
    /// single-flight token refresh. Defaults to true.
    pub skip_auth_refresh: bool,
}

impl RequestOptions {
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .push(HeaderEntry::new(key.into(), value.into()));
        self
    }

    /// Override the overall request timeout for this call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Opt this call out of the 401 refresh-and-retry protocol.
    pub fn without_auth_refresh(mut self) -> Self {
        self.skip_auth_refresh = true;
        self
    }
}

/// Structured header list with validation.
#[derive(Clone, Debug, Default)]
pub struct HeaderList(Vec<HeaderEntry>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a header entry.
    ///
    /// # Panics
    /// Panics if the header key or value is empty or contains only
    /// whitespace. This is a fail-fast behavior to catch configuration
    /// errors early.
    pub fn push(&mut self, entry: HeaderEntry) {
        assert!(
            entry.is_valid(),
            "Invalid header: key and value must be non-empty (got key={:?}, value={:?})",
            entry.key,
            entry.value
        );
        self.0.push(entry);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.0.iter()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: String, value: String) -> Self {
        Self { key, value }
    }

    pub fn is_valid(&self) -> bool {
        !(self.key.trim().is_empty() || self.value.trim().is_empty())
    }
}

pub(crate) fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(REQUEST_ID_HEADER) {
        if let Ok(s) = value.to_str() {
            if !s.is_empty() {
                return Some(s.to_string());
            }
        }
    }
    None
}

/// Convert a non-2xx response into an [`ApiError`].
///
/// The backend is a FastAPI service, so error bodies arrive as a `detail`
/// envelope: either `{"detail": "message"}` or
/// `{"detail": {"error": "...", "message": "..."}}`. Bodies that match
/// neither shape fall back to `HTTP <status>: <reason>`.
pub(crate) fn parse_api_error_parts(status: StatusCode, headers: &HeaderMap, body: String) -> Error {
    let request_id = request_id_from_headers(headers);
    let status_code = status.as_u16();
    let status_text = status.canonical_reason().unwrap_or("request failed");
    let fallback = format!("HTTP {status_code}: {status_text}");

    if body.is_empty() {
        return ApiError {
            status: status_code,
            message: fallback,
            code: None,
            request_id,
            raw_body: None,
        }
        .into();
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
        if let Some(detail) = value.get("detail") {
            if let Some(message) = detail.as_str() {
                return ApiError {
                    status: status_code,
                    message: message.to_string(),
                    code: None,
                    request_id,
                    raw_body: Some(body.clone()),
                }
                .into();
            }
            if let Some(obj) = detail.as_object() {
                let message = obj
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| fallback.clone());
                let code = obj
                    .get("error")
                    .or_else(|| obj.get("code"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string());
                return ApiError {
                    status: status_code,
                    message,
                    code,
                    request_id,
                    raw_body: Some(body.clone()),
                }
                .into();
            }
        }

        if let Some(message) = value.get("message").and_then(|v| v.as_str()) {
            return ApiError {
                status: status_code,
                message: message.to_string(),
                code: value
                    .get("code")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string()),
                request_id,
                raw_body: Some(body.clone()),
            }
            .into();
        }
    }

    ApiError {
        status: status_code,
        message: fallback,
        code: None,
        request_id,
        raw_body: Some(body),
    }
    .into()
}
