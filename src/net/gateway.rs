//! Authenticated request gateway for the invoice backend.
//!
//! Every JSON call goes through [`Gateway::request`], which attaches the
//! bearer token, treats 401 as a forced logout, and folds every other failure
//! into one [`ApiError`]. Each call is attempted exactly once: no retries,
//! no timeouts, no cancellation.
//!
//! Response interpretation lives in pure functions (`parse_success`,
//! `error_from_body`) so it can be tested without a server.

#[cfg(test)]
#[path = "gateway_test.rs"]
mod tests;

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, FieldError};
use crate::session::SessionStore;

const JSON_CONTENT_TYPE: &str = "application/json";

/// Per-call knobs for [`Gateway::request`].
#[derive(Clone, Debug, Default)]
pub struct RequestOptions {
    /// JSON body, serialized verbatim.
    pub body: Option<Value>,
    /// Extra headers merged over the JSON default.
    pub headers: HeaderMap,
    /// Use this token instead of the one in the session store.
    pub bearer: Option<String>,
}

impl RequestOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// HTTP gateway bound to one backend and one session store.
#[derive(Clone, Debug)]
pub struct Gateway {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl Gateway {
    pub fn new(base_url: impl Into<String>, session: Arc<SessionStore>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, session)
    }

    /// Use a preconfigured `reqwest` client (proxies, custom TLS roots).
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>, session: Arc<SessionStore>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Self { http, base_url, session }
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }

    /// Perform one JSON call against `path` (relative to the base URL).
    ///
    /// # Errors
    ///
    /// - [`ApiError::Unauthenticated`] on 401, after invalidating the session.
    /// - [`ApiError::Validation`] / [`ApiError::Http`] on any other non-2xx.
    /// - [`ApiError::Network`] if no response was received.
    pub async fn request(&self, method: Method, path: &str, options: RequestOptions) -> Result<Value, ApiError> {
        self.send(method, path, options)
            .await
            .map(|(_, value)| value)
    }

    /// [`Gateway::request`] followed by typed deserialization.
    ///
    /// # Errors
    ///
    /// Same as [`Gateway::request`]; a body of the wrong shape is an
    /// [`ApiError::Http`] carrying the response status.
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let (status, value) = self.send(method, path, options).await?;
        decode(status, value)
    }

    async fn send(&self, method: Method, path: &str, options: RequestOptions) -> Result<(StatusCode, Value), ApiError> {
        let RequestOptions { body, headers: extra, bearer } = options;
        let token = bearer
            .or_else(|| self.session.token())
            .filter(|t| !t.is_empty());
        let headers = merge_headers(extra, token.as_deref());

        let mut builder = self
            .http
            .request(method.clone(), self.url(path))
            .headers(headers);
        if let Some(body) = body {
            builder = builder.body(body.to_string());
        }

        let response = builder.send().await.map_err(|e| {
            tracing::warn!(%method, path, error = %e, "backend unreachable");
            ApiError::Network(e.to_string())
        })?;
        let status = response.status();
        tracing::debug!(%method, path, status = status.as_u16(), "backend response");

        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate(token.as_deref());
            return Err(ApiError::Unauthenticated);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if status.is_success() {
            parse_success(status, &bytes).map(|value| (status, value))
        } else {
            Err(error_from_body(status, &bytes))
        }
    }

    /// Form-encoded `POST` without credentials (the OAuth2 password grant).
    ///
    /// A 401 here means bad credentials, not an expired session, so the
    /// session store is left untouched.
    ///
    /// # Errors
    ///
    /// [`ApiError::Http`] / [`ApiError::Validation`] on non-2xx,
    /// [`ApiError::Network`] if no response was received.
    pub async fn post_form<F, T>(&self, path: &str, form: &F) -> Result<T, ApiError>
    where
        F: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(path, error = %e, "backend unreachable");
                ApiError::Network(e.to_string())
            })?;
        let status = response.status();
        tracing::debug!(method = "POST", path, status = status.as_u16(), "backend response");

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        if !status.is_success() {
            return Err(error_from_body(status, &bytes));
        }
        decode(status, parse_success(status, &bytes)?)
    }
}

// =============================================================================
// HEADERS
// =============================================================================

/// JSON content type, then caller headers, then `Authorization` (token wins).
fn merge_headers(extra: HeaderMap, token: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_CONTENT_TYPE));
    for (name, value) in &extra {
        headers.insert(name.clone(), value.clone());
    }
    if let Some(token) = token {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("stored token is not a valid header value; sending unauthenticated"),
        }
    }
    headers
}

// =============================================================================
// RESPONSE PARSING
// =============================================================================

/// Interpret a 2xx body. Empty bodies (e.g. `204 No Content`) become `null`.
pub(crate) fn parse_success(status: StatusCode, body: &[u8]) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body).map_err(|e| ApiError::Http {
        status: status.as_u16(),
        message: format!("invalid response body: {e}"),
        detail: None,
    })
}

fn decode<T: DeserializeOwned>(status: StatusCode, value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Http {
        status: status.as_u16(),
        message: format!("unexpected response shape: {e}"),
        detail: None,
    })
}

fn status_fallback(status: StatusCode) -> String {
    format!("HTTP error! status: {}", status.as_u16())
}

/// Build the error for a non-2xx, non-401 response.
///
/// `{"detail": "..."}` becomes an [`ApiError::Http`] carrying that message;
/// `{"detail": [{loc, msg}, ...]}` becomes an [`ApiError::Validation`]. A body
/// that is not JSON falls back to the status text.
pub(crate) fn error_from_body(status: StatusCode, body: &[u8]) -> ApiError {
    let code = status.as_u16();
    let Ok(parsed) = serde_json::from_slice::<Value>(body) else {
        let message = status
            .canonical_reason()
            .map_or_else(|| status_fallback(status), str::to_owned);
        return ApiError::Http { status: code, message, detail: None };
    };

    let detail = match parsed {
        Value::Object(mut map) => map.remove("detail").unwrap_or(Value::Null),
        _ => Value::Null,
    };

    match detail {
        Value::Null => ApiError::Http { status: code, message: status_fallback(status), detail: None },
        Value::String(ref message) if message.is_empty() => {
            ApiError::Http { status: code, message: status_fallback(status), detail: Some(detail) }
        }
        Value::String(ref message) => ApiError::Http { status: code, message: message.clone(), detail: Some(detail) },
        Value::Array(_) => match serde_json::from_value::<Vec<FieldError>>(detail.clone()) {
            Ok(errors) if !errors.is_empty() => ApiError::Validation { status: code, errors },
            _ => ApiError::Http { status: code, message: detail.to_string(), detail: Some(detail) },
        },
        other => ApiError::Http { status: code, message: other.to_string(), detail: Some(other) },
    }
}
