//! Outbound request descriptors.
//!
//! An [`ApiRequest`] is what callers build; a [`PreparedRequest`] is what the
//! transport puts on the wire. The credential-exempt marker only exists on
//! the descriptor, so it can never leak into a transmitted request.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;

use super::ApiError;

#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the configured base URL, e.g. `api/profile`
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    credential_exempt: bool,
}

/// Wire form of a request, produced by the authorizer
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            credential_exempt: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn post<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self, ApiError> {
        Self::new(Method::POST, path).with_json(body)
    }

    pub fn put<B: Serialize + ?Sized>(path: impl Into<String>, body: &B) -> Result<Self, ApiError> {
        Self::new(Method::PUT, path).with_json(body)
    }

    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to encode body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Mark the request as not taking part in bearer-token handling
    pub fn credential_exempt(mut self) -> Self {
        self.credential_exempt = true;
        self
    }

    pub fn is_credential_exempt(&self) -> bool {
        self.credential_exempt
    }

    /// Copy of this request carrying an explicit bearer credential
    pub fn with_bearer(&self, token: &str) -> Result<Self, ApiError> {
        let value = bearer_value(token)?;
        Ok(self.clone().with_header(AUTHORIZATION, value))
    }

    /// Drop the descriptor-only fields and keep what goes on the wire
    pub fn prepare(self) -> PreparedRequest {
        PreparedRequest {
            method: self.method,
            path: self.path,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl PreparedRequest {
    /// Bearer token carried by the request, if any
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

pub(crate) fn bearer_value(token: &str) -> Result<HeaderValue, ApiError> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ApiError::InvalidRequest("Access token is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(value)
}
