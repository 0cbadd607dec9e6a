// ABOUTME: Tagged error type for OAuth2 grants, device polling and bearer token validation
// ABOUTME: Kinds map one-to-one onto the RFC 6749 and RFC 8628 error vocabulary
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`GrantError`]
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantErrorKind {
    /// Missing or malformed parameter
    InvalidRequest,
    /// Unknown client or client mismatch
    InvalidClient,
    /// Code or token unknown, consumed, revoked or mismatched
    InvalidGrant,
    /// Requested scope outside the supported set
    InvalidScope,
    /// `grant_type` not handled by this server
    UnsupportedGrantType,
    /// Device authorization not decided yet; retry after the interval
    AuthorizationPending,
    /// Device client polled too fast; back off to `retry_after`
    SlowDown,
    /// Device authorization lifetime elapsed
    ExpiredToken,
    /// Resource owner denied the device authorization
    AccessDenied,
    /// Bearer token rejected by the resource server
    InvalidToken,
    /// Storage or signing failure
    ServerError,
}

impl GrantErrorKind {
    /// Wire representation used in `error` fields
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::AuthorizationPending => "authorization_pending",
            Self::SlowDown => "slow_down",
            Self::ExpiredToken => "expired_token",
            Self::AccessDenied => "access_denied",
            Self::InvalidToken => "invalid_token",
            Self::ServerError => "server_error",
        }
    }

    /// HTTP status for token-endpoint style responses
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::InvalidToken => 401,
            Self::ServerError => 500,
            _ => 400,
        }
    }
}

impl fmt::Display for GrantErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every `OAuth2` operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct GrantError {
    /// What went wrong, in `OAuth2` vocabulary
    pub kind: GrantErrorKind,
    /// Description safe to return as `error_description`
    pub message: String,
    /// Seconds the client must wait before retrying (`slow_down`)
    pub retry_after: Option<u64>,
}

impl GrantError {
    /// Create an error of the given kind
    #[must_use]
    pub fn new(kind: GrantErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    /// Missing or malformed parameter
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(GrantErrorKind::InvalidRequest, message)
    }

    /// Unknown client
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::new(GrantErrorKind::InvalidClient, message)
    }

    /// Unknown, consumed or revoked grant
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::new(GrantErrorKind::InvalidGrant, message)
    }

    /// Unsupported scope
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::new(GrantErrorKind::InvalidScope, message)
    }

    /// Unsupported grant type
    #[must_use]
    pub fn unsupported_grant_type(grant_type: &str) -> Self {
        Self::new(
            GrantErrorKind::UnsupportedGrantType,
            format!("Grant type '{grant_type}' is not supported"),
        )
    }

    /// Device authorization still pending
    #[must_use]
    pub fn authorization_pending() -> Self {
        Self::new(
            GrantErrorKind::AuthorizationPending,
            "The authorization request is still pending",
        )
    }

    /// Client polls too fast; must wait `interval` seconds
    #[must_use]
    pub fn slow_down(interval: u64) -> Self {
        Self {
            kind: GrantErrorKind::SlowDown,
            message: format!("Polling too frequently, wait {interval} seconds"),
            retry_after: Some(interval),
        }
    }

    /// Device code expired
    #[must_use]
    pub fn expired_token() -> Self {
        Self::new(GrantErrorKind::ExpiredToken, "The device code has expired")
    }

    /// Resource owner denied the request
    #[must_use]
    pub fn access_denied() -> Self {
        Self::new(
            GrantErrorKind::AccessDenied,
            "The authorization request was denied",
        )
    }

    /// Bearer token rejected
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::new(GrantErrorKind::InvalidToken, message)
    }

    /// Server-side failure; detail stays in the logs
    #[must_use]
    pub fn server_error() -> Self {
        Self::new(
            GrantErrorKind::ServerError,
            "The authorization server encountered an unexpected condition",
        )
    }

    /// Whether the client is expected to retry the same request
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            GrantErrorKind::AuthorizationPending | GrantErrorKind::SlowDown
        )
    }
}

impl From<AppError> for GrantError {
    fn from(error: AppError) -> Self {
        tracing::error!(code = ?error.code, "OAuth operation failed: {}", error.message);
        Self::server_error()
    }
}

/// Wire body of an `OAuth2` error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuth2ErrorBody {
    /// RFC 6749 error code
    pub error: String,
    /// Human-readable description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
    /// New polling interval after `slow_down`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval: Option<u64>,
}

impl From<&GrantError> for OAuth2ErrorBody {
    fn from(error: &GrantError) -> Self {
        Self {
            error: error.kind.as_str().to_owned(),
            error_description: Some(error.message.clone()),
            interval: error.retry_after,
        }
    }
}

#[cfg(feature = "http-response")]
mod http_response {
    use super::{GrantError, OAuth2ErrorBody};
    use axum::response::{IntoResponse, Response};
    use axum::Json;
    use http::header::{CACHE_CONTROL, PRAGMA, RETRY_AFTER};
    use http::{HeaderValue, StatusCode};

    impl IntoResponse for GrantError {
        fn into_response(self) -> Response {
            let status =
                StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::BAD_REQUEST);
            let mut response = (status, Json(OAuth2ErrorBody::from(&self))).into_response();
            let headers = response.headers_mut();
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
            if let Some(retry_after) = self.retry_after {
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
            }
            response
        }
    }
}
