// ABOUTME: Bearer-token authentication for MCP routes backed by the device grant token store
// ABOUTME: Resolves tokens to an auth context with the owner's forum profile attached
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::oauth::{AUTH_REALM, SSE_SCOPE};
use crate::errors::{AppError, ErrorCode};
use crate::logging::AppLogger;
use crate::oauth2_server::DeviceGrantEngine;
use crate::users::{UserDirectory, UserProfile};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tracing::field::Empty;
use tracing::Span;

/// Identity attached to an authenticated request
#[derive(Debug, Clone, Serialize)]
pub struct AuthContext {
    /// Token owner
    pub user_id: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Always `oauth2`; other token kinds are not accepted
    #[serde(rename = "type")]
    pub auth_type: &'static str,
    /// When this request was authenticated
    pub authenticated_at: DateTime<Utc>,
    /// When the presented access token expires
    pub expires_at: DateTime<Utc>,
    /// Owner's forum profile
    #[serde(flatten)]
    pub profile: UserProfile,
}

impl AuthContext {
    /// Whether the token carries `scope`
    #[must_use]
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|granted| granted == scope)
    }

    /// Seconds until the access token expires, zero when already past
    #[must_use]
    pub fn seconds_remaining(&self) -> i64 {
        (self.expires_at - Utc::now()).num_seconds().max(0)
    }
}

/// Authentication failures; each renders as 401 with a Bearer challenge
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No Authorization header
    #[error("Missing Authorization header")]
    MissingHeader,
    /// Header present but not `Bearer <token>`
    #[error("Authorization header must be 'Bearer <token>'")]
    MalformedHeader,
    /// Unknown, expired or revoked token
    #[error("The access token is invalid or expired")]
    InvalidToken,
    /// Token is valid but its owner no longer exists
    #[error("The token owner no longer exists")]
    UnknownUser,
    /// Token lacks a scope the route requires
    #[error("The access token lacks the required scope '{0}'")]
    InsufficientScope(String),
    /// Token store or user directory failed
    #[error("Authentication is temporarily unavailable")]
    Unavailable,
}

impl AuthError {
    /// `error` field of a JSON failure body
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InsufficientScope(_) => "insufficient_scope",
            Self::Unavailable => "temporarily_unavailable",
            _ => "invalid_token",
        }
    }

    /// `WWW-Authenticate` challenge for this failure
    #[must_use]
    pub fn challenge(&self) -> String {
        let error = match self {
            Self::InsufficientScope(_) => "insufficient_scope",
            _ => "invalid_token",
        };
        format!(
            "Bearer realm=\"{AUTH_REALM}\", error=\"{error}\", error_description=\"{self}\""
        )
    }

    /// HTTP status for this failure
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::InsufficientScope(_) => StatusCode::FORBIDDEN,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl From<AuthError> for AppError {
    fn from(error: AuthError) -> Self {
        let code = match error {
            AuthError::MissingHeader => ErrorCode::AuthRequired,
            AuthError::InsufficientScope(_) => ErrorCode::PermissionDenied,
            AuthError::Unavailable => ErrorCode::ResourceUnavailable,
            _ => ErrorCode::AuthInvalid,
        };
        Self::new(code, error.to_string())
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let challenge = self.challenge();
        let body = json!({
            "error": self.error_code(),
            "error_description": self.to_string(),
        });
        let mut response = (self.status(), Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&challenge) {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Extract the token from `Authorization: Bearer <token>`
///
/// The scheme is matched case-insensitively and the header must have exactly two parts.
///
/// # Errors
///
/// Returns `MissingHeader` or `MalformedHeader`
pub fn extract_bearer(auth_header: Option<&str>) -> Result<&str, AuthError> {
    let header = auth_header.ok_or(AuthError::MissingHeader)?;
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}

/// Unified Bearer authenticator for every protected MCP route
///
/// Tokens are validated only against the device grant token store. Both device flow and
/// code flow tokens live there, so one path covers both. No other token kind exists:
/// anything the store does not know fails as `invalid_token`.
#[derive(Clone)]
pub struct Authenticator {
    device_grant: Arc<DeviceGrantEngine>,
    users: Arc<dyn UserDirectory>,
}

impl Authenticator {
    /// Create an authenticator over the token store and user directory
    #[must_use]
    pub fn new(device_grant: Arc<DeviceGrantEngine>, users: Arc<dyn UserDirectory>) -> Self {
        Self {
            device_grant,
            users,
        }
    }

    /// Authenticate from request headers
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] for any missing, malformed or invalid credential
    pub async fn authenticate_headers(&self, headers: &HeaderMap) -> Result<AuthContext, AuthError> {
        let auth_header = match headers.get(AUTHORIZATION).map(HeaderValue::to_str) {
            None => None,
            Some(Ok(value)) => Some(value),
            Some(Err(_)) => {
                let error = AuthError::MalformedHeader;
                Self::log_failure(&error);
                return Err(error);
            }
        };
        self.authenticate_request(auth_header).await
    }

    fn log_failure(error: &AuthError) {
        AppLogger::log_auth_event(
            "unknown",
            "bearer_authentication",
            false,
            Some(&error.to_string()),
        );
    }

    /// Authenticate an `Authorization` header value
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] for any missing, malformed or invalid credential
    #[tracing::instrument(
        skip(self, auth_header),
        fields(auth_method = "oauth2", user_id = Empty, success = Empty)
    )]
    pub async fn authenticate_request(
        &self,
        auth_header: Option<&str>,
    ) -> Result<AuthContext, AuthError> {
        let result = self.authenticate_inner(auth_header).await;
        match &result {
            Ok(context) => {
                Span::current()
                    .record("user_id", context.user_id.as_str())
                    .record("success", true);
                tracing::debug!("Bearer authentication succeeded");
            }
            Err(AuthError::MissingHeader) => {
                Span::current().record("success", false);
                tracing::debug!("Request carried no Authorization header");
            }
            Err(e) => {
                Span::current().record("success", false);
                Self::log_failure(e);
            }
        }
        result
    }

    async fn authenticate_inner(&self, auth_header: Option<&str>) -> Result<AuthContext, AuthError> {
        let token = extract_bearer(auth_header)?;

        let record = self
            .device_grant
            .validate_access_token(token)
            .await
            .map_err(|e| {
                tracing::error!("Token store lookup failed during authentication: {e}");
                AuthError::Unavailable
            })?
            .ok_or(AuthError::InvalidToken)?;

        let profile = self
            .users
            .get_user_data(&record.user_id)
            .await
            .map_err(|e| {
                tracing::error!("User directory lookup failed during authentication: {e}");
                AuthError::Unavailable
            })?
            .ok_or(AuthError::UnknownUser)?;

        Ok(AuthContext {
            user_id: record.user_id,
            client_id: record.client_id,
            scopes: record.scopes,
            auth_type: "oauth2",
            authenticated_at: Utc::now(),
            expires_at: record.expires_at,
            profile,
        })
    }

    /// Authenticate when a token is present, otherwise continue anonymously
    ///
    /// A present but invalid token still fails.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when a supplied credential does not validate
    pub async fn authenticate_optional(
        &self,
        headers: &HeaderMap,
    ) -> Result<Option<AuthContext>, AuthError> {
        if headers.get(AUTHORIZATION).is_none() {
            return Ok(None);
        }
        self.authenticate_headers(headers).await.map(Some)
    }
}

/// Require the SSE stream scope
///
/// # Errors
///
/// Returns `InsufficientScope` when the token lacks `mcp:sse:read`
pub fn require_sse_scope(context: &AuthContext) -> Result<(), AuthError> {
    if context.has_scope(SSE_SCOPE) {
        Ok(())
    } else {
        Err(AuthError::InsufficientScope(SSE_SCOPE.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bearer_accepts_any_scheme_case() {
        assert_eq!(extract_bearer(Some("Bearer abc")), Ok("abc"));
        assert_eq!(extract_bearer(Some("bearer abc")), Ok("abc"));
        assert_eq!(extract_bearer(Some("BEARER   abc")), Ok("abc"));
    }

    #[test]
    fn test_extract_bearer_rejects_malformed() {
        assert_eq!(extract_bearer(None), Err(AuthError::MissingHeader));
        assert_eq!(extract_bearer(Some("Bearer")), Err(AuthError::MalformedHeader));
        assert_eq!(extract_bearer(Some("Basic abc")), Err(AuthError::MalformedHeader));
        assert_eq!(extract_bearer(Some("Bearer a b")), Err(AuthError::MalformedHeader));
    }

    #[test]
    fn test_challenge_format() {
        let challenge = AuthError::InvalidToken.challenge();
        assert!(challenge.starts_with("Bearer realm=\"mcp\", error=\"invalid_token\""));
        assert!(challenge.contains("error_description="));
    }
}
