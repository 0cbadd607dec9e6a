// ABOUTME: OAuth 2.0 data models for device authorization, code flow and token exchange
// ABOUTME: Implements RFC 8628, RFC 6749, RFC 7009 and RFC 8414 request/response structures
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// RFC 8628 device authorization request
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceAuthorizationRequestBody {
    /// Client identifier
    pub client_id: String,
    /// Space-separated requested scopes
    pub scope: Option<String>,
}

/// RFC 8628 device authorization response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceAuthorizationResponse {
    /// Secret polled by the device
    pub device_code: String,
    /// Short code the user types at the verification page
    pub user_code: String,
    /// Page where the user enters the code
    pub verification_uri: String,
    /// Verification page with the user code pre-filled
    pub verification_uri_complete: String,
    /// Lifetime of both codes in seconds
    pub expires_in: u64,
    /// Minimum polling interval in seconds
    pub interval: u64,
}

/// OAuth 2.0 Authorization Request (redirect flow)
#[derive(Debug, Deserialize, Clone)]
pub struct AuthorizeRequest {
    /// Response type, must be `code`
    pub response_type: String,
    /// Client identifier
    pub client_id: String,
    /// Redirect URI for response
    pub redirect_uri: String,
    /// Requested scopes
    pub scope: Option<String>,
    /// State parameter for CSRF protection
    pub state: Option<String>,
    /// PKCE code challenge (RFC 7636)
    pub code_challenge: Option<String>,
    /// PKCE code challenge method, only `S256` is accepted
    pub code_challenge_method: Option<String>,
    /// Resource indicator (RFC 8707) the token is bound to
    pub resource: Option<String>,
}

/// OAuth 2.0 Token Request covering every supported grant
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TokenRequest {
    /// Grant type
    #[serde(default)]
    pub grant_type: String,
    /// Client ID
    #[serde(default)]
    pub client_id: Option<String>,
    /// Authorization code (for `authorization_code` grant)
    pub code: Option<String>,
    /// Redirect URI used at authorization time
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (RFC 7636)
    pub code_verifier: Option<String>,
    /// Resource indicator, must match the authorization request
    pub resource: Option<String>,
    /// Device code (for the device grant)
    pub device_code: Option<String>,
    /// Refresh token (for `refresh_token` grant)
    pub refresh_token: Option<String>,
    /// Requested scopes; ignored, grants keep their original scope
    pub scope: Option<String>,
}

/// OAuth 2.0 Token Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// Opaque access token
    pub access_token: String,
    /// Token type (always "Bearer")
    pub token_type: String,
    /// Expires in seconds
    pub expires_in: u64,
    /// Opaque refresh token
    pub refresh_token: String,
    /// Scopes granted
    pub scope: String,
    /// RS256 id token when `openid` was granted through the code flow
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// RFC 7009 token revocation request
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequest {
    /// Token to revoke
    pub token: String,
    /// `access_token` or `refresh_token`
    pub token_type_hint: Option<String>,
    /// Client ID
    pub client_id: Option<String>,
}

/// Decision a user takes on the verification page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceVerifyAction {
    /// Grant the device access
    Approve,
    /// Refuse the device access
    Deny,
}

/// Body of `POST /oauth/device/verify`
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceVerifyRequest {
    /// Code as typed by the user
    pub user_code: String,
    /// Approve or deny
    pub action: DeviceVerifyAction,
}

/// Query of `GET /oauth/device`
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceLookupQuery {
    /// Pre-filled code from `verification_uri_complete`
    pub user_code: Option<String>,
}

/// What the verification page shows about a pending device request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLookupResponse {
    /// Normalised user code
    pub user_code: String,
    /// Requesting client
    pub client_id: String,
    /// Requested scopes
    pub scope: String,
    /// When the request lapses
    pub expires_at: DateTime<Utc>,
    /// Current status
    pub status: String,
}

/// RFC 8414 authorization server metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerMetadata {
    /// Issuer identifier
    pub issuer: String,
    /// Redirect-flow authorization endpoint
    pub authorization_endpoint: String,
    /// Token endpoint
    pub token_endpoint: String,
    /// RFC 8628 device authorization endpoint
    pub device_authorization_endpoint: String,
    /// RFC 7009 revocation endpoint
    pub revocation_endpoint: String,
    /// JWKS document
    pub jwks_uri: String,
    /// Supported grant types
    pub grant_types_supported: Vec<String>,
    /// Supported response types
    pub response_types_supported: Vec<String>,
    /// Supported scopes
    pub scopes_supported: Vec<String>,
    /// Supported PKCE methods
    pub code_challenge_methods_supported: Vec<String>,
    /// Client authentication methods (public clients only)
    pub token_endpoint_auth_methods_supported: Vec<String>,
}
