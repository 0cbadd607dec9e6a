// ABOUTME: OAuth 2.0 authorization server for MCP clients with opaque hash-stored tokens
// ABOUTME: RFC 8628 device grant, PKCE code flow, refresh rotation with breach detection, RFC 7009 revocation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Single-use authorization codes for the redirect flow
pub mod authorization_codes;
/// Periodic removal of expired token and device records
pub mod cleanup;
/// Code and token generation, hashing and PKCE
pub mod codes;
/// RFC 8628 device authorization grant
pub mod device_grant;
/// Device authorization records
pub mod device_store;
/// OAuth 2.0 authorization server endpoints
pub mod endpoints;
/// OAuth 2.0 data models and types
pub mod models;
/// Refresh token rotation and family revocation
pub mod rotation;
/// HTTP routes
pub mod routes;
/// Access and refresh token records
pub mod tokens;

pub use authorization_codes::{AuthorizationCode, AuthorizationCodeStore, NewAuthorizationCode};
pub use cleanup::{CleanupReport, TokenCleanup};
pub use device_grant::{DeviceGrantConfig, DeviceGrantEngine};
pub use device_store::{DeviceAuthStore, DeviceAuthorizationRequest, DeviceAuthorizationStatus};
pub use endpoints::{AuthorizeError, OAuth2AuthorizationServer};
pub use models::{
    AuthorizationServerMetadata, AuthorizeRequest, DeviceAuthorizationRequestBody,
    DeviceAuthorizationResponse, RevokeRequest, TokenRequest, TokenResponse,
};
pub use rotation::{RevocationOutcome, TokenRotationEngine};
pub use routes::OAuth2Routes;
pub use tokens::{
    AccessTokenRecord, FamilyLink, IssuedTokens, RefreshTokenRecord, RevocationReason, TokenStore,
};
