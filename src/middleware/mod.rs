// ABOUTME: HTTP middleware for request tracing, authentication, and context propagation
// ABOUTME: Provides request ID generation, span creation, and Bearer authentication
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Bearer-token authentication
pub mod auth;
/// Request ids and spans
pub mod tracing;

// Authentication middleware
pub use auth::{extract_bearer, require_sse_scope, AuthContext, AuthError, Authenticator};

// Request tracing and context management
pub use tracing::{
    create_mcp_span, create_request_span, propagate_request_id_layer, set_request_id_layer,
    RequestContext,
};
