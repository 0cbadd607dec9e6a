// ABOUTME: Request tracing middleware for correlation and structured logging
// ABOUTME: Generates request IDs and creates spans for all HTTP and MCP operations
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use crate::constants::protocol::REQUEST_ID_HEADER;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, Request};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::field::Empty;
use tracing::Span;
use uuid::Uuid;

/// Request context that flows through the entire request lifecycle
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id, taken from `x-request-id` when present
    pub request_id: String,
    /// Authenticated user, once known
    pub user_id: Option<String>,
    /// How the caller authenticated
    pub auth_method: Option<String>,
}

impl RequestContext {
    /// Create new request context with generated request ID
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: format!("req_{}", Uuid::new_v4().simple()),
            user_id: None,
            auth_method: None,
        }
    }

    /// Context for a request, reusing the id set by [`SetRequestIdLayer`]
    #[must_use]
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map_or_else(Self::new, |request_id| Self {
                request_id: request_id.to_owned(),
                user_id: None,
                auth_method: None,
            })
    }

    /// Update context with authentication information
    #[must_use]
    pub fn with_auth(mut self, user_id: impl Into<String>, auth_method: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self.auth_method = Some(auth_method.into());
        self
    }

    /// Record context in current tracing span
    pub fn record_in_span(&self) {
        let span = Span::current();
        span.record("request_id", self.request_id.as_str());

        if let Some(user_id) = &self.user_id {
            span.record("user_id", user_id.as_str());
        }

        if let Some(auth_method) = &self.auth_method {
            span.record("auth_method", auth_method.as_str());
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Span factory for `TraceLayer::make_span_with`
pub fn create_request_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    tracing::info_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
        request_id = %request_id,
        user_id = Empty,
        auth_method = Empty,
    )
}

/// Create a tracing span for MCP operations
pub fn create_mcp_span(operation: &str) -> Span {
    tracing::info_span!(
        "mcp_operation",
        operation = %operation,
        request_id = Empty,
        user_id = Empty,
        tool_name = Empty,
        duration_ms = Empty,
        success = Empty,
    )
}

/// Layer assigning a UUID `x-request-id` to requests that lack one
#[must_use]
pub fn set_request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), MakeRequestUuid)
}

/// Layer copying `x-request-id` onto the response
#[must_use]
pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER))
}
