// ABOUTME: MCP (Model Context Protocol) route handlers for AI assistant integration
// ABOUTME: JSON-RPC over POST /api/mcp and the authenticated event stream on GET /api/mcp

//! MCP protocol routes for AI assistant integration

use crate::constants::oauth::{
    AUTHORIZATION_CODE_GRANT_TYPE, DEVICE_CODE_GRANT_TYPE, DEVICE_SCOPES, REFRESH_TOKEN_GRANT_TYPE,
};
use crate::errors::{AppError, ErrorCode};
use crate::mcp::gateway::GatewayOutput;
use crate::mcp::resources::ServerResources;
use crate::middleware::{require_sse_scope, AuthError, RequestContext};
use crate::sse::{mcp_event_stream, StreamMessage};
use crate::tools::ToolContext;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE, WWW_AUTHENTICATE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

/// Whether an `Accept` header admits `application/json`
#[must_use]
pub fn accepts_json(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|range| range.split(';').next())
        .any(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

/// Whether `Content-Type` is `application/json`, parameters allowed
#[must_use]
pub fn is_json_content(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(';').next())
        .is_some_and(|media| media.trim().eq_ignore_ascii_case("application/json"))
}

/// MCP routes implementation
pub struct McpRoutes;

impl McpRoutes {
    /// Create all MCP routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/api/mcp",
                post(Self::handle_jsonrpc).get(Self::handle_event_stream),
            )
            .with_state(resources)
    }

    /// Authentication failure carrying the device flow discovery hints
    fn unauthorized(error: AuthError, resources: &ServerResources) -> Response {
        let oauth = &resources.config.oauth;
        let challenge = error.challenge();
        let body = json!({
            "error": error.error_code(),
            "error_description": error.to_string(),
            "authorization_server": oauth.issuer_url,
            "device_authorization_endpoint": oauth.device_authorization_endpoint(),
            "token_endpoint": oauth.token_endpoint(),
            "grant_types_supported": [
                DEVICE_CODE_GRANT_TYPE,
                AUTHORIZATION_CODE_GRANT_TYPE,
                REFRESH_TOKEN_GRANT_TYPE,
            ],
            "scopes_supported": DEVICE_SCOPES,
        });

        let status = error.status();
        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = challenge.parse() {
            response.headers_mut().insert(WWW_AUTHENTICATE, value);
        }
        response
    }

    async fn handle_jsonrpc(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> Result<Response, Response> {
        if !accepts_json(&headers) {
            return Err(AppError::new(
                ErrorCode::NotAcceptable,
                "Accept must include application/json",
            )
            .into_response());
        }
        if !is_json_content(&headers) {
            return Err(AppError::new(
                ErrorCode::UnsupportedMediaType,
                "Content-Type must be application/json",
            )
            .into_response());
        }

        let auth = resources
            .authenticator
            .authenticate_headers(&headers)
            .await
            .map_err(|e| Self::unauthorized(e, &resources))?;

        let request_context =
            RequestContext::from_headers(&headers).with_auth(auth.user_id.as_str(), auth.auth_type);
        request_context.record_in_span();
        let context = ToolContext::from_auth(&auth, request_context.request_id);

        Ok(match resources.gateway.handle_body(&body, &context).await {
            GatewayOutput::NoContent => StatusCode::NO_CONTENT.into_response(),
            GatewayOutput::Single(response) => Json(response).into_response(),
            GatewayOutput::Batch(responses) => Json(responses).into_response(),
        })
    }

    async fn handle_event_stream(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
    ) -> Result<Response, Response> {
        let auth = resources
            .authenticator
            .authenticate_headers(&headers)
            .await
            .map_err(|e| Self::unauthorized(e, &resources))?;
        require_sse_scope(&auth).map_err(|e| Self::unauthorized(e, &resources))?;

        let guard = resources
            .sse_manager
            .try_acquire(&auth.user_id)
            .map_err(|rejection| AppError::from(rejection).into_response())?;

        let ping_interval = Duration::from_secs(resources.sse_manager.limits().ping_interval_secs);
        let stream = mcp_event_stream(guard, auth, ping_interval)
            .map(|message: StreamMessage| Ok::<Event, Infallible>(message.into_event()));

        Ok(Sse::new(stream).into_response())
    }
}
