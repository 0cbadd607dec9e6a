// ABOUTME: Health check route handlers for service monitoring and status endpoints
// ABOUTME: Reports liveness, key-value backend health and, given a Bearer token, the caller
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Health check routes for service monitoring

use crate::mcp::resources::ServerResources;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

/// Health routes implementation
pub struct HealthRoutes;

impl HealthRoutes {
    /// Create all health check routes
    ///
    /// Anonymous checks get liveness only. A request carrying a Bearer token is
    /// authenticated and the response names the caller, so clients can check a token
    /// without spending a tool call; an invalid token is a 401.
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        async fn health_handler(
            State(resources): State<Arc<ServerResources>>,
            headers: HeaderMap,
        ) -> Response {
            let caller = match resources.authenticator.authenticate_optional(&headers).await {
                Ok(caller) => caller.map(|context| {
                    json!({
                        "user_id": context.user_id,
                        "client_id": context.client_id,
                        "scopes": context.scopes,
                        "expires_in": context.seconds_remaining(),
                    })
                }),
                Err(e) => return e.into_response(),
            };

            let backend = resources.kv.backend_name();
            let (status, store) = match resources.kv.health_check().await {
                Ok(()) => (StatusCode::OK, json!({"backend": backend, "status": "healthy"})),
                Err(e) => {
                    tracing::warn!("Key-value health check failed: {e}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        json!({"backend": backend, "status": "unhealthy"}),
                    )
                }
            };

            let mut body = json!({
                "status": if status.is_success() { "healthy" } else { "degraded" },
                "version": env!("CARGO_PKG_VERSION"),
                "timestamp": Utc::now().to_rfc3339(),
                "store": store,
                "sse_connections": resources.sse_manager.total_connections(),
            });
            if let (Some(caller), Value::Object(fields)) = (caller, &mut body) {
                fields.insert("caller".to_owned(), caller);
            }
            (status, Json(body)).into_response()
        }

        Router::new()
            .route("/health", get(health_handler))
            .with_state(resources)
    }
}
