// ABOUTME: OAuth 2.0 HTTP route handlers for the axum router
// ABOUTME: Device authorization, token, revocation, authorize, verification and discovery endpoints
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::endpoints::AuthorizeError;
use super::models::{
    AuthorizeRequest, DeviceAuthorizationRequestBody, DeviceLookupQuery, DeviceLookupResponse,
    DeviceVerifyAction, DeviceVerifyRequest, RevokeRequest, TokenRequest,
};
use crate::errors::{AppError, GrantError};
use crate::mcp::resources::ServerResources;
use async_trait::async_trait;
use axum::extract::rejection::QueryRejection;
use axum::extract::{FromRequest, Query, Request, State};
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, LOCATION, PRAGMA};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;

/// Request body accepted as either form-encoded (RFC 6749) or JSON
pub struct OAuthBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for OAuthBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = GrantError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value.trim_start().starts_with("application/json"));

        if is_json {
            let Json(body) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| GrantError::invalid_request(e.body_text()))?;
            Ok(Self(body))
        } else {
            let Form(body) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| GrantError::invalid_request(e.body_text()))?;
            Ok(Self(body))
        }
    }
}

/// JSON response with `Cache-Control: no-store` and `Pragma: no-cache`
fn no_store_json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    let mut response = (status, Json(body)).into_response();
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// `OAuth2` routes implementation
pub struct OAuth2Routes;

impl OAuth2Routes {
    /// Create all `OAuth2` routes
    pub fn routes(resources: Arc<ServerResources>) -> Router {
        Router::new()
            .route(
                "/oauth/device_authorization",
                post(Self::handle_device_authorization),
            )
            .route("/oauth/token", post(Self::handle_token))
            .route("/oauth/revoke", post(Self::handle_revoke))
            .route("/oauth/authorize", get(Self::handle_authorize))
            .route("/oauth/device", get(Self::handle_device_lookup))
            .route("/oauth/device/verify", post(Self::handle_device_verify))
            .route(
                "/.well-known/oauth-authorization-server",
                get(Self::handle_discovery),
            )
            .route("/.well-known/jwks.json", get(Self::handle_jwks))
            .with_state(resources)
    }

    /// Forum user from the trusted session header
    fn session_user(headers: &HeaderMap, resources: &ServerResources) -> Result<String, AppError> {
        headers
            .get(resources.config.session_header.as_str())
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned)
            .ok_or_else(AppError::auth_required)
    }

    async fn handle_device_authorization(
        State(resources): State<Arc<ServerResources>>,
        OAuthBody(body): OAuthBody<DeviceAuthorizationRequestBody>,
    ) -> Result<Response, GrantError> {
        let response = resources.oauth_server.device_authorization(body).await?;
        Ok(no_store_json(StatusCode::OK, &response))
    }

    async fn handle_token(
        State(resources): State<Arc<ServerResources>>,
        OAuthBody(request): OAuthBody<TokenRequest>,
    ) -> Result<Response, GrantError> {
        let response = resources.oauth_server.token(request).await?;
        Ok(no_store_json(StatusCode::OK, &response))
    }

    async fn handle_revoke(
        State(resources): State<Arc<ServerResources>>,
        OAuthBody(request): OAuthBody<RevokeRequest>,
    ) -> Result<Response, GrantError> {
        resources.oauth_server.revoke(request).await?;
        Ok(no_store_json(StatusCode::OK, &json!({})))
    }

    async fn handle_authorize(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        query: Result<Query<AuthorizeRequest>, QueryRejection>,
    ) -> Result<Response, Response> {
        let user_id = Self::session_user(&headers, &resources).map_err(IntoResponse::into_response)?;
        let Query(request) = query.map_err(|e| {
            GrantError::invalid_request(e.body_text()).into_response()
        })?;

        match resources.oauth_server.authorize(request, &user_id).await {
            Ok(location) => Ok(Self::redirect(&location)),
            Err(error @ AuthorizeError::Redirect { .. }) => error
                .redirect_location()
                .map(|location| Self::redirect(&location))
                .ok_or_else(|| GrantError::invalid_request("Invalid redirect_uri").into_response()),
            Err(AuthorizeError::Direct(error)) => Err(error.into_response()),
        }
    }

    fn redirect(location: &str) -> Response {
        let mut response = StatusCode::FOUND.into_response();
        if let Ok(value) = HeaderValue::from_str(location) {
            response.headers_mut().insert(LOCATION, value);
        }
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }

    async fn handle_device_lookup(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        Query(query): Query<DeviceLookupQuery>,
    ) -> Result<Response, Response> {
        Self::session_user(&headers, &resources).map_err(IntoResponse::into_response)?;
        let user_code = query
            .user_code
            .filter(|code| !code.trim().is_empty())
            .ok_or_else(|| GrantError::invalid_request("user_code is required").into_response())?;

        let request = resources
            .oauth_server
            .device_grant()
            .lookup_user_code(&user_code)
            .await
            .map_err(IntoResponse::into_response)?;

        let body = DeviceLookupResponse {
            user_code: request.user_code.clone(),
            client_id: request.client_id.clone(),
            scope: request.scope.clone(),
            expires_at: request.expires_at,
            status: request.status.to_string(),
        };
        Ok(no_store_json(StatusCode::OK, &body))
    }

    async fn handle_device_verify(
        State(resources): State<Arc<ServerResources>>,
        headers: HeaderMap,
        OAuthBody(body): OAuthBody<DeviceVerifyRequest>,
    ) -> Result<Response, Response> {
        let user_id = Self::session_user(&headers, &resources).map_err(IntoResponse::into_response)?;
        let engine = resources.oauth_server.device_grant();

        let request = match body.action {
            DeviceVerifyAction::Approve => engine.approve(&body.user_code, &user_id).await,
            DeviceVerifyAction::Deny => engine.deny(&body.user_code).await,
        }
        .map_err(IntoResponse::into_response)?;

        Ok(no_store_json(
            StatusCode::OK,
            &json!({
                "status": request.status.to_string(),
                "client_id": request.client_id,
            }),
        ))
    }

    async fn handle_discovery(State(resources): State<Arc<ServerResources>>) -> Response {
        Json(resources.oauth_server.metadata()).into_response()
    }

    async fn handle_jwks(State(resources): State<Arc<ServerResources>>) -> Response {
        let mut response = Json(resources.oauth_server.signer().jwks()).into_response();
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=3600"));
        response
    }
}
