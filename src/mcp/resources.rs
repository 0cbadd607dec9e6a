// ABOUTME: Centralized resource container for dependency injection in the gateway
// ABOUTME: Builds the shared store, OAuth engines, authenticator, tool gateway and HTTP router
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

//! # Server Resources Module
//!
//! Every engine shares one key-value store, so a Redis-backed deployment can run
//! several gateway processes behind a load balancer.

use crate::config::ServerConfig;
use crate::constants::protocol::MAX_REQUEST_BODY_BYTES;
use crate::errors::{AppError, AppResult};
use crate::jwks::KeySigner;
use crate::mcp::gateway::JsonRpcGateway;
use crate::middleware::{
    create_request_span, propagate_request_id_layer, set_request_id_layer, Authenticator,
};
use crate::oauth2_server::{
    AuthorizationCodeStore, DeviceAuthStore, DeviceGrantConfig, DeviceGrantEngine,
    OAuth2AuthorizationServer, OAuth2Routes, TokenCleanup, TokenRotationEngine, TokenStore,
};
use crate::routes::{HealthRoutes, McpRoutes};
use crate::sse::SseConnectionManager;
use crate::store::{KeyValueStore, KvStoreFactory};
use crate::tools::{builtin_tools, ToolDefinition, ToolRegistry};
use crate::users::UserDirectory;
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Centralized resource container for dependency injection
///
/// Cloning is cheap; every field is an `Arc`.
#[derive(Clone)]
pub struct ServerResources {
    /// Validated server configuration
    pub config: Arc<ServerConfig>,
    /// Shared key-value store behind every engine
    pub kv: Arc<dyn KeyValueStore>,
    /// Access and refresh token records
    pub tokens: Arc<TokenStore>,
    /// Device, code and refresh grants plus discovery
    pub oauth_server: Arc<OAuth2AuthorizationServer>,
    /// Bearer authentication for MCP routes
    pub authenticator: Arc<Authenticator>,
    /// JSON-RPC dispatch over the tool registry
    pub gateway: Arc<JsonRpcGateway>,
    /// Live event-stream connection counts
    pub sse_manager: Arc<SseConnectionManager>,
    /// Host forum user lookups
    pub users: Arc<dyn UserDirectory>,
    /// Expired record sweeper
    pub cleanup: Arc<TokenCleanup>,
}

impl ServerResources {
    /// Wire the engines over an existing store, signer and tool registry
    #[must_use]
    pub fn new(
        config: ServerConfig,
        kv: Arc<dyn KeyValueStore>,
        users: Arc<dyn UserDirectory>,
        signer: KeySigner,
        tools: ToolRegistry,
    ) -> Self {
        let config = Arc::new(config);
        let tokens = Arc::new(TokenStore::new(kv.clone()));

        let device_grant = Arc::new(DeviceGrantEngine::new(
            DeviceAuthStore::new(kv.clone()),
            tokens.clone(),
            DeviceGrantConfig::from(&config.oauth),
        ));
        let rotation = Arc::new(TokenRotationEngine::new(tokens.clone()));
        let oauth_server = Arc::new(OAuth2AuthorizationServer::new(
            config.oauth.clone(),
            device_grant.clone(),
            rotation,
            AuthorizationCodeStore::new(kv.clone()),
            Arc::new(signer),
        ));

        let authenticator = Arc::new(Authenticator::new(device_grant, users.clone()));
        let gateway = Arc::new(JsonRpcGateway::new(Arc::new(tools)));
        let sse_manager = Arc::new(SseConnectionManager::new(config.sse));
        let cleanup = Arc::new(TokenCleanup::new(tokens.clone()));

        Self {
            config,
            kv,
            tokens,
            oauth_server,
            authenticator,
            gateway,
            sse_manager,
            users,
            cleanup,
        }
    }

    /// Build resources from configuration with the built-in tools plus `extra_tools`
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot connect, key generation fails or a tool
    /// definition is rejected by the registry
    pub async fn build(
        config: ServerConfig,
        users: Arc<dyn UserDirectory>,
        extra_tools: Vec<ToolDefinition>,
    ) -> AppResult<Self> {
        let kv = KvStoreFactory::from_config(&config.kv).await?;
        let signer = KeySigner::generate(config.oauth.issuer_url.clone())?;

        let mut tools = ToolRegistry::new();
        tools
            .register_all(builtin_tools().into_iter().chain(extra_tools))
            .map_err(|e| AppError::config(format!("Tool registration failed: {e}")))?;

        Ok(Self::new(config, kv, users, signer, tools))
    }

    /// Start the periodic token sweep
    #[must_use]
    pub fn spawn_cleanup(&self) -> JoinHandle<()> {
        self.cleanup
            .clone()
            .spawn(Duration::from_secs(self.config.token_cleanup_interval_secs))
    }

    /// Assemble every route with request tracing and a body size cap
    #[must_use]
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .merge(OAuth2Routes::routes(self.clone()))
            .merge(McpRoutes::routes(self.clone()))
            .merge(HealthRoutes::routes(self.clone()))
            .layer(RequestBodyLimitLayer::new(MAX_REQUEST_BODY_BYTES))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http().make_span_with(create_request_span))
            .layer(set_request_id_layer())
    }
}
