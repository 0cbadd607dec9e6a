// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Builds in-memory server resources, seeded users and device-flow tokens
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org
#![allow(
    dead_code,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::must_use_candidate
)]
//! Shared test utilities for `mcp_device_gateway`
//!
//! Every helper uses the in-memory store, so no suite needs network access.

use anyhow::{anyhow, Result};
use mcp_device_gateway::{
    config::ServerConfig,
    constants::oauth::{AUTHORIZATION_CODE_GRANT_TYPE, DEVICE_CODE_GRANT_TYPE},
    jwks::KeySigner,
    mcp::ServerResources,
    oauth2_server::{
        codes::pkce_challenge, AuthorizeRequest, DeviceAuthorizationRequestBody, TokenRequest,
        TokenResponse,
    },
    store::{InMemoryStore, KeyValueStore},
    tools::{builtin_tools, ToolRegistry},
    users::{InMemoryUserDirectory, UserProfile},
};
use std::env;
use std::sync::{Arc, Once};
use tracing::Level;
use url::Url;

static INIT_LOGGER: Once = Once::new();

/// Client id every test configuration accepts
pub const TEST_CLIENT_ID: &str = "mcp-client";
/// Redirect URI registered for the code flow
pub const TEST_REDIRECT_URI: &str = "http://localhost:3000/callback";
/// Resource indicator used by code-flow tests
pub const TEST_RESOURCE: &str = "http://localhost:8081/api/mcp";

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => Level::TRACE,
            Ok("DEBUG") => Level::DEBUG,
            Ok("INFO") => Level::INFO,
            _ => Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Configuration with immediate polling and one registered redirect URI
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.oauth.client_id = TEST_CLIENT_ID.to_owned();
    config.oauth.redirect_uris = vec![TEST_REDIRECT_URI.to_owned()];
    config.oauth.device_poll_interval_secs = 0;
    config.kv.enable_background_cleanup = false;
    config
}

/// Directory with `alice` and `bob`
pub fn test_directory() -> Arc<InMemoryUserDirectory> {
    let directory = InMemoryUserDirectory::new();
    directory.insert(
        UserProfile::new("alice", "alice")
            .with_roles(&["member"])
            .with_locale("en-US"),
    );
    directory.insert(UserProfile::new("bob", "bob"));
    Arc::new(directory)
}

/// Resources over a fresh in-memory store sized by `config.kv`
pub fn create_test_resources_with(
    config: ServerConfig,
) -> Result<(Arc<ServerResources>, Arc<InMemoryUserDirectory>)> {
    let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new(&config.kv));
    create_test_resources_over(config, kv)
}

/// Resources over a caller-supplied store
pub fn create_test_resources_over(
    config: ServerConfig,
    kv: Arc<dyn KeyValueStore>,
) -> Result<(Arc<ServerResources>, Arc<InMemoryUserDirectory>)> {
    init_test_logging();
    let directory = test_directory();
    let signer = KeySigner::generate(config.oauth.issuer_url.clone())?;

    let mut tools = ToolRegistry::new();
    tools.register_all(builtin_tools())?;

    let resources = ServerResources::new(config, kv, directory.clone(), signer, tools);
    Ok((Arc::new(resources), directory))
}

/// Resources with the default test configuration
pub fn create_test_resources() -> Result<Arc<ServerResources>> {
    Ok(create_test_resources_with(test_config())?.0)
}

/// Run the whole device flow for `user_id` and return the token response
pub async fn issue_device_tokens(
    resources: &ServerResources,
    user_id: &str,
    scope: &str,
) -> Result<TokenResponse> {
    let server = &resources.oauth_server;
    let authorization = server
        .device_authorization(DeviceAuthorizationRequestBody {
            client_id: TEST_CLIENT_ID.to_owned(),
            scope: Some(scope.to_owned()),
        })
        .await?;

    server
        .device_grant()
        .approve(&authorization.user_code, user_id)
        .await?;

    let tokens = server
        .token(TokenRequest {
            grant_type: DEVICE_CODE_GRANT_TYPE.to_owned(),
            client_id: Some(TEST_CLIENT_ID.to_owned()),
            device_code: Some(authorization.device_code),
            ..TokenRequest::default()
        })
        .await?;
    Ok(tokens)
}

/// Run the PKCE code flow for `user_id`; unlike the device flow it may grant the SSE scope
pub async fn issue_code_flow_tokens(
    resources: &ServerResources,
    user_id: &str,
    scope: &str,
) -> Result<TokenResponse> {
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    let server = &resources.oauth_server;

    let location = server
        .authorize(
            AuthorizeRequest {
                response_type: "code".to_owned(),
                client_id: TEST_CLIENT_ID.to_owned(),
                redirect_uri: TEST_REDIRECT_URI.to_owned(),
                scope: Some(scope.to_owned()),
                state: None,
                code_challenge: Some(pkce_challenge(VERIFIER)),
                code_challenge_method: Some("S256".to_owned()),
                resource: Some(TEST_RESOURCE.to_owned()),
            },
            user_id,
        )
        .await
        .map_err(|e| anyhow!("authorize failed: {e:?}"))?;

    let code = Url::parse(&location)?
        .query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("no code in {location}"))?;

    let tokens = server
        .token(TokenRequest {
            grant_type: AUTHORIZATION_CODE_GRANT_TYPE.to_owned(),
            client_id: Some(TEST_CLIENT_ID.to_owned()),
            code: Some(code),
            redirect_uri: Some(TEST_REDIRECT_URI.to_owned()),
            code_verifier: Some(VERIFIER.to_owned()),
            resource: Some(TEST_RESOURCE.to_owned()),
            ..TokenRequest::default()
        })
        .await?;
    Ok(tokens)
}
