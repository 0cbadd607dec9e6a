// ABOUTME: HTTP-level tests for the OAuth2 authorization server routes
// ABOUTME: Drives device authorization, verification, token, revocation, authorize and discovery over axum
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

mod common;
mod helpers;

use anyhow::Result;
use common::{
    create_test_resources, create_test_resources_with, issue_device_tokens, test_config,
    TEST_CLIENT_ID, TEST_REDIRECT_URI, TEST_RESOURCE,
};
use helpers::axum_test::AxumTestRequest;
use mcp_device_gateway::constants::oauth::{DEVICE_CODE_GRANT_TYPE, REFRESH_TOKEN_GRANT_TYPE};
use mcp_device_gateway::mcp::ServerResources;
use mcp_device_gateway::oauth2_server::codes::{hash_token, pkce_challenge};
use serde_json::{json, Value};
use std::sync::Arc;
use url::Url;

const SESSION_HEADER: &str = "x-forum-user-id";

async fn start_device_flow(resources: &Arc<ServerResources>) -> Value {
    let response = AxumTestRequest::post("/oauth/device_authorization")
        .form(&[("client_id", TEST_CLIENT_ID), ("scope", "mcp:read mcp:write")])
        .send(resources.router())
        .await;
    assert_eq!(response.status(), 200, "{}", response.text());
    response.json()
}

async fn poll(resources: &Arc<ServerResources>, device_code: &str) -> (u16, Value) {
    let response = AxumTestRequest::post("/oauth/token")
        .form(&[
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("client_id", TEST_CLIENT_ID),
            ("device_code", device_code),
        ])
        .send(resources.router())
        .await;
    (response.status(), response.json())
}

#[tokio::test]
async fn test_device_flow_over_http() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start_device_flow(&resources).await;
    let device_code = authorization["device_code"].as_str().unwrap().to_owned();
    let user_code = authorization["user_code"].as_str().unwrap().to_owned();
    assert_eq!(
        authorization["verification_uri"],
        "http://localhost:8081/oauth/device"
    );

    let (status, body) = poll(&resources, &device_code).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "authorization_pending");

    let lookup = AxumTestRequest::get(&format!(
        "/oauth/device?user_code={}",
        user_code.to_lowercase().replace('-', "")
    ))
    .header(SESSION_HEADER, "alice")
    .send(resources.router())
    .await;
    assert_eq!(lookup.status(), 200);
    let lookup: Value = lookup.json();
    assert_eq!(lookup["user_code"], user_code);
    assert_eq!(lookup["status"], "pending");
    assert_eq!(lookup["scope"], "mcp:read mcp:write");

    let verify = AxumTestRequest::post("/oauth/device/verify")
        .header(SESSION_HEADER, "alice")
        .json(&json!({"user_code": user_code, "action": "approve"}))
        .send(resources.router())
        .await;
    assert_eq!(verify.status(), 200);
    assert_eq!(verify.json::<Value>()["status"], "approved");

    let (status, tokens) = poll(&resources, &device_code).await;
    assert_eq!(status, 200);
    assert_eq!(tokens["token_type"], "Bearer");
    assert_eq!(tokens["expires_in"], 3600);
    assert!(tokens["refresh_token"].is_string());
    assert!(tokens.get("id_token").is_none());

    let (status, body) = poll(&resources, &device_code).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn test_token_responses_are_not_cached() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start_device_flow(&resources).await;

    let response = AxumTestRequest::post("/oauth/token")
        .form(&[
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("client_id", TEST_CLIENT_ID),
            ("device_code", authorization["device_code"].as_str().unwrap()),
        ])
        .send(resources.router())
        .await;
    assert_eq!(response.header("cache-control").as_deref(), Some("no-store"));
    assert_eq!(response.header("pragma").as_deref(), Some("no-cache"));
    Ok(())
}

#[tokio::test]
async fn test_slow_down_over_http() -> Result<()> {
    let mut config = test_config();
    config.oauth.device_poll_interval_secs = 5;
    let (resources, _) = create_test_resources_with(config)?;
    let authorization = start_device_flow(&resources).await;
    let device_code = authorization["device_code"].as_str().unwrap();

    let (_, first) = poll(&resources, device_code).await;
    assert_eq!(first["error"], "authorization_pending");

    let response = AxumTestRequest::post("/oauth/token")
        .form(&[
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("client_id", TEST_CLIENT_ID),
            ("device_code", device_code),
        ])
        .send(resources.router())
        .await;
    assert_eq!(response.status(), 400);
    assert_eq!(response.header("retry-after").as_deref(), Some("10"));
    let body: Value = response.json();
    assert_eq!(body["error"], "slow_down");
    assert_eq!(body["interval"], 10);
    Ok(())
}

#[tokio::test]
async fn test_denied_device_over_http() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start_device_flow(&resources).await;

    let verify = AxumTestRequest::post("/oauth/device/verify")
        .header(SESSION_HEADER, "alice")
        .form(&[
            ("user_code", authorization["user_code"].as_str().unwrap()),
            ("action", "deny"),
        ])
        .send(resources.router())
        .await;
    assert_eq!(verify.status(), 200);
    assert_eq!(verify.json::<Value>()["status"], "denied");

    let (status, body) = poll(&resources, authorization["device_code"].as_str().unwrap()).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "access_denied");
    Ok(())
}

#[tokio::test]
async fn test_verification_requires_session() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start_device_flow(&resources).await;

    let verify = AxumTestRequest::post("/oauth/device/verify")
        .json(&json!({"user_code": authorization["user_code"], "action": "approve"}))
        .send(resources.router())
        .await;
    assert_eq!(verify.status(), 401);

    let lookup = AxumTestRequest::get("/oauth/device?user_code=ABCD-EFGH")
        .send(resources.router())
        .await;
    assert_eq!(lookup.status(), 401);
    Ok(())
}

#[tokio::test]
async fn test_device_authorization_errors() -> Result<()> {
    let resources = create_test_resources()?;

    let unknown_client = AxumTestRequest::post("/oauth/device_authorization")
        .form(&[("client_id", "someone-else")])
        .send(resources.router())
        .await;
    assert_eq!(unknown_client.status(), 400);
    assert_eq!(unknown_client.json::<Value>()["error"], "invalid_client");

    let bad_scope = AxumTestRequest::post("/oauth/device_authorization")
        .json(&json!({"client_id": TEST_CLIENT_ID, "scope": "mcp:sse:read"}))
        .send(resources.router())
        .await;
    assert_eq!(bad_scope.status(), 400);
    assert_eq!(bad_scope.json::<Value>()["error"], "invalid_scope");

    let missing_client = AxumTestRequest::post("/oauth/device_authorization")
        .form(&[("scope", "mcp:read")])
        .send(resources.router())
        .await;
    assert_eq!(missing_client.status(), 400);
    assert_eq!(missing_client.json::<Value>()["error"], "invalid_request");
    Ok(())
}

#[tokio::test]
async fn test_token_endpoint_grant_errors() -> Result<()> {
    let resources = create_test_resources()?;

    let unsupported = AxumTestRequest::post("/oauth/token")
        .form(&[("grant_type", "password")])
        .send(resources.router())
        .await;
    assert_eq!(unsupported.status(), 400);
    assert_eq!(unsupported.json::<Value>()["error"], "unsupported_grant_type");

    let missing = AxumTestRequest::post("/oauth/token")
        .form(&[("client_id", TEST_CLIENT_ID)])
        .send(resources.router())
        .await;
    assert_eq!(missing.json::<Value>()["error"], "invalid_request");

    let garbage = AxumTestRequest::post("/oauth/token")
        .header("content-type", "application/json")
        .raw_body("{oops")
        .send(resources.router())
        .await;
    assert_eq!(garbage.status(), 400);
    assert_eq!(garbage.json::<Value>()["error"], "invalid_request");
    Ok(())
}

#[tokio::test]
async fn test_refresh_over_json_body() -> Result<()> {
    let resources = create_test_resources()?;
    let tokens = issue_device_tokens(&resources, "alice", "mcp:read").await?;

    let refreshed = AxumTestRequest::post("/oauth/token")
        .json(&json!({
            "grant_type": REFRESH_TOKEN_GRANT_TYPE,
            "client_id": TEST_CLIENT_ID,
            "refresh_token": tokens.refresh_token,
        }))
        .send(resources.router())
        .await;
    assert_eq!(refreshed.status(), 200);
    let body: Value = refreshed.json();
    assert_ne!(body["refresh_token"], tokens.refresh_token.as_str());
    assert_eq!(body["scope"], "mcp:read");

    let replay = AxumTestRequest::post("/oauth/token")
        .form(&[
            ("grant_type", REFRESH_TOKEN_GRANT_TYPE),
            ("client_id", TEST_CLIENT_ID),
            ("refresh_token", tokens.refresh_token.as_str()),
        ])
        .send(resources.router())
        .await;
    assert_eq!(replay.status(), 400);
    assert_eq!(replay.json::<Value>()["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn test_revocation_always_succeeds() -> Result<()> {
    let resources = create_test_resources()?;
    let tokens = issue_device_tokens(&resources, "alice", "mcp:read").await?;

    for token in [tokens.refresh_token.as_str(), "never-issued"] {
        let response = AxumTestRequest::post("/oauth/revoke")
            .form(&[("token", token), ("client_id", TEST_CLIENT_ID)])
            .send(resources.router())
            .await;
        assert_eq!(response.status(), 200);
        assert_eq!(response.json::<Value>(), json!({}));
    }

    let family = resources
        .tokens
        .get_refresh_token(&hash_token(&tokens.refresh_token).expect("hashable"))
        .await?
        .unwrap();
    assert!(resources.tokens.is_family_revoked(&family.rotation_family_id).await?);
    Ok(())
}

#[tokio::test]
async fn test_authorize_redirects_with_code() -> Result<()> {
    let resources = create_test_resources()?;
    let challenge = pkce_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
    let mut uri = Url::parse("http://localhost/oauth/authorize")?;
    uri.query_pairs_mut()
        .append_pair("response_type", "code")
        .append_pair("client_id", TEST_CLIENT_ID)
        .append_pair("redirect_uri", TEST_REDIRECT_URI)
        .append_pair("scope", "openid mcp:read")
        .append_pair("state", "s1")
        .append_pair("code_challenge", &challenge)
        .append_pair("code_challenge_method", "S256")
        .append_pair("resource", TEST_RESOURCE);
    let path = format!("/oauth/authorize?{}", uri.query().unwrap());

    let anonymous = AxumTestRequest::get(&path).send(resources.router()).await;
    assert_eq!(anonymous.status(), 401);

    let response = AxumTestRequest::get(&path)
        .header(SESSION_HEADER, "alice")
        .send(resources.router())
        .await;
    assert_eq!(response.status(), 302);
    let location = Url::parse(&response.header("location").unwrap())?;
    assert!(location.as_str().starts_with(TEST_REDIRECT_URI));
    let params: Vec<(String, String)> = location.query_pairs().into_owned().collect();
    assert!(params.iter().any(|(k, v)| k == "state" && v == "s1"));
    assert!(params.iter().any(|(k, _)| k == "code"));
    Ok(())
}

#[tokio::test]
async fn test_authorize_redirects_errors_and_rejects_unknown_redirect() -> Result<()> {
    let resources = create_test_resources()?;

    let plain = AxumTestRequest::get(&format!(
        "/oauth/authorize?response_type=code&client_id={TEST_CLIENT_ID}&redirect_uri={}&state=s2&code_challenge=abc&code_challenge_method=plain&resource={}",
        urlencoding::encode(TEST_REDIRECT_URI),
        urlencoding::encode(TEST_RESOURCE),
    ))
    .header(SESSION_HEADER, "alice")
    .send(resources.router())
    .await;
    assert_eq!(plain.status(), 302);
    let location = plain.header("location").unwrap();
    assert!(location.contains("error=invalid_request"));
    assert!(location.contains("state=s2"));

    let foreign = AxumTestRequest::get(&format!(
        "/oauth/authorize?response_type=code&client_id={TEST_CLIENT_ID}&redirect_uri={}",
        urlencoding::encode("https://evil.example/cb"),
    ))
    .header(SESSION_HEADER, "alice")
    .send(resources.router())
    .await;
    assert_eq!(foreign.status(), 400);
    assert!(foreign.header("location").is_none());
    Ok(())
}

#[tokio::test]
async fn test_discovery_and_jwks() -> Result<()> {
    let resources = create_test_resources()?;

    let metadata: Value = AxumTestRequest::get("/.well-known/oauth-authorization-server")
        .send(resources.router())
        .await
        .json();
    assert_eq!(metadata["issuer"], "http://localhost:8081");
    assert_eq!(
        metadata["device_authorization_endpoint"],
        "http://localhost:8081/oauth/device_authorization"
    );
    assert_eq!(metadata["code_challenge_methods_supported"], json!(["S256"]));
    assert!(metadata["grant_types_supported"]
        .as_array()
        .unwrap()
        .contains(&json!(DEVICE_CODE_GRANT_TYPE)));

    let jwks = AxumTestRequest::get("/.well-known/jwks.json")
        .send(resources.router())
        .await;
    assert_eq!(jwks.status(), 200);
    let body: Value = jwks.json();
    assert_eq!(body["keys"][0]["kid"], resources.oauth_server.signer().kid());
    assert_eq!(body["keys"][0]["alg"], "RS256");
    Ok(())
}
