// ABOUTME: Integration tests for the RFC 8628 device authorization grant
// ABOUTME: Covers code uniqueness, polling states, slow_down backoff, expiry, one-time issuance and races
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

mod common;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use common::{
    create_test_resources, create_test_resources_over, create_test_resources_with,
    issue_device_tokens, test_config, TEST_CLIENT_ID,
};
use mcp_device_gateway::{
    constants::kv::DEVICE_PREFIX,
    constants::oauth::{DEVICE_CODE_GRANT_TYPE, MAX_POLL_INTERVAL_SECS},
    errors::{AppResult, GrantError, GrantErrorKind},
    mcp::ServerResources,
    oauth2_server::{
        DeviceAuthorizationRequestBody, DeviceAuthorizationResponse, DeviceAuthorizationStatus,
        TokenRequest, TokenResponse,
    },
    store::{InMemoryStore, KeyValueStore, KeyValueStoreExt},
};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// In-memory store whose device record reads take 50ms
struct SlowDeviceReads {
    inner: InMemoryStore,
}

#[async_trait]
impl KeyValueStore for SlowDeviceReads {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        if key.starts_with(DEVICE_PREFIX) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<bool> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        self.inner.delete(key).await
    }

    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        self.inner.ttl(key).await
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> AppResult<()> {
        self.inner.set_add(key, member, ttl).await
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()> {
        self.inner.set_remove(key, member).await
    }

    async fn set_members(&self, key: &str) -> AppResult<Vec<String>> {
        self.inner.set_members(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        self.inner.keys_with_prefix(prefix).await
    }

    async fn health_check(&self) -> AppResult<()> {
        self.inner.health_check().await
    }

    fn backend_name(&self) -> &'static str {
        "slow-memory"
    }
}

async fn start(resources: &ServerResources, scope: Option<&str>) -> DeviceAuthorizationResponse {
    resources
        .oauth_server
        .device_authorization(DeviceAuthorizationRequestBody {
            client_id: TEST_CLIENT_ID.to_owned(),
            scope: scope.map(str::to_owned),
        })
        .await
        .expect("device authorization")
}

async fn poll(
    resources: &ServerResources,
    device_code: &str,
    client_id: &str,
) -> Result<TokenResponse, GrantError> {
    resources
        .oauth_server
        .token(TokenRequest {
            grant_type: DEVICE_CODE_GRANT_TYPE.to_owned(),
            client_id: Some(client_id.to_owned()),
            device_code: Some(device_code.to_owned()),
            ..TokenRequest::default()
        })
        .await
}

fn kind<T>(result: Result<T, GrantError>) -> GrantErrorKind {
    match result {
        Ok(_) => panic!("expected an error"),
        Err(e) => e.kind,
    }
}

#[tokio::test]
async fn test_authorization_response_shape() -> Result<()> {
    let resources = create_test_resources()?;
    let response = start(&resources, Some("mcp:read mcp:write")).await;

    assert_eq!(response.device_code.len(), 43);
    assert_eq!(response.user_code.len(), 9);
    assert_eq!(&response.user_code[4..5], "-");
    assert_eq!(response.expires_in, 600);
    assert_eq!(response.interval, 0);
    assert_eq!(response.verification_uri, "http://localhost:8081/oauth/device");
    assert!(response
        .verification_uri_complete
        .starts_with("http://localhost:8081/oauth/device?user_code="));
    Ok(())
}

#[tokio::test]
async fn test_unknown_client_and_scope_rejected() -> Result<()> {
    let resources = create_test_resources()?;
    let server = &resources.oauth_server;

    let wrong_client = server
        .device_authorization(DeviceAuthorizationRequestBody {
            client_id: "someone-else".to_owned(),
            scope: None,
        })
        .await;
    assert_eq!(kind(wrong_client), GrantErrorKind::InvalidClient);

    let wrong_scope = server
        .device_authorization(DeviceAuthorizationRequestBody {
            client_id: TEST_CLIENT_ID.to_owned(),
            scope: Some("mcp:read admin".to_owned()),
        })
        .await;
    assert_eq!(kind(wrong_scope), GrantErrorKind::InvalidScope);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_authorizations_get_unique_codes() -> Result<()> {
    let resources = create_test_resources()?;
    let mut handles = Vec::new();
    for _ in 0..50 {
        let resources = resources.clone();
        handles.push(tokio::spawn(async move { start(&resources, None).await }));
    }

    let mut device_codes = HashSet::new();
    let mut user_codes = HashSet::new();
    for handle in handles {
        let response = handle.await?;
        assert!(device_codes.insert(response.device_code));
        assert!(user_codes.insert(response.user_code));
    }
    assert_eq!(device_codes.len(), 50);
    Ok(())
}

#[tokio::test]
async fn test_happy_path_issues_tokens_once() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start(&resources, Some("mcp:read openid")).await;

    assert_eq!(
        kind(poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await),
        GrantErrorKind::AuthorizationPending
    );

    resources
        .oauth_server
        .device_grant()
        .approve(&authorization.user_code, "alice")
        .await?;

    let tokens = poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await?;
    assert_eq!(tokens.token_type, "Bearer");
    assert_eq!(tokens.expires_in, 3600);
    assert_eq!(tokens.scope, "mcp:read openid");
    assert!(tokens.id_token.is_none());

    let record = resources
        .oauth_server
        .device_grant()
        .validate_access_token(&tokens.access_token)
        .await?
        .expect("access token is live");
    assert_eq!(record.user_id, "alice");
    assert_eq!(record.client_id, TEST_CLIENT_ID);

    // The code is spent
    assert_eq!(
        kind(poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await),
        GrantErrorKind::InvalidGrant
    );

    let stored = resources
        .oauth_server
        .device_grant()
        .devices()
        .get(&authorization.device_code)
        .await?
        .expect("issued record kept for its grace window");
    assert_eq!(stored.status, DeviceAuthorizationStatus::TokenIssued);
    assert!(stored.access_token_hash.is_some());
    Ok(())
}

#[tokio::test]
async fn test_concurrent_polls_issue_exactly_one_pair() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start(&resources, None).await;
    resources
        .oauth_server
        .device_grant()
        .approve(&authorization.user_code, "alice")
        .await?;

    let device_code = Arc::new(authorization.device_code);
    let mut handles = Vec::new();
    for _ in 0..16 {
        let resources = resources.clone();
        let device_code = device_code.clone();
        handles.push(tokio::spawn(async move {
            poll(&resources, &device_code, TEST_CLIENT_ID).await
        }));
    }

    let mut successes = 0;
    for handle in handles {
        match handle.await? {
            Ok(_) => successes += 1,
            Err(e) => assert_eq!(e.kind, GrantErrorKind::InvalidGrant),
        }
    }
    assert_eq!(successes, 1);
    Ok(())
}

#[tokio::test]
async fn test_denied_request_reports_access_denied() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start(&resources, None).await;
    resources
        .oauth_server
        .device_grant()
        .deny(&authorization.user_code)
        .await?;

    assert_eq!(
        kind(poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await),
        GrantErrorKind::AccessDenied
    );
    Ok(())
}

#[tokio::test]
async fn test_decision_is_final() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start(&resources, None).await;
    let grant = resources.oauth_server.device_grant();

    grant.approve(&authorization.user_code, "alice").await?;
    assert_eq!(
        kind(grant.deny(&authorization.user_code).await),
        GrantErrorKind::InvalidRequest
    );
    assert_eq!(
        kind(grant.approve(&authorization.user_code, "bob").await),
        GrantErrorKind::InvalidRequest
    );
    Ok(())
}

#[tokio::test]
async fn test_user_code_lookup_is_normalized() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start(&resources, None).await;
    let loose = authorization.user_code.to_lowercase().replace('-', "");

    let request = resources
        .oauth_server
        .device_grant()
        .lookup_user_code(&loose)
        .await?;
    assert_eq!(request.device_code, authorization.device_code);

    assert_eq!(
        kind(
            resources
                .oauth_server
                .device_grant()
                .lookup_user_code("ZZZZ-ZZZZ")
                .await
        ),
        GrantErrorKind::InvalidGrant
    );
    Ok(())
}

#[tokio::test]
async fn test_wrong_client_and_unknown_code() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start(&resources, None).await;

    assert_eq!(
        kind(poll(&resources, &authorization.device_code, "other-client").await),
        GrantErrorKind::InvalidClient
    );
    assert_eq!(
        kind(poll(&resources, "not-a-device-code", TEST_CLIENT_ID).await),
        GrantErrorKind::InvalidGrant
    );
    Ok(())
}

#[tokio::test]
async fn test_expired_request_reports_expired_token() -> Result<()> {
    let resources = create_test_resources()?;
    let authorization = start(&resources, None).await;
    let grant = resources.oauth_server.device_grant();

    let mut request = grant
        .devices()
        .get(&authorization.device_code)
        .await?
        .expect("stored");
    request.expires_at = Utc::now() - ChronoDuration::seconds(1);
    resources
        .kv
        .set_json(
            &format!("{DEVICE_PREFIX}{}", request.device_code),
            &request,
            Duration::from_secs(60),
        )
        .await?;

    assert_eq!(
        kind(poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await),
        GrantErrorKind::ExpiredToken
    );
    assert_eq!(
        kind(grant.approve(&authorization.user_code, "alice").await),
        GrantErrorKind::ExpiredToken
    );
    Ok(())
}

#[tokio::test]
async fn test_fast_polling_slows_down_exponentially() -> Result<()> {
    let mut config = test_config();
    config.oauth.device_poll_interval_secs = 5;
    let (resources, _) = create_test_resources_with(config)?;
    let authorization = start(&resources, None).await;

    assert_eq!(
        kind(poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await),
        GrantErrorKind::AuthorizationPending
    );

    let first = poll(&resources, &authorization.device_code, TEST_CLIENT_ID)
        .await
        .expect_err("too fast");
    assert_eq!(first.kind, GrantErrorKind::SlowDown);
    assert_eq!(first.retry_after, Some(10));

    let second = poll(&resources, &authorization.device_code, TEST_CLIENT_ID)
        .await
        .expect_err("still too fast");
    assert_eq!(second.kind, GrantErrorKind::SlowDown);
    assert_eq!(second.retry_after, Some(40));

    let stored = resources
        .oauth_server
        .device_grant()
        .devices()
        .get(&authorization.device_code)
        .await?
        .expect("stored");
    assert_eq!(stored.polling_violations, 2);
    assert_eq!(stored.polling_interval, 40);
    Ok(())
}

#[tokio::test]
async fn test_slow_down_interval_stops_at_ceiling() -> Result<()> {
    let mut config = test_config();
    config.oauth.device_poll_interval_secs = 5;
    let (resources, _) = create_test_resources_with(config)?;
    let authorization = start(&resources, None).await;

    assert_eq!(
        kind(poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await),
        GrantErrorKind::AuthorizationPending
    );

    let mut intervals = Vec::new();
    for _ in 0..40 {
        let err = poll(&resources, &authorization.device_code, TEST_CLIENT_ID)
            .await
            .expect_err("too fast");
        assert_eq!(err.kind, GrantErrorKind::SlowDown);
        intervals.push(err.retry_after.expect("interval"));
    }

    assert_eq!(&intervals[..3], &[10, 40, MAX_POLL_INTERVAL_SECS]);
    assert!(intervals.iter().all(|i| *i <= MAX_POLL_INTERVAL_SECS));
    assert_eq!(intervals.last().copied(), Some(MAX_POLL_INTERVAL_SECS));

    let stored = resources
        .oauth_server
        .device_grant()
        .devices()
        .get(&authorization.device_code)
        .await?
        .expect("stored");
    assert_eq!(stored.polling_violations, 40);
    assert_eq!(stored.polling_interval, MAX_POLL_INTERVAL_SECS);
    Ok(())
}

#[tokio::test]
async fn test_poll_racing_an_approval_never_undoes_it() -> Result<()> {
    let kv: Arc<dyn KeyValueStore> = Arc::new(SlowDeviceReads {
        inner: InMemoryStore::for_testing(),
    });
    let (resources, _) = create_test_resources_over(test_config(), kv)?;
    let authorization = start(&resources, None).await;
    let grant = resources.oauth_server.device_grant();

    let (approved, racing_poll) = tokio::join!(
        grant.approve(&authorization.user_code, "alice"),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await
        }
    );
    approved?;

    let stored = grant
        .devices()
        .get(&authorization.device_code)
        .await?
        .expect("stored");
    assert_ne!(stored.status, DeviceAuthorizationStatus::Pending);

    let follow_up = poll(&resources, &authorization.device_code, TEST_CLIENT_ID).await;
    match (&racing_poll, &follow_up) {
        (Err(pending), Ok(_)) => assert_eq!(pending.kind, GrantErrorKind::AuthorizationPending),
        (Ok(_), Err(replay)) => assert_eq!(replay.kind, GrantErrorKind::InvalidGrant),
        other => panic!("exactly one poll must issue tokens: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_authorization_flood_cannot_evict_issued_tokens() -> Result<()> {
    let mut config = test_config();
    config.kv.max_entries = 40;
    let (resources, _) = create_test_resources_with(config)?;
    let tokens = issue_device_tokens(&resources, "alice", "mcp:read").await?;

    let mut refused = 0;
    for _ in 0..30 {
        let result = resources
            .oauth_server
            .device_authorization(DeviceAuthorizationRequestBody {
                client_id: TEST_CLIENT_ID.to_owned(),
                scope: None,
            })
            .await;
        if let Err(e) = result {
            assert_eq!(e.kind, GrantErrorKind::ServerError);
            refused += 1;
        }
    }
    assert!(refused > 0);

    let record = resources
        .oauth_server
        .device_grant()
        .validate_access_token(&tokens.access_token)
        .await?;
    assert_eq!(record.map(|r| r.user_id), Some("alice".to_owned()));
    Ok(())
}
