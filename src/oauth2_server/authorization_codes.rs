// ABOUTME: Short-lived PKCE-bound authorization codes for the redirect flow
// ABOUTME: Codes live in the injected key-value store and redeem exactly once
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::codes::generate_token;
use crate::constants::kv::{AUTH_CODE_PREFIX, AUTH_CODE_USED_PREFIX};
use crate::constants::oauth::{AUTHORIZATION_CODE_TTL_SECS, CODE_GENERATION_ATTEMPTS};
use crate::errors::{AppError, AppResult, GrantError};
use crate::store::{KeyValueStore, KeyValueStoreExt};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Stored authorization code grant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationCode {
    /// Authorizing user
    pub user_id: String,
    /// Client the code was issued to
    pub client_id: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// S256 PKCE challenge
    pub code_challenge: String,
    /// Redirect URI the code was sent to
    pub redirect_uri: String,
    /// Resource indicator
    pub resource: String,
    /// Client state echoed on redirect
    pub state: Option<String>,
    /// Whether the code has been redeemed
    pub used: bool,
    /// Issue time
    pub created_at: DateTime<Utc>,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
}

/// Fields supplied when issuing a code
#[derive(Debug, Clone)]
pub struct NewAuthorizationCode {
    /// Authorizing user
    pub user_id: String,
    /// Client identifier
    pub client_id: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// S256 PKCE challenge
    pub code_challenge: String,
    /// Redirect URI
    pub redirect_uri: String,
    /// Resource indicator
    pub resource: String,
    /// Client state
    pub state: Option<String>,
}

/// Issues and redeems authorization codes
pub struct AuthorizationCodeStore {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl AuthorizationCodeStore {
    /// Store with the standard ten-minute code lifetime
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_ttl(store, Duration::from_secs(AUTHORIZATION_CODE_TTL_SECS))
    }

    /// Store with a custom code lifetime
    #[must_use]
    pub const fn with_ttl(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a new code
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG or store fails, or no unique code could be claimed
    pub async fn issue(&self, grant: NewAuthorizationCode) -> AppResult<String> {
        let now = Utc::now();
        let record = AuthorizationCode {
            user_id: grant.user_id,
            client_id: grant.client_id,
            scopes: grant.scopes,
            code_challenge: grant.code_challenge,
            redirect_uri: grant.redirect_uri,
            resource: grant.resource,
            state: grant.state,
            used: false,
            created_at: now,
            expires_at: now
                + ChronoDuration::from_std(self.ttl).unwrap_or_else(|_| ChronoDuration::seconds(0)),
        };

        for _ in 0..CODE_GENERATION_ATTEMPTS {
            let code = generate_token()?;
            if self
                .store
                .set_json_if_absent(&format!("{AUTH_CODE_PREFIX}{code}"), &record, self.ttl)
                .await?
            {
                tracing::debug!(client_id = %record.client_id, "Issued authorization code");
                return Ok(code);
            }
        }

        Err(AppError::internal(
            "Could not allocate a unique authorization code",
        ))
    }

    /// Redeem a code exactly once
    ///
    /// The redemption marker is claimed before anything else is checked, so a failed
    /// exchange still burns the code.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` for unknown, expired or already redeemed codes and
    /// `server_error` if the store fails
    pub async fn consume(&self, code: &str) -> Result<AuthorizationCode, GrantError> {
        let key = format!("{AUTH_CODE_PREFIX}{code}");

        let first_use = self
            .store
            .set_if_absent(&format!("{AUTH_CODE_USED_PREFIX}{code}"), b"1".to_vec(), self.ttl)
            .await?;
        if !first_use {
            tracing::warn!("Authorization code replay rejected");
            return Err(GrantError::invalid_grant("Authorization code already used"));
        }

        let mut record: AuthorizationCode = self
            .store
            .get_json(&key)
            .await?
            .ok_or_else(|| GrantError::invalid_grant("Invalid or expired authorization code"))?;

        if record.used || Utc::now() >= record.expires_at {
            return Err(GrantError::invalid_grant("Invalid or expired authorization code"));
        }

        record.used = true;
        if let Some(remaining) = self.store.ttl(&key).await? {
            self.store.set_json(&key, &record, remaining).await?;
        }

        Ok(record)
    }
}
