// ABOUTME: Periodic sweep removing expired tokens and device authorizations
// ABOUTME: Runs as a background tokio task and on demand, reporting what it removed
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::device_store::{DeviceAuthStore, DeviceAuthorizationRequest};
use super::tokens::{AccessTokenRecord, RefreshTokenRecord, TokenStore};
use crate::constants::kv::{ACCESS_TOKEN_PREFIX, REFRESH_TOKEN_PREFIX};
use crate::errors::AppResult;
use crate::store::{KeyValueStore, KeyValueStoreExt};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Counts of records removed by one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Expired access tokens
    pub access_tokens: usize,
    /// Expired refresh tokens
    pub refresh_tokens: usize,
    /// Expired device authorizations
    pub device_authorizations: usize,
}

impl CleanupReport {
    /// Total records removed
    #[must_use]
    pub const fn total(&self) -> usize {
        self.access_tokens + self.refresh_tokens + self.device_authorizations
    }
}

/// Sweeps records whose `expires_at` has passed
///
/// Store TTLs already evict most records; the sweep catches records whose TTL outlives
/// their logical expiry and keeps family sets free of dead hashes.
pub struct TokenCleanup {
    tokens: Arc<TokenStore>,
    devices: DeviceAuthStore,
}

impl TokenCleanup {
    /// Create a sweeper over the token and device stores
    #[must_use]
    pub fn new(tokens: Arc<TokenStore>) -> Self {
        let devices = DeviceAuthStore::new(tokens.kv().clone());
        Self { tokens, devices }
    }

    /// Run one sweep
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails; unreadable records are skipped
    pub async fn run_once(&self) -> AppResult<CleanupReport> {
        let kv = self.tokens.kv();
        let now = Utc::now();
        let mut report = CleanupReport::default();

        for key in kv.keys_with_prefix(ACCESS_TOKEN_PREFIX).await? {
            match kv.get_json::<AccessTokenRecord>(&key).await {
                Ok(Some(record)) if record.expires_at <= now => {
                    if kv.delete(&key).await? {
                        report.access_tokens += 1;
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable access token record: {}", e.message),
            }
        }

        for key in kv.keys_with_prefix(REFRESH_TOKEN_PREFIX).await? {
            match kv.get_json::<RefreshTokenRecord>(&key).await {
                Ok(Some(record)) if record.expires_at <= now => {
                    self.tokens.delete_refresh_token(&record).await?;
                    report.refresh_tokens += 1;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable refresh token record: {}", e.message),
            }
        }

        for device_code in self.devices.device_codes().await? {
            match self.devices.get(&device_code).await {
                Ok(Some(request)) if Self::device_expired(&request) => {
                    self.devices.delete(&request).await?;
                    report.device_authorizations += 1;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Skipping unreadable device record: {}", e.message),
            }
        }

        if report.total() > 0 {
            tracing::info!(
                access_tokens = report.access_tokens,
                refresh_tokens = report.refresh_tokens,
                device_authorizations = report.device_authorizations,
                "Token cleanup sweep removed expired records"
            );
        }
        Ok(report)
    }

    /// Issued requests stay for their grace window even though the codes lapsed
    fn device_expired(request: &DeviceAuthorizationRequest) -> bool {
        request.access_token_hash.is_none() && request.is_expired()
    }

    /// Spawn the periodic sweep
    #[must_use]
    pub fn spawn(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!("Token cleanup sweep failed: {e}");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth2_server::tokens::FamilyLink;
    use crate::store::InMemoryStore;
    use chrono::Duration as ChronoDuration;

    #[tokio::test]
    async fn test_sweep_removes_logically_expired_tokens() -> AppResult<()> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::for_testing());
        let tokens = Arc::new(TokenStore::new(kv));
        let issued = tokens
            .issue_token_pair("user-1", "mcp-client", &[], FamilyLink::New)
            .await?;

        let mut access = issued.access.clone();
        access.expires_at = Utc::now() - ChronoDuration::seconds(1);
        tokens.store_access_token(&access).await?;
        let mut refresh = issued.refresh.clone();
        refresh.expires_at = Utc::now() - ChronoDuration::seconds(1);
        tokens.store_refresh_token(&refresh).await?;

        let report = TokenCleanup::new(tokens.clone()).run_once().await?;
        assert_eq!(report.access_tokens, 1);
        assert_eq!(report.refresh_tokens, 1);
        assert!(tokens
            .family_members(&refresh.rotation_family_id)
            .await?
            .is_empty());
        Ok(())
    }
}
