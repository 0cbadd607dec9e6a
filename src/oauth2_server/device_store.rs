// ABOUTME: Device authorization request persistence keyed by device code and user code
// ABOUTME: Decisions and polling bookkeeping live in their own keys so no writer clobbers another
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! The request record is written once at creation and once more at issuance. The
//! approve/deny decision is a set-if-absent claim under its own key and polling
//! bookkeeping is a separate key, so neither can overwrite the other.

use crate::constants::kv::{
    DEVICE_DECISION_PREFIX, DEVICE_ISSUED_PREFIX, DEVICE_POLL_PREFIX, DEVICE_PREFIX,
    DEVICE_USER_CODE_PREFIX,
};
use crate::errors::{AppError, AppResult};
use crate::store::{KeyValueStore, KeyValueStoreExt};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle state of a device authorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAuthorizationStatus {
    /// Waiting for the user
    Pending,
    /// User approved; tokens not yet collected
    Approved,
    /// User refused
    Denied,
    /// Tokens handed to the device; the code is spent
    TokenIssued,
}

impl fmt::Display for DeviceAuthorizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::TokenIssued => "token_issued",
        })
    }
}

/// Stored RFC 8628 authorization request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceAuthorizationRequest {
    /// Secret polled by the device
    pub device_code: String,
    /// Code typed by the user
    pub user_code: String,
    /// Requesting client
    pub client_id: String,
    /// Space-separated granted scopes
    pub scope: String,
    /// Lifecycle state
    pub status: DeviceAuthorizationStatus,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Hard expiry of both codes
    pub expires_at: DateTime<Utc>,
    /// Last accepted or penalised poll
    pub last_poll_at: Option<DateTime<Utc>>,
    /// Polls that arrived faster than the interval
    pub polling_violations: u32,
    /// Current minimum polling interval in seconds
    pub polling_interval: u64,
    /// Approving user
    pub user_id: Option<String>,
    /// Hash of the access token issued for this request
    pub access_token_hash: Option<String>,
}

impl DeviceAuthorizationRequest {
    /// Whether the request is past its expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }

    /// Scopes as a list
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.scope.split_whitespace().map(str::to_owned).collect()
    }
}

/// The user's answer to a device authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDecision {
    /// `Approved` or `Denied`
    pub status: DeviceAuthorizationStatus,
    /// Approving user
    pub user_id: Option<String>,
    /// When the decision was recorded
    pub decided_at: DateTime<Utc>,
}

/// Interval enforcement state of a device code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollState {
    /// Last accepted or penalised poll
    pub last_poll_at: DateTime<Utc>,
    /// Polls that arrived faster than the interval
    pub violations: u32,
    /// Current minimum polling interval in seconds
    pub interval: u64,
}

/// Persists device authorization requests
pub struct DeviceAuthStore {
    store: Arc<dyn KeyValueStore>,
}

impl DeviceAuthStore {
    /// Wrap the shared key-value store
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn device_key(device_code: &str) -> String {
        format!("{DEVICE_PREFIX}{device_code}")
    }

    fn user_code_key(user_code: &str) -> String {
        format!("{DEVICE_USER_CODE_PREFIX}{user_code}")
    }

    fn decision_key(device_code: &str) -> String {
        format!("{DEVICE_DECISION_PREFIX}{device_code}")
    }

    fn poll_key(device_code: &str) -> String {
        format!("{DEVICE_POLL_PREFIX}{device_code}")
    }

    /// Claim both codes of a new request
    ///
    /// Returns `false` if either code is already taken; in that case nothing claimed by
    /// this call is left behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails
    pub async fn claim(&self, request: &DeviceAuthorizationRequest, ttl: Duration) -> AppResult<bool> {
        let device_key = Self::device_key(&request.device_code);
        if !self.store.set_json_if_absent(&device_key, request, ttl).await? {
            return Ok(false);
        }

        let user_claimed = self
            .store
            .set_if_absent(
                &Self::user_code_key(&request.user_code),
                request.device_code.as_bytes().to_vec(),
                ttl,
            )
            .await;
        match user_claimed {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.store.delete(&device_key).await?;
                Ok(false)
            }
            Err(e) => {
                self.store.delete(&device_key).await?;
                Err(e)
            }
        }
    }

    /// Fetch by device code with the recorded decision and polling state applied
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails or a record is corrupt
    pub async fn get(&self, device_code: &str) -> AppResult<Option<DeviceAuthorizationRequest>> {
        let Some(mut request) = self
            .store
            .get_json::<DeviceAuthorizationRequest>(&Self::device_key(device_code))
            .await?
        else {
            return Ok(None);
        };

        if request.status == DeviceAuthorizationStatus::Pending {
            if let Some(decision) = self.decision(device_code).await? {
                request.status = decision.status;
                request.user_id = decision.user_id;
            }
        }
        if let Some(poll) = self.poll_state(device_code).await? {
            request.last_poll_at = Some(poll.last_poll_at);
            request.polling_violations = poll.violations;
            request.polling_interval = poll.interval;
        }
        Ok(Some(request))
    }

    /// The recorded decision, if any
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails or the record is corrupt
    pub async fn decision(&self, device_code: &str) -> AppResult<Option<DeviceDecision>> {
        self.store.get_json(&Self::decision_key(device_code)).await
    }

    /// Record the decision unless one already exists
    ///
    /// Returns `Ok(None)` when this call's decision was stored, `Ok(Some(existing))` when
    /// another decision got there first. Fails with `not_found` once the request has
    /// expired out of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails or the request is gone
    pub async fn record_decision(
        &self,
        device_code: &str,
        decision: &DeviceDecision,
    ) -> AppResult<Option<DeviceDecision>> {
        let Some(remaining) = self.store.ttl(&Self::device_key(device_code)).await? else {
            return Err(AppError::not_found("Device authorization"));
        };
        let key = Self::decision_key(device_code);
        if self.store.set_json_if_absent(&key, decision, remaining).await? {
            return Ok(None);
        }
        // an absent winner expired together with the request
        let existing = self
            .store
            .get_json(&key)
            .await?
            .ok_or_else(|| AppError::not_found("Device authorization"))?;
        Ok(Some(existing))
    }

    async fn poll_state(&self, device_code: &str) -> AppResult<Option<PollState>> {
        self.store.get_json(&Self::poll_key(device_code)).await
    }

    /// Store polling bookkeeping for the rest of the request's lifetime
    ///
    /// Returns `false` when the request has already expired out of the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails
    pub async fn save_poll_state(&self, device_code: &str, poll: &PollState) -> AppResult<bool> {
        let Some(remaining) = self.store.ttl(&Self::device_key(device_code)).await? else {
            return Ok(false);
        };
        self.store
            .set_json(&Self::poll_key(device_code), poll, remaining)
            .await?;
        Ok(true)
    }

    /// Fetch by user code
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails or the record is corrupt
    pub async fn get_by_user_code(
        &self,
        user_code: &str,
    ) -> AppResult<Option<DeviceAuthorizationRequest>> {
        let Some(bytes) = self.store.get(&Self::user_code_key(user_code)).await? else {
            return Ok(None);
        };
        let device_code = String::from_utf8(bytes)
            .map_err(|e| AppError::serialization(format!("User code index is not UTF-8: {e}")))?;
        self.get(&device_code).await
    }

    /// Claim the single right to issue tokens for a device code
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn claim_issuance(&self, device_code: &str, grace: Duration) -> AppResult<bool> {
        self.store
            .set_if_absent(
                &format!("{DEVICE_ISSUED_PREFIX}{device_code}"),
                b"1".to_vec(),
                grace,
            )
            .await
    }

    /// Record issuance: keep the record for `grace` and release the user code
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails
    pub async fn mark_token_issued(
        &self,
        request: &DeviceAuthorizationRequest,
        grace: Duration,
    ) -> AppResult<()> {
        self.store
            .set_json(&Self::device_key(&request.device_code), request, grace)
            .await?;
        self.store
            .delete(&Self::user_code_key(&request.user_code))
            .await?;
        Ok(())
    }

    /// Remove every key of a request
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails
    pub async fn delete(&self, request: &DeviceAuthorizationRequest) -> AppResult<()> {
        self.store.delete(&Self::device_key(&request.device_code)).await?;
        self.store
            .delete(&Self::user_code_key(&request.user_code))
            .await?;
        self.store
            .delete(&Self::decision_key(&request.device_code))
            .await?;
        self.store.delete(&Self::poll_key(&request.device_code)).await?;
        Ok(())
    }

    /// Device codes currently stored
    ///
    /// # Errors
    ///
    /// Returns an error if the store scan fails
    pub async fn device_codes(&self) -> AppResult<Vec<String>> {
        Ok(self
            .store
            .keys_with_prefix(DEVICE_PREFIX)
            .await?
            .into_iter()
            .filter_map(|key| key.strip_prefix(DEVICE_PREFIX).map(str::to_owned))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use chrono::Duration as ChronoDuration;

    fn request(device_code: &str, user_code: &str) -> DeviceAuthorizationRequest {
        let now = Utc::now();
        DeviceAuthorizationRequest {
            device_code: device_code.to_owned(),
            user_code: user_code.to_owned(),
            client_id: "mcp-client".to_owned(),
            scope: "mcp:read".to_owned(),
            status: DeviceAuthorizationStatus::Pending,
            created_at: now,
            expires_at: now + ChronoDuration::seconds(600),
            last_poll_at: None,
            polling_violations: 0,
            polling_interval: 5,
            user_id: None,
            access_token_hash: None,
        }
    }

    #[tokio::test]
    async fn test_claim_releases_device_key_when_user_code_taken() -> AppResult<()> {
        let store = DeviceAuthStore::new(Arc::new(InMemoryStore::for_testing()));
        let ttl = Duration::from_secs(600);

        assert!(store.claim(&request("dc-1", "BCDF-GHJK"), ttl).await?);
        assert!(!store.claim(&request("dc-2", "BCDF-GHJK"), ttl).await?);
        assert!(store.get("dc-2").await?.is_none());

        let by_user = store.get_by_user_code("BCDF-GHJK").await?;
        assert_eq!(by_user.map(|r| r.device_code), Some("dc-1".to_owned()));
        Ok(())
    }

    fn decision(status: DeviceAuthorizationStatus, user_id: Option<&str>) -> DeviceDecision {
        DeviceDecision {
            status,
            user_id: user_id.map(str::to_owned),
            decided_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_first_decision_wins() -> AppResult<()> {
        let store = DeviceAuthStore::new(Arc::new(InMemoryStore::for_testing()));
        assert!(store.claim(&request("dc-1", "BCDF-GHJK"), Duration::from_secs(600)).await?);

        let approve = decision(DeviceAuthorizationStatus::Approved, Some("alice"));
        let deny = decision(DeviceAuthorizationStatus::Denied, None);
        assert!(store.record_decision("dc-1", &approve).await?.is_none());
        let existing = store.record_decision("dc-1", &deny).await?;
        assert_eq!(existing.map(|d| d.status), Some(DeviceAuthorizationStatus::Approved));

        let merged = store.get("dc-1").await?.map(|r| (r.status, r.user_id));
        assert_eq!(
            merged,
            Some((DeviceAuthorizationStatus::Approved, Some("alice".to_owned())))
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_poll_state_never_touches_the_decision() -> AppResult<()> {
        let kv: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::for_testing());
        let store = DeviceAuthStore::new(kv.clone());
        assert!(store.claim(&request("dc-1", "BCDF-GHJK"), Duration::from_secs(100)).await?);

        let approve = decision(DeviceAuthorizationStatus::Approved, Some("alice"));
        assert!(store.record_decision("dc-1", &approve).await?.is_none());
        let poll = PollState {
            last_poll_at: Utc::now(),
            violations: 1,
            interval: 10,
        };
        assert!(store.save_poll_state("dc-1", &poll).await?);

        let merged = store.get("dc-1").await?;
        assert_eq!(merged.as_ref().map(|r| r.status), Some(DeviceAuthorizationStatus::Approved));
        assert_eq!(merged.map(|r| r.polling_interval), Some(10));

        // bookkeeping expires with the request
        let remaining = kv.ttl("device_poll:dc-1").await?.unwrap_or_default();
        assert!(remaining <= Duration::from_secs(100));
        assert!(remaining > Duration::from_secs(90));
        Ok(())
    }

    #[tokio::test]
    async fn test_decision_requires_a_live_request() {
        let store = DeviceAuthStore::new(Arc::new(InMemoryStore::for_testing()));
        let approve = decision(DeviceAuthorizationStatus::Approved, Some("alice"));
        assert!(store.record_decision("missing", &approve).await.is_err());
    }
}
