// ABOUTME: Hash-keyed persistence of access and refresh tokens with rotation families
// ABOUTME: Plaintext tokens are returned once at minting and never written to the store
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Token Store
//!
//! Every record is keyed by the SHA-256 hash of its token. Refresh tokens belong to a
//! rotation family tracked as a set of hashes under `family:{id}`; revoking a family
//! marks each member revoked, deletes their access tokens and leaves a
//! `family_revoked:{id}` marker that access-token validation also consults, so access
//! tokens minted by earlier rotations die with the lineage.

use super::codes::{generate_token, hash_token};
use crate::constants::kv::{
    ACCESS_TOKEN_PREFIX, FAMILY_PREFIX, FAMILY_REVOKED_PREFIX, REFRESH_CLAIM_PREFIX,
    REFRESH_TOKEN_PREFIX,
};
use crate::constants::oauth::{
    ACCESS_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS, REVOKED_TOKEN_RETENTION_SECS,
    TOKEN_TYPE_BEARER,
};
use crate::errors::{AppError, AppResult};
use crate::logging::hash_prefix;
use crate::store::{KeyValueStore, KeyValueStoreExt};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Stored access token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRecord {
    /// SHA-256 hex of the token bytes
    pub access_token_hash: String,
    /// Owner
    pub user_id: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes
    pub scopes: Vec<String>,
    /// Family of the refresh token minted alongside
    pub rotation_family_id: String,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Mint time
    pub created_at: DateTime<Utc>,
}

impl AccessTokenRecord {
    /// Whether the token is past its expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// Why a refresh token stopped being usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    /// Exchanged for a successor
    Rotated,
    /// Its family was revoked after reuse of a consumed token
    BreachDetected,
    /// Revoked through the revocation endpoint
    ClientRevoked,
}

impl RevocationReason {
    /// Wire name of the reason
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rotated => "rotated",
            Self::BreachDetected => "breach_detected",
            Self::ClientRevoked => "client_revoked",
        }
    }
}

/// Stored refresh token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// SHA-256 hex of the token bytes
    pub refresh_token_hash: String,
    /// Access token minted in the same pair
    pub access_token_hash: String,
    /// Owner
    pub user_id: String,
    /// Client the token was issued to
    pub client_id: String,
    /// Granted scopes, carried across rotations
    pub scopes: Vec<String>,
    /// Lineage identifier
    pub rotation_family_id: String,
    /// 0 for the original grant, +1 per rotation
    pub generation: u32,
    /// Hard expiry
    pub expires_at: DateTime<Utc>,
    /// Mint time
    pub created_at: DateTime<Utc>,
    /// When the token was exchanged
    pub used_at: Option<DateTime<Utc>>,
    /// When the token was revoked
    pub revoked_at: Option<DateTime<Utc>>,
    /// Why it was revoked
    pub revocation_reason: Option<RevocationReason>,
    /// Predecessor in the family
    pub parent_token_hash: Option<String>,
}

impl RefreshTokenRecord {
    /// Whether the token is past its expiry
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Whether the token was revoked or rotated away
    #[must_use]
    pub const fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Where a newly minted pair sits in its rotation family
#[derive(Debug, Clone)]
pub enum FamilyLink {
    /// First pair of a new grant
    New,
    /// Successor of `parent`
    Rotation {
        /// The refresh token being exchanged
        parent: RefreshTokenRecord,
    },
}

/// Freshly minted token pair; the only place plaintext tokens exist
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    /// Opaque access token
    pub access_token: String,
    /// Opaque refresh token
    pub refresh_token: String,
    /// Stored access record
    pub access: AccessTokenRecord,
    /// Stored refresh record
    pub refresh: RefreshTokenRecord,
}

impl IssuedTokens {
    /// Token type for responses
    #[must_use]
    pub const fn token_type(&self) -> &'static str {
        TOKEN_TYPE_BEARER
    }

    /// Access token lifetime in seconds
    #[must_use]
    pub const fn expires_in(&self) -> u64 {
        ACCESS_TOKEN_TTL_SECS
    }

    /// Space-separated granted scopes
    #[must_use]
    pub fn scope(&self) -> String {
        self.access.scopes.join(" ")
    }
}

/// Store-side lifetime for a record expiring at `expires_at`
fn ttl_until(expires_at: DateTime<Utc>) -> Duration {
    (expires_at - Utc::now())
        .to_std()
        .unwrap_or(Duration::ZERO)
        .max(Duration::from_secs(1))
}

/// Persists access/refresh token records and rotation-family membership
pub struct TokenStore {
    store: Arc<dyn KeyValueStore>,
}

impl TokenStore {
    /// Wrap the shared key-value store
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// The underlying key-value store
    #[must_use]
    pub fn kv(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    /// Mint an access/refresh pair and persist both records
    ///
    /// The refresh record joins the family before this returns, so a concurrent family
    /// revocation either sees it or leaves a marker the caller can check afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG or the store fails
    pub async fn issue_token_pair(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &[String],
        link: FamilyLink,
    ) -> AppResult<IssuedTokens> {
        let access_token = generate_token()?;
        let refresh_token = generate_token()?;
        let access_token_hash = hash_token(&access_token)
            .ok_or_else(|| AppError::internal("Generated access token is not base64url"))?;
        let refresh_token_hash = hash_token(&refresh_token)
            .ok_or_else(|| AppError::internal("Generated refresh token is not base64url"))?;

        let (rotation_family_id, generation, parent_token_hash) = match link {
            FamilyLink::New => (Uuid::new_v4().to_string(), 0, None),
            FamilyLink::Rotation { parent } => (
                parent.rotation_family_id,
                parent.generation.saturating_add(1),
                Some(parent.refresh_token_hash),
            ),
        };

        let now = Utc::now();
        let access = AccessTokenRecord {
            access_token_hash: access_token_hash.clone(),
            user_id: user_id.to_owned(),
            client_id: client_id.to_owned(),
            scopes: scopes.to_vec(),
            rotation_family_id: rotation_family_id.clone(),
            expires_at: now + ChronoDuration::seconds(ACCESS_TOKEN_TTL_SECS as i64),
            created_at: now,
        };
        let refresh = RefreshTokenRecord {
            refresh_token_hash,
            access_token_hash,
            user_id: user_id.to_owned(),
            client_id: client_id.to_owned(),
            scopes: scopes.to_vec(),
            rotation_family_id,
            generation,
            expires_at: now + ChronoDuration::seconds(REFRESH_TOKEN_TTL_SECS as i64),
            created_at: now,
            used_at: None,
            revoked_at: None,
            revocation_reason: None,
            parent_token_hash,
        };

        self.store_access_token(&access).await?;
        self.store_refresh_token(&refresh).await?;

        tracing::debug!(
            family = %refresh.rotation_family_id,
            generation = refresh.generation,
            access = %hash_prefix(&access.access_token_hash),
            refresh = %hash_prefix(&refresh.refresh_token_hash),
            "Minted token pair"
        );

        Ok(IssuedTokens {
            access_token,
            refresh_token,
            access,
            refresh,
        })
    }

    /// Persist an access token record until its expiry
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn store_access_token(&self, record: &AccessTokenRecord) -> AppResult<()> {
        self.store
            .set_json(
                &format!("{ACCESS_TOKEN_PREFIX}{}", record.access_token_hash),
                record,
                ttl_until(record.expires_at),
            )
            .await
    }

    /// Look up an access token record by hash
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn get_access_token(&self, hash: &str) -> AppResult<Option<AccessTokenRecord>> {
        self.store
            .get_json(&format!("{ACCESS_TOKEN_PREFIX}{hash}"))
            .await
    }

    /// Delete an access token record
    ///
    /// # Errors
    ///
    /// Returns an error if the store delete fails
    pub async fn delete_access_token(&self, hash: &str) -> AppResult<bool> {
        self.store
            .delete(&format!("{ACCESS_TOKEN_PREFIX}{hash}"))
            .await
    }

    /// Resolve a presented access token to a live record
    ///
    /// Rejects unknown, expired and family-revoked tokens alike.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn validate_access_token(&self, token: &str) -> AppResult<Option<AccessTokenRecord>> {
        let Some(hash) = hash_token(token) else {
            return Ok(None);
        };
        let Some(record) = self.get_access_token(&hash).await? else {
            return Ok(None);
        };
        if record.is_expired() || self.is_family_revoked(&record.rotation_family_id).await? {
            return Ok(None);
        }
        Ok(Some(record))
    }

    /// Persist a refresh record and add it to its family
    ///
    /// # Errors
    ///
    /// Returns an error if a store write fails
    pub async fn store_refresh_token(&self, record: &RefreshTokenRecord) -> AppResult<()> {
        let ttl = ttl_until(record.expires_at);
        self.store
            .set_json(
                &format!("{REFRESH_TOKEN_PREFIX}{}", record.refresh_token_hash),
                record,
                ttl,
            )
            .await?;
        self.store
            .set_add(
                &format!("{FAMILY_PREFIX}{}", record.rotation_family_id),
                &record.refresh_token_hash,
                Duration::from_secs(REFRESH_TOKEN_TTL_SECS),
            )
            .await
    }

    /// Look up a refresh token record by hash
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn get_refresh_token(&self, hash: &str) -> AppResult<Option<RefreshTokenRecord>> {
        self.store
            .get_json(&format!("{REFRESH_TOKEN_PREFIX}{hash}"))
            .await
    }

    /// Delete a refresh token record and its family membership
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails
    pub async fn delete_refresh_token(&self, record: &RefreshTokenRecord) -> AppResult<()> {
        self.store
            .delete(&format!("{REFRESH_TOKEN_PREFIX}{}", record.refresh_token_hash))
            .await?;
        self.remove_family_member(&record.rotation_family_id, &record.refresh_token_hash)
            .await
    }

    /// Claim the single right to rotate a refresh token
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn claim_refresh_token(&self, hash: &str) -> AppResult<bool> {
        self.store
            .set_if_absent(
                &format!("{REFRESH_CLAIM_PREFIX}{hash}"),
                b"1".to_vec(),
                Duration::from_secs(REVOKED_TOKEN_RETENTION_SECS),
            )
            .await
    }

    /// Soft-revoke a refresh token, keeping it for the reuse-detection window
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn mark_refresh_revoked(
        &self,
        record: &RefreshTokenRecord,
        reason: RevocationReason,
    ) -> AppResult<()> {
        let now = Utc::now();
        let mut revoked = record.clone();
        revoked.revoked_at = Some(now);
        revoked.revocation_reason = Some(reason);
        if reason == RevocationReason::Rotated {
            revoked.used_at = Some(now);
        }

        self.store
            .set_json(
                &format!("{REFRESH_TOKEN_PREFIX}{}", record.refresh_token_hash),
                &revoked,
                Duration::from_secs(REVOKED_TOKEN_RETENTION_SECS),
            )
            .await
    }

    /// Hashes currently tracked in a family
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn family_members(&self, family_id: &str) -> AppResult<Vec<String>> {
        self.store
            .set_members(&format!("{FAMILY_PREFIX}{family_id}"))
            .await
    }

    /// Drop a hash from a family
    ///
    /// # Errors
    ///
    /// Returns an error if the store write fails
    pub async fn remove_family_member(&self, family_id: &str, hash: &str) -> AppResult<()> {
        self.store
            .set_remove(&format!("{FAMILY_PREFIX}{family_id}"), hash)
            .await
    }

    /// Whether the family has been revoked as a whole
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn is_family_revoked(&self, family_id: &str) -> AppResult<bool> {
        Ok(self
            .store
            .get(&format!("{FAMILY_REVOKED_PREFIX}{family_id}"))
            .await?
            .is_some())
    }

    /// Revoke every token in a family
    ///
    /// Sets the family marker first so tokens minted concurrently are caught by the
    /// post-rotation check, then revokes each member and deletes its access token.
    /// Returns the number of refresh tokens revoked.
    ///
    /// # Errors
    ///
    /// Returns an error if a store operation fails
    pub async fn revoke_family(&self, family_id: &str, reason: RevocationReason) -> AppResult<usize> {
        self.store
            .set(
                &format!("{FAMILY_REVOKED_PREFIX}{family_id}"),
                reason.as_str().as_bytes().to_vec(),
                Duration::from_secs(REFRESH_TOKEN_TTL_SECS),
            )
            .await?;

        let mut revoked = 0;
        for hash in self.family_members(family_id).await? {
            let Some(record) = self.get_refresh_token(&hash).await? else {
                continue;
            };
            self.delete_access_token(&record.access_token_hash).await?;
            if !record.is_revoked() {
                self.mark_refresh_revoked(&record, reason).await?;
                revoked += 1;
            }
        }

        tracing::warn!(
            family = %family_id,
            reason = reason.as_str(),
            revoked,
            "Revoked refresh token family"
        );
        Ok(revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    fn token_store() -> TokenStore {
        TokenStore::new(Arc::new(InMemoryStore::for_testing()))
    }

    #[tokio::test]
    async fn test_issue_stores_hashes_only() -> AppResult<()> {
        let store = token_store();
        let scopes = vec!["mcp:read".to_owned()];
        let issued = store
            .issue_token_pair("user-1", "mcp-client", &scopes, FamilyLink::New)
            .await?;

        assert!(store.get_access_token(&issued.access_token).await?.is_none());
        let access = store.validate_access_token(&issued.access_token).await?;
        assert_eq!(access.map(|a| a.user_id), Some("user-1".to_owned()));

        let members = store.family_members(&issued.refresh.rotation_family_id).await?;
        assert_eq!(members, vec![issued.refresh.refresh_token_hash.clone()]);
        Ok(())
    }

    #[tokio::test]
    async fn test_family_revocation_kills_access_tokens() -> AppResult<()> {
        let store = token_store();
        let issued = store
            .issue_token_pair("user-1", "mcp-client", &[], FamilyLink::New)
            .await?;

        let count = store
            .revoke_family(&issued.refresh.rotation_family_id, RevocationReason::ClientRevoked)
            .await?;
        assert_eq!(count, 1);
        assert!(store.validate_access_token(&issued.access_token).await?.is_none());

        let refresh = store
            .get_refresh_token(&issued.refresh.refresh_token_hash)
            .await?;
        assert!(refresh.is_some_and(|r| r.is_revoked()));
        Ok(())
    }
}
