// ABOUTME: Refresh token rotation with family-wide revocation on reuse
// ABOUTME: A consumed refresh token presented again revokes every token in its lineage
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Refresh Token Rotation
//!
//! Each refresh token is exchangeable once. The exchange is serialised by an atomic
//! claim on `refresh_claim:{hash}`; the loser of a concurrent exchange is treated
//! exactly like a replay. The successor is stored before the predecessor is marked
//! rotated, so no reader ever sees the old token dead without the new one in place.

use super::codes::hash_token;
use super::tokens::{FamilyLink, IssuedTokens, RefreshTokenRecord, RevocationReason, TokenStore};
use crate::errors::{AppResult, GrantError};
use crate::logging::{hash_prefix, AppLogger};
use std::sync::Arc;

/// Outcome of a revocation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationOutcome {
    /// A refresh token matched; its family was revoked
    FamilyRevoked {
        /// Refresh tokens newly revoked
        revoked: usize,
    },
    /// An access token matched and was deleted
    AccessTokenRevoked,
    /// Nothing matched
    Unknown,
}

/// Rotates refresh tokens and revokes families
pub struct TokenRotationEngine {
    tokens: Arc<TokenStore>,
}

impl TokenRotationEngine {
    /// Create an engine over the token store
    #[must_use]
    pub const fn new(tokens: Arc<TokenStore>) -> Self {
        Self { tokens }
    }

    /// Exchange a refresh token for a new pair
    ///
    /// When `client_id` is given it must match the client the token was issued to.
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` for unknown, expired, revoked or replayed tokens; replay
    /// additionally revokes the whole family. Store failures surface as `server_error`.
    pub async fn refresh(
        &self,
        refresh_token: &str,
        client_id: Option<&str>,
    ) -> Result<IssuedTokens, GrantError> {
        let invalid = || GrantError::invalid_grant("Invalid refresh token");

        let hash = hash_token(refresh_token).ok_or_else(invalid)?;
        let record = self
            .tokens
            .get_refresh_token(&hash)
            .await?
            .ok_or_else(invalid)?;

        if record.is_revoked() {
            self.handle_reuse(&record).await?;
            return Err(invalid());
        }
        if client_id.is_some_and(|id| id != record.client_id) {
            tracing::warn!(
                token = %hash_prefix(&hash),
                "Refresh token presented by a different client"
            );
            return Err(invalid());
        }
        if record.is_expired() || self.tokens.is_family_revoked(&record.rotation_family_id).await? {
            return Err(invalid());
        }

        if !self.tokens.claim_refresh_token(&hash).await? {
            // Lost a race with a concurrent exchange of the same token
            self.handle_reuse(&record).await?;
            return Err(invalid());
        }

        let issued = self
            .tokens
            .issue_token_pair(
                &record.user_id,
                &record.client_id,
                &record.scopes,
                FamilyLink::Rotation {
                    parent: record.clone(),
                },
            )
            .await?;

        self.tokens
            .mark_refresh_revoked(&record, RevocationReason::Rotated)
            .await?;
        self.tokens
            .remove_family_member(&record.rotation_family_id, &hash)
            .await?;

        // A revocation that raced this rotation may have missed the new member
        if self.tokens.is_family_revoked(&record.rotation_family_id).await? {
            self.tokens
                .revoke_family(&record.rotation_family_id, RevocationReason::BreachDetected)
                .await?;
            return Err(invalid());
        }

        tracing::info!(
            family = %record.rotation_family_id,
            generation = issued.refresh.generation,
            "Rotated refresh token"
        );
        Ok(issued)
    }

    async fn handle_reuse(&self, record: &RefreshTokenRecord) -> AppResult<()> {
        AppLogger::log_security_event(
            "refresh_token_reuse",
            "high",
            &format!(
                "Consumed refresh token {} presented again; revoking family {}",
                hash_prefix(&record.refresh_token_hash),
                record.rotation_family_id
            ),
            Some(&record.user_id),
        );
        self.tokens
            .revoke_family(&record.rotation_family_id, RevocationReason::BreachDetected)
            .await?;
        Ok(())
    }

    /// Revoke the family of `refresh_token`
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` for unknown tokens and `server_error` on store failure
    pub async fn revoke(&self, refresh_token: &str) -> Result<usize, GrantError> {
        let hash = hash_token(refresh_token)
            .ok_or_else(|| GrantError::invalid_grant("Invalid refresh token"))?;
        let record = self
            .tokens
            .get_refresh_token(&hash)
            .await?
            .ok_or_else(|| GrantError::invalid_grant("Invalid refresh token"))?;

        Ok(self
            .tokens
            .revoke_family(&record.rotation_family_id, RevocationReason::ClientRevoked)
            .await?)
    }

    /// RFC 7009 revocation of either token type
    ///
    /// Tries the hinted type first. Unknown tokens are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails
    pub async fn revoke_any(&self, token: &str, hint: Option<&str>) -> AppResult<RevocationOutcome> {
        let Some(hash) = hash_token(token) else {
            return Ok(RevocationOutcome::Unknown);
        };

        let access_first = hint == Some("access_token");
        if access_first && self.tokens.delete_access_token(&hash).await? {
            return Ok(RevocationOutcome::AccessTokenRevoked);
        }

        if let Some(record) = self.tokens.get_refresh_token(&hash).await? {
            let revoked = self
                .tokens
                .revoke_family(&record.rotation_family_id, RevocationReason::ClientRevoked)
                .await?;
            return Ok(RevocationOutcome::FamilyRevoked { revoked });
        }

        if !access_first && self.tokens.delete_access_token(&hash).await? {
            return Ok(RevocationOutcome::AccessTokenRevoked);
        }
        Ok(RevocationOutcome::Unknown)
    }
}
