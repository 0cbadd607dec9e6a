// ABOUTME: RFC 8628 device authorization grant engine
// ABOUTME: Issues device/user codes, enforces polling intervals and exchanges approvals for tokens
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Device Authorization Grant
//!
//! A device asks for a code pair, shows the user code, and polls the token endpoint
//! while the user approves on another device. Polling state (last poll, violations,
//! current interval) lives in the shared store so every server process enforces the
//! same interval. The approve/deny decision is a first-writer-wins claim, so a poll
//! racing an approval can delay it by one interval but never undo it.

use super::codes::{generate_token, generate_user_code, normalize_user_code};
use super::device_store::{
    DeviceAuthStore, DeviceAuthorizationRequest, DeviceAuthorizationStatus, DeviceDecision,
    PollState,
};
use super::models::DeviceAuthorizationResponse;
use super::tokens::{AccessTokenRecord, FamilyLink, IssuedTokens, TokenStore};
use crate::config::OAuthServerConfig;
use crate::constants::oauth::{
    CODE_GENERATION_ATTEMPTS, DEFAULT_SCOPE, DEVICE_ISSUED_GRACE_SECS, DEVICE_SCOPES,
    MAX_POLL_INTERVAL_SECS, SLOW_DOWN_INCREMENT_SECS,
};
use crate::errors::{AppError, AppResult, ErrorCode, GrantError};
use crate::logging::AppLogger;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Device grant settings
#[derive(Debug, Clone)]
pub struct DeviceGrantConfig {
    /// The single accepted client id
    pub client_id: String,
    /// Page where users enter the code
    pub verification_uri: String,
    /// Lifetime of a device authorization
    pub code_ttl: Duration,
    /// Initial polling interval in seconds
    pub poll_interval_secs: u64,
}

impl From<&OAuthServerConfig> for DeviceGrantConfig {
    fn from(config: &OAuthServerConfig) -> Self {
        Self {
            client_id: config.client_id.clone(),
            verification_uri: config.verification_uri(),
            code_ttl: Duration::from_secs(config.device_code_ttl_secs),
            poll_interval_secs: config.device_poll_interval_secs,
        }
    }
}

/// Split a scope parameter on spaces and `+`, dropping duplicates
#[must_use]
pub fn parse_scopes(scope: Option<&str>) -> Vec<String> {
    let mut scopes: Vec<String> = Vec::new();
    for token in scope
        .unwrap_or("")
        .split(|c: char| c.is_whitespace() || c == '+')
        .filter(|s| !s.is_empty())
    {
        if !scopes.iter().any(|s| s == token) {
            scopes.push(token.to_owned());
        }
    }
    scopes
}

/// Interval imposed after the `violations`-th too-fast poll, never above
/// [`MAX_POLL_INTERVAL_SECS`]
#[must_use]
pub fn backoff_interval(interval: u64, violations: u32) -> u64 {
    let exponential = 2u64
        .checked_pow(violations)
        .map_or(u64::MAX, |factor| interval.saturating_mul(factor));
    exponential
        .max(interval.saturating_add(SLOW_DOWN_INCREMENT_SECS))
        .min(MAX_POLL_INTERVAL_SECS)
}

/// Whether a poll `elapsed` after the previous one came too early for `interval_secs`
fn polled_too_fast(elapsed: ChronoDuration, interval_secs: u64) -> bool {
    let required_ms = i64::try_from(interval_secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    elapsed.num_milliseconds() < required_ms
}

/// Orchestrates the device authorization grant
pub struct DeviceGrantEngine {
    devices: DeviceAuthStore,
    tokens: Arc<TokenStore>,
    config: DeviceGrantConfig,
}

impl DeviceGrantEngine {
    /// Create an engine over the device and token stores
    #[must_use]
    pub const fn new(devices: DeviceAuthStore, tokens: Arc<TokenStore>, config: DeviceGrantConfig) -> Self {
        Self {
            devices,
            tokens,
            config,
        }
    }

    /// Settings in effect
    #[must_use]
    pub const fn config(&self) -> &DeviceGrantConfig {
        &self.config
    }

    /// Device request persistence
    #[must_use]
    pub const fn devices(&self) -> &DeviceAuthStore {
        &self.devices
    }

    /// Check the client id and that every requested scope is supported
    ///
    /// An absent or empty scope grants the default scope.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` or `invalid_scope`
    pub fn validate_client_and_scope(
        &self,
        client_id: &str,
        scope: Option<&str>,
    ) -> Result<Vec<String>, GrantError> {
        if client_id != self.config.client_id {
            return Err(GrantError::invalid_client(format!(
                "Unknown client_id '{client_id}'"
            )));
        }

        let scopes = parse_scopes(scope);
        if scopes.is_empty() {
            return Ok(vec![DEFAULT_SCOPE.to_owned()]);
        }
        if let Some(unsupported) = scopes.iter().find(|s| !DEVICE_SCOPES.contains(&s.as_str())) {
            return Err(GrantError::invalid_scope(format!(
                "Scope '{unsupported}' is not supported"
            )));
        }
        Ok(scopes)
    }

    /// Create and persist a new device authorization
    ///
    /// # Errors
    ///
    /// Returns `invalid_client`/`invalid_scope` for bad input and `server_error` when no
    /// unique code pair could be claimed
    pub async fn create_authorization(
        &self,
        client_id: &str,
        scope: Option<&str>,
    ) -> Result<DeviceAuthorizationResponse, GrantError> {
        let scopes = self.validate_client_and_scope(client_id, scope)?;
        let ttl = self.config.code_ttl;
        let expires_in = ttl.as_secs();
        let lifetime = ChronoDuration::from_std(ttl)
            .map_err(|e| AppError::config(format!("Device code lifetime out of range: {e}")))?;

        for attempt in 1..=CODE_GENERATION_ATTEMPTS {
            let now = Utc::now();
            let request = DeviceAuthorizationRequest {
                device_code: generate_token()?,
                user_code: generate_user_code()?,
                client_id: client_id.to_owned(),
                scope: scopes.join(" "),
                status: DeviceAuthorizationStatus::Pending,
                created_at: now,
                expires_at: now + lifetime,
                last_poll_at: None,
                polling_violations: 0,
                polling_interval: self.config.poll_interval_secs,
                user_id: None,
                access_token_hash: None,
            };

            if self.devices.claim(&request, ttl).await? {
                AppLogger::log_oauth_event(client_id, "device_code", "authorization_created", true);
                return Ok(DeviceAuthorizationResponse {
                    verification_uri: self.config.verification_uri.clone(),
                    verification_uri_complete: format!(
                        "{}?user_code={}",
                        self.config.verification_uri,
                        urlencoding::encode(&request.user_code)
                    ),
                    device_code: request.device_code,
                    user_code: request.user_code,
                    expires_in,
                    interval: self.config.poll_interval_secs,
                });
            }
            tracing::debug!(attempt, "Device or user code collision, regenerating");
        }

        Err(AppError::internal("Could not allocate a unique device code pair").into())
    }

    /// Find the request a user code belongs to
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant` for unknown codes and `expired_token` once lapsed
    pub async fn lookup_user_code(
        &self,
        user_code: &str,
    ) -> Result<DeviceAuthorizationRequest, GrantError> {
        let normalized = normalize_user_code(user_code)
            .ok_or_else(|| GrantError::invalid_grant("Unknown user code"))?;
        let request = self
            .devices
            .get_by_user_code(&normalized)
            .await?
            .ok_or_else(|| GrantError::invalid_grant("Unknown user code"))?;
        if request.is_expired() {
            return Err(GrantError::expired_token());
        }
        Ok(request)
    }

    /// Approve a pending request on behalf of `user_id`
    ///
    /// # Errors
    ///
    /// Returns `invalid_grant`/`expired_token` for unknown or lapsed codes and
    /// `invalid_request` when the request was already decided
    pub async fn approve(
        &self,
        user_code: &str,
        user_id: &str,
    ) -> Result<DeviceAuthorizationRequest, GrantError> {
        self.decide(user_code, DeviceAuthorizationStatus::Approved, Some(user_id))
            .await
    }

    /// Deny a pending request
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::approve`]
    pub async fn deny(&self, user_code: &str) -> Result<DeviceAuthorizationRequest, GrantError> {
        self.decide(user_code, DeviceAuthorizationStatus::Denied, None)
            .await
    }

    async fn decide(
        &self,
        user_code: &str,
        status: DeviceAuthorizationStatus,
        user_id: Option<&str>,
    ) -> Result<DeviceAuthorizationRequest, GrantError> {
        let mut request = self.lookup_user_code(user_code).await?;
        if request.status != DeviceAuthorizationStatus::Pending {
            return Err(Self::already_decided(request.status));
        }

        let decision = DeviceDecision {
            status,
            user_id: user_id.map(str::to_owned),
            decided_at: Utc::now(),
        };
        match self.devices.record_decision(&request.device_code, &decision).await {
            Ok(None) => {}
            Ok(Some(existing)) => return Err(Self::already_decided(existing.status)),
            Err(e) if e.code == ErrorCode::ResourceNotFound => {
                return Err(GrantError::expired_token())
            }
            Err(e) => return Err(e.into()),
        }

        request.status = decision.status;
        request.user_id = decision.user_id;

        AppLogger::log_oauth_event(
            &request.client_id,
            "device_code",
            &format!("authorization_{status}"),
            status == DeviceAuthorizationStatus::Approved,
        );
        Ok(request)
    }

    fn already_decided(status: DeviceAuthorizationStatus) -> GrantError {
        GrantError::invalid_request(format!("Authorization request is already {status}"))
    }

    /// Handle one token-endpoint poll
    ///
    /// # Errors
    ///
    /// Returns the RFC 8628 error for the request's state: `invalid_grant`,
    /// `invalid_client`, `expired_token`, `slow_down`, `authorization_pending` or
    /// `access_denied`
    pub async fn poll(&self, device_code: &str, client_id: &str) -> Result<IssuedTokens, GrantError> {
        let request = self
            .devices
            .get(device_code)
            .await
            .map_err(|e| {
                tracing::warn!("Unreadable device authorization record: {}", e.message);
                GrantError::invalid_grant("Invalid device code")
            })?
            .ok_or_else(|| GrantError::invalid_grant("Invalid device code"))?;

        if request.client_id != client_id {
            return Err(GrantError::invalid_client(
                "client_id does not match the device authorization",
            ));
        }

        let now = Utc::now();
        if now > request.expires_at {
            return Err(GrantError::expired_token());
        }

        if let Some(last_poll_at) = request.last_poll_at {
            if polled_too_fast(now - last_poll_at, request.polling_interval) {
                let violations = request.polling_violations.saturating_add(1);
                let poll = PollState {
                    last_poll_at: now,
                    violations,
                    interval: backoff_interval(request.polling_interval, violations),
                };
                self.devices.save_poll_state(device_code, &poll).await?;

                tracing::warn!(
                    violations = poll.violations,
                    interval = poll.interval,
                    "Device polled faster than allowed"
                );
                return Err(GrantError::slow_down(poll.interval));
            }
        }

        match request.status {
            DeviceAuthorizationStatus::Pending => {
                let poll = PollState {
                    last_poll_at: now,
                    violations: request.polling_violations,
                    interval: request.polling_interval,
                };
                self.devices.save_poll_state(device_code, &poll).await?;
                Err(GrantError::authorization_pending())
            }
            DeviceAuthorizationStatus::Denied => Err(GrantError::access_denied()),
            DeviceAuthorizationStatus::TokenIssued => {
                tracing::warn!(client_id = %client_id, "Replay of a consumed device code");
                Err(GrantError::invalid_grant("Device code has already been used"))
            }
            DeviceAuthorizationStatus::Approved => self.issue_for_approved(request).await,
        }
    }

    async fn issue_for_approved(
        &self,
        mut request: DeviceAuthorizationRequest,
    ) -> Result<IssuedTokens, GrantError> {
        let Some(user_id) = request.user_id.clone() else {
            tracing::error!("Approved device authorization has no user");
            return Err(GrantError::invalid_grant("Invalid device code"));
        };

        let grace = Duration::from_secs(DEVICE_ISSUED_GRACE_SECS);
        if !self.devices.claim_issuance(&request.device_code, grace).await? {
            return Err(GrantError::invalid_grant("Device code has already been used"));
        }

        let issued = self
            .generate_device_tokens(&user_id, &request.client_id, &request.scopes())
            .await?;

        request.status = DeviceAuthorizationStatus::TokenIssued;
        request.access_token_hash = Some(issued.access.access_token_hash.clone());
        request.last_poll_at = Some(Utc::now());
        self.devices.mark_token_issued(&request, grace).await?;

        AppLogger::log_oauth_event(&request.client_id, "device_code", "token_issued", true);
        Ok(issued)
    }

    /// Mint a fresh token pair in a new rotation family
    ///
    /// # Errors
    ///
    /// Returns an error if the RNG or the store fails
    pub async fn generate_device_tokens(
        &self,
        user_id: &str,
        client_id: &str,
        scopes: &[String],
    ) -> AppResult<IssuedTokens> {
        self.tokens
            .issue_token_pair(user_id, client_id, scopes, FamilyLink::New)
            .await
    }

    /// Resolve a bearer token to its live access record
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails
    pub async fn validate_access_token(&self, token: &str) -> AppResult<Option<AccessTokenRecord>> {
        self.tokens.validate_access_token(token).await
    }
}
