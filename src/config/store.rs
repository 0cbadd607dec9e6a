// ABOUTME: Key-value store configuration types
// ABOUTME: Handles Redis connection retries and in-memory store bounds
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::environment::{env_parse, env_var_opt};
use crate::constants::{kv, redis};
use crate::errors::AppResult;
use crate::store::KvConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Redis connection and retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConnectionConfig {
    /// Connection timeout in seconds
    pub connection_timeout_secs: u64,
    /// Response/command timeout in seconds
    pub response_timeout_secs: u64,
    /// Number of reconnection retries after connection drop
    pub reconnection_retries: usize,
    /// Exponential backoff base for retry delays
    pub retry_exponent_base: u64,
    /// Maximum retry delay in milliseconds
    pub max_retry_delay_ms: u64,
    /// Number of retries for initial connection at startup
    pub initial_connection_retries: u32,
    /// Initial retry delay in milliseconds (doubles with exponential backoff)
    pub initial_retry_delay_ms: u64,
}

impl Default for RedisConnectionConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: redis::CONNECTION_TIMEOUT_SECS,
            response_timeout_secs: redis::RESPONSE_TIMEOUT_SECS,
            reconnection_retries: redis::RECONNECTION_RETRIES,
            retry_exponent_base: redis::RETRY_EXPONENT_BASE,
            max_retry_delay_ms: redis::MAX_RETRY_DELAY_MS,
            initial_connection_retries: redis::INITIAL_CONNECTION_RETRIES,
            initial_retry_delay_ms: redis::INITIAL_RETRY_DELAY_MS,
        }
    }
}

impl RedisConnectionConfig {
    /// Load Redis connection configuration from environment
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but not a valid number
    pub fn from_env() -> AppResult<Self> {
        Ok(Self {
            connection_timeout_secs: env_parse(
                "REDIS_CONNECTION_TIMEOUT_SECS",
                redis::CONNECTION_TIMEOUT_SECS,
            )?,
            response_timeout_secs: env_parse(
                "REDIS_RESPONSE_TIMEOUT_SECS",
                redis::RESPONSE_TIMEOUT_SECS,
            )?,
            reconnection_retries: env_parse(
                "REDIS_RECONNECTION_RETRIES",
                redis::RECONNECTION_RETRIES,
            )?,
            retry_exponent_base: env_parse("REDIS_RETRY_EXPONENT_BASE", redis::RETRY_EXPONENT_BASE)?,
            max_retry_delay_ms: env_parse("REDIS_MAX_RETRY_DELAY_MS", redis::MAX_RETRY_DELAY_MS)?,
            initial_connection_retries: env_parse(
                "REDIS_INITIAL_CONNECTION_RETRIES",
                redis::INITIAL_CONNECTION_RETRIES,
            )?,
            initial_retry_delay_ms: env_parse(
                "REDIS_INITIAL_RETRY_DELAY_MS",
                redis::INITIAL_RETRY_DELAY_MS,
            )?,
        })
    }
}

/// Build the key-value store configuration from environment
///
/// # Errors
///
/// Returns an error if a numeric variable cannot be parsed
pub fn kv_config_from_env() -> AppResult<KvConfig> {
    Ok(KvConfig {
        max_entries: env_parse("KV_MAX_ENTRIES", kv::DEFAULT_MAX_ENTRIES)?,
        redis_url: env_var_opt("REDIS_URL"),
        cleanup_interval: Duration::from_secs(env_parse(
            "KV_CLEANUP_INTERVAL_SECS",
            kv::DEFAULT_CLEANUP_INTERVAL_SECS,
        )?),
        enable_background_cleanup: true,
        redis_connection: RedisConnectionConfig::from_env()?,
    })
}
