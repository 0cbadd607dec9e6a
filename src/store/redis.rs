// ABOUTME: Redis key-value store with connection pooling and atomic TTL writes
// ABOUTME: Shares OAuth state between server instances using SET NX PX claims
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use super::{KeyValueStore, KvConfig};
use crate::config::store::RedisConnectionConfig;
use crate::constants::kv::REDIS_KEY_PREFIX;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{AsyncCommands, RedisError};
use std::time::Duration;
use tracing::{error, info, warn};

/// Redis store implementation with connection pooling
///
/// Uses Redis `ConnectionManager` for automatic reconnection. All keys are prefixed with
/// `REDIS_KEY_PREFIX` so the gateway can share a Redis instance with other services.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to the configured Redis instance
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is missing or every connection attempt fails
    pub async fn connect(config: &KvConfig) -> AppResult<Self> {
        let redis_url = config
            .redis_url
            .as_ref()
            .ok_or_else(|| AppError::config("Redis URL is required for the Redis backend"))?;

        let conn_config = &config.redis_connection;

        info!(
            "Connecting to Redis (timeout={}s, response_timeout={}s, retries={})",
            conn_config.connection_timeout_secs,
            conn_config.response_timeout_secs,
            conn_config.initial_connection_retries
        );

        let client = redis::Client::open(redis_url.as_str())
            .map_err(|e| AppError::config(format!("Failed to create Redis client: {e}")))?;

        let manager = Self::connect_with_retry(&client, conn_config).await?;

        info!("Successfully connected to Redis");

        Ok(Self { manager })
    }

    /// Connect to Redis with exponential backoff retry on failure
    async fn connect_with_retry(
        client: &redis::Client,
        conn_config: &RedisConnectionConfig,
    ) -> AppResult<ConnectionManager> {
        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(conn_config.connection_timeout_secs))
            .set_response_timeout(Duration::from_secs(conn_config.response_timeout_secs))
            .set_number_of_retries(conn_config.reconnection_retries)
            .set_exponent_base(conn_config.retry_exponent_base)
            .set_max_delay(conn_config.max_retry_delay_ms);

        let max_retries = conn_config.initial_connection_retries;
        let max_delay_ms = conn_config.max_retry_delay_ms;
        let mut delay_ms = conn_config.initial_retry_delay_ms;
        let mut last_error = None;

        for attempt in 0..=max_retries {
            match ConnectionManager::new_with_config(client.clone(), manager_config.clone()).await
            {
                Ok(manager) => {
                    if attempt > 0 {
                        info!("Redis connection established after {attempt} retries");
                    }
                    return Ok(manager);
                }
                Err(e) => {
                    if attempt < max_retries {
                        warn!(
                            "Redis connection attempt {}/{} failed, retrying in {delay_ms}ms: {e}",
                            attempt + 1,
                            max_retries + 1,
                        );
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        delay_ms = (delay_ms * 2).min(max_delay_ms);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(AppError::storage(format!(
            "Failed to connect to Redis after {} attempts: {}",
            max_retries + 1,
            last_error.map_or_else(|| "unknown error".to_owned(), |e| e.to_string())
        )))
    }

    /// Build full Redis key with namespace prefix
    fn build_key(key: &str) -> String {
        format!("{REDIS_KEY_PREFIX}{key}")
    }

    /// Milliseconds for PX/PEXPIRE; Redis rejects zero
    fn ttl_millis(ttl: Duration) -> u64 {
        u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
    }

    fn storage_error(operation: &'static str) -> impl FnOnce(RedisError) -> AppError {
        move |e| {
            error!("Redis {operation} operation failed: {e}");
            AppError::storage(format!("Redis {operation} failed: {e}"))
        }
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let mut conn = self.manager.clone();
        conn.get(Self::build_key(key))
            .await
            .map_err(Self::storage_error("GET"))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.pset_ex::<_, _, ()>(Self::build_key(key), value, Self::ttl_millis(ttl))
            .await
            .map_err(Self::storage_error("SET"))
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        // SET NX replies OK when written and nil when the key exists
        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::build_key(key))
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(Self::ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(Self::storage_error("SET NX"))?;
        Ok(reply.is_some())
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn
            .del(Self::build_key(key))
            .await
            .map_err(Self::storage_error("DEL"))?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        let mut conn = self.manager.clone();
        let millis: i64 = conn
            .pttl(Self::build_key(key))
            .await
            .map_err(Self::storage_error("PTTL"))?;

        // -2: key missing, -1: key without expiry
        match millis {
            ms if ms > 0 => Ok(Some(Duration::from_millis(ms as u64))),
            _ => Ok(None),
        }
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let redis_key = Self::build_key(key);
        let ttl_ms = i64::try_from(Self::ttl_millis(ttl)).unwrap_or(i64::MAX);
        redis::pipe()
            .atomic()
            .sadd(&redis_key, member)
            .ignore()
            .pexpire(&redis_key, ttl_ms)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(Self::storage_error("SADD"))
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()> {
        let mut conn = self.manager.clone();
        conn.srem::<_, _, ()>(Self::build_key(key), member)
            .await
            .map_err(Self::storage_error("SREM"))
    }

    async fn set_members(&self, key: &str) -> AppResult<Vec<String>> {
        let mut conn = self.manager.clone();
        conn.smembers(Self::build_key(key))
            .await
            .map_err(Self::storage_error("SMEMBERS"))
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        let pattern = format!("{}*", Self::build_key(prefix));
        let mut conn = self.manager.clone();
        let mut cursor = 0u64;
        let mut keys = Vec::new();

        // SCAN is cursor-based and never blocks the server like KEYS would
        loop {
            let (next_cursor, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(Self::storage_error("SCAN"))?;

            keys.extend(
                batch
                    .into_iter()
                    .filter_map(|key| key.strip_prefix(REDIS_KEY_PREFIX).map(str::to_owned)),
            );

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(keys)
    }

    async fn health_check(&self) -> AppResult<()> {
        let mut conn = self.manager.clone();
        let response: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(Self::storage_error("PING"))?;

        if response == "PONG" {
            Ok(())
        } else {
            Err(AppError::storage(format!(
                "Unexpected PING response '{response}'"
            )))
        }
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
