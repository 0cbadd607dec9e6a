// ABOUTME: Key-value store abstraction shared by the OAuth token, device and code stores
// ABOUTME: Values and expiry are written atomically; claims use set-if-absent semantics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Key-value storage backends
//!
//! Every mutation path of the OAuth state machines goes through [`KeyValueStore`]. The
//! trait exposes only operations that are atomic on a single key, so correctness holds
//! across several server processes sharing one Redis:
//!
//! - `set` writes value and TTL together (`SET .. PX`)
//! - `set_if_absent` is the claim primitive (`SET .. NX PX`)
//! - `set_add`/`set_remove` maintain rotation-family membership without read-modify-write

/// Backend selection from configuration
pub mod factory;
/// In-process backend with a hard entry bound and background expiry
pub mod memory;
/// Redis backend for multi-instance deployments
pub mod redis;

pub use factory::KvStoreFactory;
pub use memory::InMemoryStore;
pub use self::redis::RedisStore;

use crate::config::store::RedisConnectionConfig;
use crate::constants::kv;
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Atomic key-value operations with per-key expiry
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a value; expired keys read as absent
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>>;

    /// Write a value and its expiry in one operation
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()>;

    /// Write only if the key is absent; returns whether this call claimed it
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<bool>;

    /// Remove a key; returns whether it existed
    async fn delete(&self, key: &str) -> AppResult<bool>;

    /// Remaining lifetime, `None` when the key is absent
    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>>;

    /// Add a member to a set and reset the set's expiry
    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> AppResult<()>;

    /// Remove a member from a set
    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()>;

    /// All members of a set, empty when absent
    async fn set_members(&self, key: &str) -> AppResult<Vec<String>>;

    /// Live keys starting with `prefix`
    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>>;

    /// Verify the backend is reachable
    async fn health_check(&self) -> AppResult<()>;

    /// Short backend name for logs and health output
    fn backend_name(&self) -> &'static str;
}

/// JSON helpers layered over the byte-level operations
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Read and decode a JSON value
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored bytes are not valid JSON for `T`
    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        match self.get(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                AppError::serialization(format!("Stored record '{key}' is corrupt: {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Encode and write a JSON value with expiry
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails
    async fn set_json<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<()> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, bytes, ttl).await
    }

    /// Encode and claim a JSON value
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend write fails
    async fn set_json_if_absent<T: Serialize + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> AppResult<bool> {
        let bytes = serde_json::to_vec(value)?;
        self.set_if_absent(key, bytes, ttl).await
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}

/// Configuration for the key-value backends
#[derive(Debug, Clone)]
pub struct KvConfig {
    /// Maximum entries held by the in-memory backend
    pub max_entries: usize,
    /// Redis URL; selects the Redis backend when set
    pub redis_url: Option<String>,
    /// In-memory expiry sweep period
    pub cleanup_interval: Duration,
    /// Run the in-memory expiry sweep (disable in tests)
    pub enable_background_cleanup: bool,
    /// Redis connection and retry configuration
    pub redis_connection: RedisConnectionConfig,
}

impl Default for KvConfig {
    fn default() -> Self {
        Self {
            max_entries: kv::DEFAULT_MAX_ENTRIES,
            redis_url: None,
            cleanup_interval: Duration::from_secs(kv::DEFAULT_CLEANUP_INTERVAL_SECS),
            enable_background_cleanup: true,
            redis_connection: RedisConnectionConfig::default(),
        }
    }
}
