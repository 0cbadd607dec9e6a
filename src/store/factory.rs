// ABOUTME: Key-value store factory for environment-based backend selection
// ABOUTME: Picks Redis when a URL is configured and the in-memory store otherwise
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{InMemoryStore, KeyValueStore, KvConfig, RedisStore};
use crate::errors::AppResult;
use std::sync::Arc;

/// Builds the shared key-value store injected into every OAuth component
pub struct KvStoreFactory;

impl KvStoreFactory {
    /// Create the configured backend
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis backend is selected and cannot connect
    pub async fn from_config(config: &KvConfig) -> AppResult<Arc<dyn KeyValueStore>> {
        if config.redis_url.is_some() {
            let store = RedisStore::connect(config).await?;
            return Ok(Arc::new(store));
        }

        tracing::info!(
            "Initializing in-memory key-value store (max entries: {})",
            config.max_entries
        );
        tracing::warn!("In-memory key-value store does not share OAuth state between processes");
        Ok(Arc::new(InMemoryStore::new(config)))
    }
}
