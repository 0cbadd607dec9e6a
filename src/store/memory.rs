// ABOUTME: In-memory key-value store with a hard entry bound and TTL support
// ABOUTME: Includes background cleanup task for expired entries
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use super::{KeyValueStore, KvConfig};
use crate::errors::{AppError, AppResult};
use async_trait::async_trait;
use lru::LruCache;
use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, RwLock};

type Store = Arc<RwLock<LruCache<String, Entry>>>;

#[derive(Debug, Clone)]
enum Data {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

/// Stored value with expiration
#[derive(Debug, Clone)]
struct Entry {
    data: Data,
    expires_at: Instant,
}

impl Entry {
    fn new(data: Data, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    fn remaining_ttl(&self) -> Option<Duration> {
        self.expires_at.checked_duration_since(Instant::now())
    }
}

/// In-memory store with a hard entry bound and background cleanup
///
/// All operations take the write lock for their whole duration, which makes each of
/// them atomic with respect to every other operation on the same store. Live entries
/// are never evicted: once `max_entries` live keys are held, writes of new keys fail
/// with a storage error until something expires or is deleted. Rewrites of existing
/// keys always succeed.
pub struct InMemoryStore {
    store: Store,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl InMemoryStore {
    /// Capacity used when configuration asks for zero entries
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// Create a store, spawning the expiry sweep when enabled
    #[must_use]
    pub fn new(config: &KvConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(Self::DEFAULT_CAPACITY);
        let store: Store = Arc::new(RwLock::new(LruCache::new(capacity)));

        let shutdown_tx = if config.enable_background_cleanup {
            let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
            let sweep_store = store.clone();
            let cleanup_interval = config.cleanup_interval;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(cleanup_interval);
                loop {
                    tokio::select! {
                        _ = interval.tick() => {
                            Self::cleanup_expired(&sweep_store).await;
                        }
                        _ = shutdown_rx.recv() => {
                            tracing::debug!("Key-value cleanup task received shutdown signal");
                            break;
                        }
                    }
                }
            });

            Some(shutdown_tx)
        } else {
            None
        };

        Self { store, shutdown_tx }
    }

    /// Store without the background sweep, for tests
    #[must_use]
    pub fn for_testing() -> Self {
        Self::new(&KvConfig {
            enable_background_cleanup: false,
            ..KvConfig::default()
        })
    }

    async fn cleanup_expired(store: &Store) {
        let mut guard = store.write().await;

        let expired_keys: Vec<String> = guard
            .iter()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            guard.pop(key);
        }
        drop(guard);

        if !expired_keys.is_empty() {
            tracing::debug!("Cleaned up {} expired key-value entries", expired_keys.len());
        }
    }

    /// Insert or replace `key`, refusing new keys when the store is full of live entries
    fn insert(store: &mut LruCache<String, Entry>, key: &str, entry: Entry) -> AppResult<()> {
        if !store.contains(key) && store.len() >= store.cap().get() {
            let expired: Vec<String> = store
                .iter()
                .filter(|(_, entry)| entry.is_expired())
                .map(|(key, _)| key.clone())
                .collect();
            for expired_key in &expired {
                store.pop(expired_key);
            }
            if store.len() >= store.cap().get() {
                tracing::warn!(
                    capacity = store.cap().get(),
                    "Key-value store is full, refusing new key"
                );
                return Err(AppError::storage("Key-value store capacity exhausted"));
            }
        }
        store.put(key.to_owned(), entry);
        Ok(())
    }

    fn wrong_type(key: &str) -> AppError {
        AppError::storage(format!("WRONGTYPE operation against key '{key}'"))
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> AppResult<Option<Vec<u8>>> {
        let mut store = self.store.write().await;

        let value = match store.get(key) {
            Some(entry) if entry.is_expired() => None,
            Some(Entry {
                data: Data::Bytes(bytes),
                ..
            }) => Some(bytes.clone()),
            Some(_) => return Err(Self::wrong_type(key)),
            None => return Ok(None),
        };
        if value.is_none() {
            store.pop(key);
        }
        drop(store);
        Ok(value)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<()> {
        let mut store = self.store.write().await;
        Self::insert(&mut store, key, Entry::new(Data::Bytes(value), ttl))
    }

    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> AppResult<bool> {
        let mut store = self.store.write().await;
        let occupied = store.peek(key).is_some_and(|entry| !entry.is_expired());
        if occupied {
            return Ok(false);
        }
        Self::insert(&mut store, key, Entry::new(Data::Bytes(value), ttl))?;
        drop(store);
        Ok(true)
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let removed = self.store.write().await.pop(key);
        Ok(removed.is_some_and(|entry| !entry.is_expired()))
    }

    async fn ttl(&self, key: &str) -> AppResult<Option<Duration>> {
        let store = self.store.read().await;
        // peek leaves recency order untouched
        let ttl = store
            .peek(key)
            .filter(|entry| !entry.is_expired())
            .and_then(Entry::remaining_ttl);
        drop(store);
        Ok(ttl)
    }

    async fn set_add(&self, key: &str, member: &str, ttl: Duration) -> AppResult<()> {
        let mut store = self.store.write().await;
        let mut members = match store.peek(key) {
            Some(entry) if entry.is_expired() => HashSet::new(),
            Some(Entry {
                data: Data::Set(members),
                ..
            }) => members.clone(),
            Some(_) => return Err(Self::wrong_type(key)),
            None => HashSet::new(),
        };
        members.insert(member.to_owned());
        let result = Self::insert(&mut store, key, Entry::new(Data::Set(members), ttl));
        drop(store);
        result
    }

    async fn set_remove(&self, key: &str, member: &str) -> AppResult<()> {
        let mut store = self.store.write().await;
        let now_empty = match store.peek_mut(key) {
            Some(Entry {
                data: Data::Set(members),
                ..
            }) => {
                members.remove(member);
                members.is_empty()
            }
            Some(_) => return Err(Self::wrong_type(key)),
            None => false,
        };
        if now_empty {
            store.pop(key);
        }
        drop(store);
        Ok(())
    }

    async fn set_members(&self, key: &str) -> AppResult<Vec<String>> {
        let store = self.store.read().await;
        match store.peek(key) {
            Some(entry) if entry.is_expired() => Ok(Vec::new()),
            Some(Entry {
                data: Data::Set(members),
                ..
            }) => Ok(members.iter().cloned().collect()),
            Some(_) => Err(Self::wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn keys_with_prefix(&self, prefix: &str) -> AppResult<Vec<String>> {
        let store = self.store.read().await;
        let keys = store
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && !entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();
        drop(store);
        Ok(keys)
    }

    async fn health_check(&self) -> AppResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl Drop for InMemoryStore {
    fn drop(&mut self) {
        if let Some(tx) = &self.shutdown_tx {
            if let Err(e) = tx.try_send(()) {
                tracing::debug!(error = ?e, "Key-value shutdown signal send failed (channel likely closed)");
            }
        }
    }
}
