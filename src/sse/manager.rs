// ABOUTME: Connection accounting for MCP server-sent event streams
// ABOUTME: Enforces global and per-user caps and releases counters exactly once on drop

use crate::config::SseConfig;
use crate::errors::AppError;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Why a stream was refused before upgrading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SseRejection {
    /// Server-wide cap reached; answered with 503
    #[error("Too many open event streams on this server")]
    GlobalLimit,
    /// Caller's cap reached; answered with 429
    #[error("Too many open event streams for this user")]
    PerUserLimit,
}

impl From<SseRejection> for AppError {
    fn from(rejection: SseRejection) -> Self {
        match rejection {
            SseRejection::GlobalLimit => Self::unavailable(rejection.to_string()),
            SseRejection::PerUserLimit => Self::rate_limited(rejection.to_string()),
        }
    }
}

/// Tracks open SSE connections
pub struct SseConnectionManager {
    limits: SseConfig,
    total: AtomicUsize,
    per_user: DashMap<String, usize>,
}

impl SseConnectionManager {
    /// Create a manager enforcing `limits`
    #[must_use]
    pub fn new(limits: SseConfig) -> Self {
        Self {
            limits,
            total: AtomicUsize::new(0),
            per_user: DashMap::new(),
        }
    }

    /// Configured limits
    #[must_use]
    pub const fn limits(&self) -> &SseConfig {
        &self.limits
    }

    /// Reserve a slot for `user_id`
    ///
    /// # Errors
    ///
    /// Returns the cap that would be exceeded
    pub fn try_acquire(self: &Arc<Self>, user_id: &str) -> Result<SseConnectionGuard, SseRejection> {
        // The entry guard serialises acquisitions for one user
        let mut user_count = self.per_user.entry(user_id.to_owned()).or_insert(0);
        if *user_count >= self.limits.max_connections_per_user {
            return Err(SseRejection::PerUserLimit);
        }

        let max = self.limits.max_connections;
        let reserved = self
            .total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                (open < max).then_some(open + 1)
            });
        if reserved.is_err() {
            drop(user_count);
            self.per_user.remove_if(user_id, |_, count| *count == 0);
            return Err(SseRejection::GlobalLimit);
        }

        *user_count += 1;
        drop(user_count);

        let guard = SseConnectionGuard {
            manager: Arc::clone(self),
            user_id: user_id.to_owned(),
            connection_id: format!("sse_{}", Uuid::new_v4().simple()),
        };
        tracing::debug!(
            connection_id = %guard.connection_id,
            user_id = %user_id,
            open = self.total_connections(),
            "SSE connection opened"
        );
        Ok(guard)
    }

    fn release(&self, user_id: &str) {
        if let Some(mut count) = self.per_user.get_mut(user_id) {
            *count = count.saturating_sub(1);
        }
        self.per_user.remove_if(user_id, |_, count| *count == 0);
        self.total
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |open| {
                Some(open.saturating_sub(1))
            })
            .ok();
    }

    /// Open connections across all users
    #[must_use]
    pub fn total_connections(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }

    /// Open connections for one user
    #[must_use]
    pub fn user_connections(&self, user_id: &str) -> usize {
        self.per_user.get(user_id).map_or(0, |count| *count)
    }
}

/// Reservation for one open stream; dropping it frees the slot
pub struct SseConnectionGuard {
    manager: Arc<SseConnectionManager>,
    user_id: String,
    connection_id: String,
}

impl SseConnectionGuard {
    /// Identifier reported in the `initialized` event
    #[must_use]
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Stream owner
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

impl Drop for SseConnectionGuard {
    fn drop(&mut self) {
        self.manager.release(&self.user_id);
        tracing::debug!(connection_id = %self.connection_id, "SSE connection closed");
    }
}
