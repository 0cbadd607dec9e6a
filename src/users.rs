// ABOUTME: Interface to the host forum's user database and an in-memory implementation
// ABOUTME: The authenticator resolves token owners to profiles through this trait
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # User Directory
//!
//! The forum owns its users; the gateway only needs to fetch a profile by id. Deployments
//! implement [`UserDirectory`] against the forum's store, tests and standalone runs use
//! [`InMemoryUserDirectory`].

use crate::errors::AppResult;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Profile fields attached to an authenticated request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Forum user id
    pub user_id: String,
    /// Login name
    pub username: String,
    /// Display name
    pub display_name: String,
    /// Contact address, if the forum shares it
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Forum roles (e.g. `administrators`)
    pub roles: Vec<String>,
    /// Preferred language tag
    pub locale: String,
}

impl UserProfile {
    /// Minimal profile with default locale and no roles
    #[must_use]
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            user_id: user_id.into(),
            display_name: username.clone(),
            username,
            email: None,
            roles: Vec::new(),
            locale: "en-GB".to_owned(),
        }
    }

    /// Attach roles
    #[must_use]
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| (*r).to_owned()).collect();
        self
    }

    /// Set the locale
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = locale.into();
        self
    }
}

/// Lookup of forum users by id
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Fetch a user's profile, `None` when the user does not exist
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store is unavailable
    async fn get_user_data(&self, user_id: &str) -> AppResult<Option<UserProfile>>;
}

/// Process-local user directory
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<String, UserProfile>,
}

impl InMemoryUserDirectory {
    /// Empty directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a user
    pub fn insert(&self, profile: UserProfile) {
        self.users.insert(profile.user_id.clone(), profile);
    }

    /// Remove a user
    pub fn remove(&self, user_id: &str) -> Option<UserProfile> {
        self.users.remove(user_id).map(|(_, profile)| profile)
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user_data(&self, user_id: &str) -> AppResult<Option<UserProfile>> {
        Ok(self.users.get(user_id).map(|entry| entry.value().clone()))
    }
}
