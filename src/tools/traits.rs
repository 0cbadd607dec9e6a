// ABOUTME: Defines the ToolHandler trait and the per-call ToolContext passed to handlers
// ABOUTME: Tools implement this trait to be registered and executed via the ToolRegistry
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Tool Handler Trait
//!
//! A tool is a [`ToolDefinition`](super::registry::ToolDefinition) bound to a handler. The
//! registry validates arguments against the tool's schema before the handler runs, so
//! handlers may assume their input matches `inputSchema`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::errors::AppResult;
use crate::middleware::AuthContext;

/// Request-derived context handed to every tool invocation
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolContext {
    /// Authenticated caller
    pub user_id: String,
    /// Client the caller's token was issued to
    pub client_id: String,
    /// Scopes on the caller's token
    pub scopes: Vec<String>,
    /// Caller's forum roles
    pub roles: Vec<String>,
    /// Caller's preferred locale
    pub locale: String,
    /// Correlation id of the HTTP request
    pub trace_id: String,
}

impl ToolContext {
    /// Build the context for an authenticated request
    #[must_use]
    pub fn from_auth(auth: &AuthContext, trace_id: impl Into<String>) -> Self {
        Self {
            user_id: auth.user_id.clone(),
            client_id: auth.client_id.clone(),
            scopes: auth.scopes.clone(),
            roles: auth.profile.roles.clone(),
            locale: auth.profile.locale.clone(),
            trace_id: trace_id.into(),
        }
    }
}

/// Executable half of a tool.
///
/// Handlers are `Send + Sync` and shared across requests behind an `Arc`. Errors are
/// reported to JSON-RPC clients as a generic internal error; details only reach the log.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool
    ///
    /// # Errors
    ///
    /// Returns an error when the tool cannot produce a result
    async fn execute(&self, arguments: Value, context: &ToolContext) -> AppResult<Value>;
}
