// ABOUTME: Configuration module organizing environment-driven server settings
// ABOUTME: Re-exports the server, OAuth, SSE and key-value configuration types
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Configuration management
//!
//! All settings come from environment variables; there are no configuration files.

/// Server, OAuth and SSE settings
pub mod environment;
/// Key-value backend and Redis connection settings
pub mod store;

pub use environment::{Environment, LogLevel, OAuthServerConfig, ServerConfig, SseConfig};
pub use store::RedisConnectionConfig;
