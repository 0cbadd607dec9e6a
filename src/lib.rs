// ABOUTME: Main library entry point for the MCP device-authorization gateway
// ABOUTME: OAuth2 device grant, refresh rotation, PKCE, JSON-RPC tool gateway and SSE streams
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

// deny(unsafe_code): zero-tolerance unsafe policy
#![deny(unsafe_code)]

//! # MCP Device Gateway
//!
//! A Model Context Protocol (MCP) gateway for clients that cannot open a browser.
//! Clients obtain tokens through the `OAuth2` device authorization grant (RFC 8628)
//! and then call registered tools over JSON-RPC 2.0.
//!
//! ## Features
//!
//! - **Device grant**: user codes, polling with `slow_down` backoff, one-time issuance
//! - **Refresh rotation**: every refresh consumes its token; replay revokes the family
//! - **PKCE code flow**: S256-only authorization codes for browser-capable clients
//! - **JSON-RPC gateway**: batches, notifications and schema-validated tool calls
//! - **Event streams**: authenticated SSE with per-user and global connection caps
//!
//! ## Architecture
//!
//! - **Store**: one key-value abstraction (bounded in-memory map or Redis) under every engine
//! - **`OAuth2` server**: device, code and refresh grants plus revocation
//! - **Middleware**: Bearer authentication and request tracing
//! - **Tools**: registry with JSON Schema validation and handler dispatch
//! - **MCP**: JSON-RPC processing and shared resource wiring
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use mcp_device_gateway::config::ServerConfig;
//! use mcp_device_gateway::errors::AppResult;
//!
//! fn main() -> AppResult<()> {
//!     let config = ServerConfig::from_env()?;
//!     println!("Gateway configured with port: HTTP={}", config.http_port);
//!     Ok(())
//! }
//! ```

/// Environment-driven configuration
pub mod config;

/// Application constants and configuration values
pub mod constants;

/// Unified error handling system with standard error codes and HTTP responses
pub mod errors;

/// JSON-RPC 2.0 message types and validation
pub mod jsonrpc;

/// RSA signing keys and the published key set
pub mod jwks;

/// Structured logging configuration
pub mod logging;

/// MCP gateway and shared server resources
pub mod mcp;

/// Bearer authentication and request tracing middleware
pub mod middleware;

/// `OAuth2` authorization server
pub mod oauth2_server;

/// HTTP routes outside the authorization server
pub mod routes;

/// Server-sent event streams
pub mod sse;

/// Key-value storage backends
pub mod store;

/// Tool registry and built-in tools
pub mod tools;

/// User directory
pub mod users;
