// ABOUTME: Core error types and constants for the MCP device gateway
// ABOUTME: Foundation crate with error handling and protocol constants shared by the server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

#![deny(unsafe_code)]

//! # Gateway Core
//!
//! Foundation crate for the MCP device-authorization gateway. It changes rarely,
//! which keeps incremental builds of the server crate fast.
//!
//! ## Modules
//!
//! - **errors**: `AppError`/`ErrorCode` for HTTP surfaces, `GrantError` for OAuth flows,
//!   `ToolError` and `ProtocolError` for the JSON-RPC gateway
//! - **constants**: token lifetimes, key-value namespaces, scopes and protocol identifiers

/// Unified error handling with standard error codes and HTTP responses
pub mod errors;

/// Application constants organized by domain
pub mod constants;
