// ABOUTME: Error types re-exported from the core crate for server-side use
// ABOUTME: AppError for HTTP surfaces, GrantError for OAuth flows, ToolError and ProtocolError for JSON-RPC
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Unified Error Handling System
//!
//! The error types live in `mcp-gateway-core` so they compile once; this module keeps
//! `crate::errors::AppError` paths stable across the server crate.

pub use mcp_gateway_core::errors::oauth::OAuth2ErrorBody;
pub use mcp_gateway_core::errors::{
    AppError, AppResult, ErrorCode, ErrorResponse, GrantError, GrantErrorKind, ProtocolError,
    ToolError,
};
