// ABOUTME: Route module organization for the MCP device gateway HTTP endpoints
// ABOUTME: Health and MCP transport routes; OAuth routes live with the authorization server
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Route module for the gateway
//!
//! Each domain module contains only route definitions and thin handlers that
//! delegate to the engines held by [`crate::mcp::resources::ServerResources`].

/// Health check and store status routes
pub mod health;
/// Model Context Protocol (MCP) transport routes
pub mod mcp;

/// Health check route handlers
pub use health::HealthRoutes;
/// MCP JSON-RPC and event stream route handlers
pub use mcp::McpRoutes;
