// ABOUTME: Model Context Protocol (MCP) implementation for AI assistant integration
// ABOUTME: JSON-RPC gateway over the tool registry and the shared server resources
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// JSON-RPC 2.0 message processing
pub mod gateway;
/// Shared engines and router assembly
pub mod resources;

pub use gateway::{GatewayOutput, JsonRpcGateway};
pub use resources::ServerResources;
