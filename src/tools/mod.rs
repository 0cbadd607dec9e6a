// ABOUTME: MCP tool system: handler trait, registry with schema validation, built-in tools
// ABOUTME: Tools are registered once at startup and dispatched by the JSON-RPC gateway
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

/// Built-in tools
pub mod builtin;
/// Tool registry and definitions
pub mod registry;
/// Handler trait and call context
pub mod traits;

pub use builtin::builtin_tools;
pub use registry::{
    is_valid_tool_name, RegisteredTool, ToolDefinition, ToolListOptions, ToolLocation,
    ToolRegistry, ToolSchema,
};
pub use traits::{ToolContext, ToolHandler};
