// ABOUTME: Built-in diagnostic tools registered at startup
// ABOUTME: server.echo returns its input and server.whoami reports the caller's context
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::errors::AppResult;

use super::registry::ToolDefinition;
use super::traits::{ToolContext, ToolHandler};

/// Echoes `message`, optionally repeated
pub struct EchoTool;

#[async_trait]
impl ToolHandler for EchoTool {
    async fn execute(&self, arguments: Value, _context: &ToolContext) -> AppResult<Value> {
        let message = arguments
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let repeat = arguments
            .get("repeat")
            .and_then(Value::as_u64)
            .unwrap_or(1)
            .max(1);
        let text = vec![message; usize::try_from(repeat).unwrap_or(1)].join(" ");
        Ok(json!({
            "content": [{"type": "text", "text": text}],
            "isError": false,
        }))
    }
}

/// Reports who the gateway thinks the caller is
pub struct WhoAmITool;

#[async_trait]
impl ToolHandler for WhoAmITool {
    async fn execute(&self, _arguments: Value, context: &ToolContext) -> AppResult<Value> {
        Ok(json!({
            "content": [{"type": "text", "text": format!("user {}", context.user_id)}],
            "structuredContent": context,
            "isError": false,
        }))
    }
}

/// Definitions of every built-in tool
#[must_use]
pub fn builtin_tools() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition::new(
            "server.echo",
            "Echo a message back to the caller",
            json!({
                "type": "object",
                "properties": {
                    "message": {"type": "string", "minLength": 1},
                    "repeat": {"type": "integer", "minimum": 1, "maximum": 10}
                },
                "required": ["message"],
                "additionalProperties": false
            }),
            Arc::new(EchoTool),
        ),
        ToolDefinition::new(
            "server.whoami",
            "Describe the authenticated caller as seen by the gateway",
            json!({"type": "object", "properties": {}, "additionalProperties": false}),
            Arc::new(WhoAmITool),
        ),
    ]
}
