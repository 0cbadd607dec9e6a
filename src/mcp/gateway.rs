// ABOUTME: Transport-agnostic JSON-RPC 2.0 gateway for MCP single and batch messages
// ABOUTME: Validates envelopes, routes methods and isolates per-item failures inside batches
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use crate::constants::protocol::{MCP_PROTOCOL_VERSION, SERVER_NAME};
use crate::errors::{ProtocolError, ToolError};
use crate::jsonrpc::{
    echo_id, error_codes, parse_message, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
};
use crate::logging::AppLogger;
use crate::tools::{ToolContext, ToolListOptions, ToolRegistry};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// What the transport should send back
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayOutput {
    /// Nothing to send (notifications only); HTTP answers 204
    NoContent,
    /// One response object
    Single(JsonRpcResponse),
    /// Response array, in input order
    Batch(Vec<JsonRpcResponse>),
}

impl GatewayOutput {
    /// JSON body, `None` for `NoContent`
    #[must_use]
    pub fn into_json(self) -> Option<Value> {
        match self {
            Self::NoContent => None,
            Self::Single(response) => serde_json::to_value(response).ok(),
            Self::Batch(responses) => serde_json::to_value(responses).ok(),
        }
    }
}

/// Processes JSON-RPC messages against the tool registry
pub struct JsonRpcGateway {
    tools: Arc<ToolRegistry>,
}

impl JsonRpcGateway {
    /// Create a gateway over a built registry
    #[must_use]
    pub const fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }

    /// Registry the gateway dispatches to
    #[must_use]
    pub const fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Handle a raw request body
    pub async fn handle_body(&self, body: &[u8], context: &ToolContext) -> GatewayOutput {
        match serde_json::from_slice::<Value>(body) {
            Ok(payload) => self.handle_payload(payload, context).await,
            Err(e) => {
                debug!("Rejecting unparseable JSON-RPC body: {e}");
                GatewayOutput::Single(JsonRpcResponse::parse_error(e.to_string()))
            }
        }
    }

    /// Handle a parsed body: a single message or a batch
    pub async fn handle_payload(&self, payload: Value, context: &ToolContext) -> GatewayOutput {
        match payload {
            Value::Array(messages) => self.handle_batch(&messages, context).await,
            message => self
                .handle_message(&message, context)
                .await
                .map_or(GatewayOutput::NoContent, GatewayOutput::Single),
        }
    }

    /// Handle a batch; items run sequentially and output keeps input order
    pub async fn handle_batch(&self, messages: &[Value], context: &ToolContext) -> GatewayOutput {
        if messages.is_empty() {
            return GatewayOutput::Batch(vec![JsonRpcResponse::invalid_request(
                Value::Null,
                &ProtocolError::EmptyBatch,
            )]);
        }

        let mut responses = Vec::with_capacity(messages.len());
        for message in messages {
            if let Some(response) = self.handle_message(message, context).await {
                responses.push(response);
            }
        }

        if responses.is_empty() {
            GatewayOutput::NoContent
        } else {
            GatewayOutput::Batch(responses)
        }
    }

    /// Handle one message; `None` for notifications
    pub async fn handle_message(
        &self,
        message: &Value,
        context: &ToolContext,
    ) -> Option<JsonRpcResponse> {
        let request = match parse_message(message) {
            Ok(request) => request,
            Err(reason) => {
                debug!("Invalid JSON-RPC message: {reason}");
                return Some(JsonRpcResponse::invalid_request(echo_id(message), &reason));
            }
        };

        let start = Instant::now();
        let outcome = self.dispatch(&request, context).await;
        debug!(
            method = %request.method,
            notification = request.is_notification(),
            duration_ms = start.elapsed().as_millis() as u64,
            "JSON-RPC message processed"
        );

        if request.is_notification() {
            if let Err(e) = outcome {
                warn!(method = %request.method, code = e.code, "Notification failed: {}", e.message);
            }
            return None;
        }

        let id = request.response_id();
        Some(match outcome {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(e) => JsonRpcResponse::from_error(id, e),
        })
    }

    /// Route a validated request to its method
    ///
    /// # Errors
    ///
    /// Returns the JSON-RPC error object for the method's failure
    pub async fn dispatch(
        &self,
        request: &JsonRpcRequest,
        context: &ToolContext,
    ) -> Result<Value, JsonRpcError> {
        match request.method.as_str() {
            "initialize" => Ok(Self::initialize_result()),
            "ping" => Ok(json!({})),
            "notifications/initialized" => Ok(Value::Null),
            "tools/list" => Ok(self.tools_list(request)),
            "tools/call" => self.tools_call(request, context).await,
            other => Err(JsonRpcError::method_not_found(other)),
        }
    }

    fn initialize_result() -> Value {
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": {"listChanged": false}
            },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION"),
            }
        })
    }

    fn tools_list(&self, request: &JsonRpcRequest) -> Value {
        let options = request
            .params_object()
            .map(|params| ToolListOptions {
                include_remote: params
                    .get("include_remote")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                include_hidden: params
                    .get("include_hidden")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
            })
            .unwrap_or_default();
        self.tools.list_response(options)
    }

    async fn tools_call(
        &self,
        request: &JsonRpcRequest,
        context: &ToolContext,
    ) -> Result<Value, JsonRpcError> {
        let params = request
            .params_object()
            .ok_or_else(|| JsonRpcError::invalid_params("params must be an object"))?;

        let name = match params.get("name") {
            Some(Value::String(name)) if !name.is_empty() => name.as_str(),
            _ => return Err(JsonRpcError::invalid_params("name must be a non-empty string")),
        };

        let arguments = match params.get("arguments") {
            Some(arguments @ Value::Object(_)) => arguments.clone(),
            _ => return Err(JsonRpcError::invalid_params("arguments must be an object")),
        };

        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| JsonRpcError::method_not_found(name))?;

        if let Err(e) = tool.validate(&arguments) {
            return Err(match e {
                ToolError::InvalidInput { ref errors, .. } => JsonRpcError::with_data(
                    error_codes::INVALID_PARAMS,
                    "Invalid params",
                    json!({"detail": e.to_string(), "errors": errors}),
                ),
                other => JsonRpcError::invalid_params(other.to_string()),
            });
        }

        let start = Instant::now();
        let result = tool.handler().execute(arguments, context).await;
        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(value) => {
                AppLogger::log_mcp_tool_call(&context.user_id, name, true, duration_ms);
                Ok(value)
            }
            Err(e) => {
                AppLogger::log_mcp_tool_call(&context.user_id, name, false, duration_ms);
                error!(tool = name, trace_id = %context.trace_id, "Tool execution failed: {e}");
                Err(JsonRpcError::internal())
            }
        }
    }
}
