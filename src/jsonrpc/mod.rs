// ABOUTME: JSON-RPC 2.0 message types, standard error codes and envelope validation
// ABOUTME: Validation works on raw JSON so an explicit null id stays distinct from a missing one
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # JSON-RPC 2.0 Foundation
//!
//! Messages are validated from [`serde_json::Value`] rather than derived deserialization:
//! `"id": null` is a request with a null id, while a missing `id` marks a notification, and
//! `Option<Value>` cannot tell the two apart.
//!
//! ```rust
//! use mcp_device_gateway::jsonrpc::{parse_message, JsonRpcResponse};
//! # use serde_json::json;
//!
//! let request = parse_message(&json!({"jsonrpc": "2.0", "method": "ping", "id": 1})).unwrap();
//! assert!(!request.is_notification());
//!
//! let response = JsonRpcResponse::success(request.response_id(), json!({}));
//! assert!(response.is_success());
//! ```

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::ProtocolError;

/// JSON-RPC 2.0 version string
pub const JSONRPC_VERSION: &str = "2.0";

/// A structurally valid JSON-RPC request or notification
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// Method name to invoke
    pub method: String,
    /// `params` when present (object or array)
    pub params: Option<Value>,
    /// `None` for notifications; `Some(Value::Null)` for an explicit null id
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request with the given id
    #[must_use]
    pub fn new(method: impl Into<String>, params: Option<Value>, id: Value) -> Self {
        Self {
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    /// Create a notification (no ID, no response expected)
    #[must_use]
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Whether no response may be produced
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Id to place on the response
    #[must_use]
    pub fn response_id(&self) -> Value {
        self.id.clone().unwrap_or(Value::Null)
    }

    /// `params` when it is an object
    #[must_use]
    pub fn params_object(&self) -> Option<&Map<String, Value>> {
        self.params.as_ref().and_then(Value::as_object)
    }
}

/// JSON-RPC 2.0 Response
///
/// Exactly one of `result` or `error` is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0")
    pub jsonrpc: String,

    /// Result of the method call (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error information (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,

    /// Request identifier for correlation, null when unknown
    pub id: Value,
}

/// JSON-RPC 2.0 Error Object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (standard codes: -32700 to -32600)
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error information
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    /// Create a success response
    #[must_use]
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Create an error response
    #[must_use]
    pub fn error(id: Value, code: i32, message: impl Into<String>) -> Self {
        Self::from_error(id, JsonRpcError::new(code, message))
    }

    /// Create an error response with additional data
    #[must_use]
    pub fn error_with_data(id: Value, code: i32, message: impl Into<String>, data: Value) -> Self {
        Self::from_error(id, JsonRpcError::with_data(code, message, data))
    }

    /// Wrap an error object
    #[must_use]
    pub fn from_error(id: Value, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_owned(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// `Invalid Request` for a message that failed envelope validation
    #[must_use]
    pub fn invalid_request(id: Value, reason: &ProtocolError) -> Self {
        Self::error_with_data(
            id,
            error_codes::INVALID_REQUEST,
            "Invalid Request",
            json!({"reason": reason.reason(), "detail": reason.to_string()}),
        )
    }

    /// `Parse error` for a body that is not JSON
    #[must_use]
    pub fn parse_error(detail: impl Into<String>) -> Self {
        Self::error_with_data(
            Value::Null,
            error_codes::PARSE_ERROR,
            "Parse error",
            json!({"detail": detail.into()}),
        )
    }

    /// Check if this is a success response
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.error.is_none() && self.result.is_some()
    }

    /// Check if this is an error response
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Error code, if this is an error response
    #[must_use]
    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|error| error.code)
    }
}

impl JsonRpcError {
    /// Create a new error
    #[must_use]
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error with data
    #[must_use]
    pub fn with_data(code: i32, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// `Method not found`
    #[must_use]
    pub fn method_not_found(method: &str) -> Self {
        Self::with_data(
            error_codes::METHOD_NOT_FOUND,
            "Method not found",
            json!({"method": method}),
        )
    }

    /// `Invalid params` with a description of what is wrong
    #[must_use]
    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::with_data(
            error_codes::INVALID_PARAMS,
            "Invalid params",
            json!({"detail": detail.into()}),
        )
    }

    /// Generic `Internal error`; details stay in the server log
    #[must_use]
    pub fn internal() -> Self {
        Self::new(error_codes::INTERNAL_ERROR, "Internal error")
    }
}

/// Standard JSON-RPC error codes
pub mod error_codes {
    /// Parse error - Invalid JSON
    pub const PARSE_ERROR: i32 = -32700;

    /// Invalid Request - Invalid JSON-RPC
    pub const INVALID_REQUEST: i32 = -32600;

    /// Method not found
    pub const METHOD_NOT_FOUND: i32 = -32601;

    /// Invalid params
    pub const INVALID_PARAMS: i32 = -32602;

    /// Internal error
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// The `id` to echo on an error for `message`, null when absent or unusable
#[must_use]
pub fn echo_id(message: &Value) -> Value {
    match message.get("id") {
        Some(id @ (Value::String(_) | Value::Number(_))) => id.clone(),
        _ => Value::Null,
    }
}

/// Validate one message's envelope
///
/// # Errors
///
/// Returns the first structural rule the message breaks
pub fn parse_message(message: &Value) -> Result<JsonRpcRequest, ProtocolError> {
    let Value::Object(object) = message else {
        return Err(ProtocolError::NotAnObject);
    };

    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(ProtocolError::InvalidVersion);
    }

    let method = match object.get("method") {
        Some(Value::String(method)) if !method.is_empty() => method.clone(),
        _ => return Err(ProtocolError::InvalidMethod),
    };

    let id = match object.get("id") {
        None => None,
        Some(id @ (Value::String(_) | Value::Number(_) | Value::Null)) => Some(id.clone()),
        Some(_) => return Err(ProtocolError::InvalidId),
    };

    let params = match object.get("params") {
        None => None,
        Some(params @ (Value::Object(_) | Value::Array(_))) => Some(params.clone()),
        Some(_) => return Err(ProtocolError::InvalidParams),
    };

    Ok(JsonRpcRequest { method, params, id })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_id_is_a_request() {
        let parsed = parse_message(&json!({"jsonrpc": "2.0", "method": "ping", "id": null}));
        assert!(parsed.is_ok_and(|request| request.id == Some(Value::Null)));
    }

    #[test]
    fn test_missing_id_is_a_notification() {
        let parsed = parse_message(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}));
        assert!(parsed.is_ok_and(|request| request.is_notification()));
    }

    #[test]
    fn test_envelope_rules() {
        let cases = [
            (json!([]), ProtocolError::NotAnObject),
            (json!({"jsonrpc": "1.0", "method": "x"}), ProtocolError::InvalidVersion),
            (json!({"jsonrpc": "2.0", "method": ""}), ProtocolError::InvalidMethod),
            (json!({"jsonrpc": "2.0", "method": "x", "id": {}}), ProtocolError::InvalidId),
            (json!({"jsonrpc": "2.0", "method": "x", "params": null}), ProtocolError::InvalidParams),
            (json!({"jsonrpc": "2.0", "method": "x", "params": 3}), ProtocolError::InvalidParams),
        ];
        for (message, expected) in cases {
            assert_eq!(parse_message(&message), Err(expected));
        }
    }

    #[test]
    fn test_echo_id() {
        assert_eq!(echo_id(&json!({"id": 7})), json!(7));
        assert_eq!(echo_id(&json!({"id": {"a": 1}})), Value::Null);
        assert_eq!(echo_id(&json!("x")), Value::Null);
    }
}
