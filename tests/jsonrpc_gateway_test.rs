// ABOUTME: Integration tests for JSON-RPC 2.0 processing in the MCP gateway
// ABOUTME: Covers envelopes, batches, notifications, method routing and tools/call error mapping
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

use async_trait::async_trait;
use mcp_device_gateway::constants::protocol::MCP_PROTOCOL_VERSION;
use mcp_device_gateway::errors::{AppError, AppResult};
use mcp_device_gateway::jsonrpc::{error_codes, JsonRpcResponse};
use mcp_device_gateway::mcp::{GatewayOutput, JsonRpcGateway};
use mcp_device_gateway::tools::{
    builtin_tools, ToolContext, ToolDefinition, ToolHandler, ToolRegistry,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct FailingTool;

#[derive(Default)]
struct CountingTool {
    calls: AtomicUsize,
}

#[async_trait]
impl ToolHandler for CountingTool {
    async fn execute(&self, arguments: Value, _context: &ToolContext) -> AppResult<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(json!({"content": [{"type": "text", "text": arguments["item"]}], "isError": false}))
    }
}

#[async_trait]
impl ToolHandler for FailingTool {
    async fn execute(&self, _arguments: Value, _context: &ToolContext) -> AppResult<Value> {
        Err(AppError::internal("upstream database password rejected"))
    }
}

fn gateway() -> JsonRpcGateway {
    let mut registry = ToolRegistry::new();
    registry.register_all(builtin_tools()).unwrap();
    registry
        .register(ToolDefinition::new(
            "test.fail",
            "Always fails",
            json!({"type": "object"}),
            Arc::new(FailingTool),
        ))
        .unwrap();
    JsonRpcGateway::new(Arc::new(registry))
}

fn context() -> ToolContext {
    ToolContext {
        user_id: "alice".to_owned(),
        client_id: "mcp-client".to_owned(),
        scopes: vec!["mcp:read".to_owned(), "mcp:write".to_owned()],
        roles: vec!["member".to_owned()],
        locale: "en-US".to_owned(),
        trace_id: "req-123".to_owned(),
    }
}

async fn single(payload: Value) -> JsonRpcResponse {
    match gateway().handle_payload(payload, &context()).await {
        GatewayOutput::Single(response) => response,
        other => panic!("expected a single response, got {other:?}"),
    }
}

async fn batch(payload: Value) -> Vec<JsonRpcResponse> {
    match gateway().handle_payload(payload, &context()).await {
        GatewayOutput::Batch(responses) => responses,
        other => panic!("expected a batch response, got {other:?}"),
    }
}

fn call(id: Value, name: &str, arguments: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments}
    })
}

#[tokio::test]
async fn test_ping_echoes_id() {
    let response = single(json!({"jsonrpc": "2.0", "id": "abc", "method": "ping"})).await;
    assert!(response.is_success());
    assert_eq!(response.id, json!("abc"));
    assert_eq!(response.result, Some(json!({})));
    assert_eq!(response.jsonrpc, "2.0");
}

#[tokio::test]
async fn test_initialize_reports_protocol_version() {
    let response = single(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})).await;
    let result = response.result.unwrap();
    assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
    assert_eq!(result["capabilities"]["tools"]["listChanged"], false);
    assert!(result["serverInfo"]["name"].is_string());
}

#[tokio::test]
async fn test_null_id_gets_a_response() {
    let response = single(json!({"jsonrpc": "2.0", "id": null, "method": "ping"})).await;
    assert!(response.is_success());
    assert_eq!(response.id, Value::Null);
}

#[tokio::test]
async fn test_notification_produces_no_content() {
    let output = gateway()
        .handle_payload(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            &context(),
        )
        .await;
    assert_eq!(output, GatewayOutput::NoContent);
}

#[tokio::test]
async fn test_failing_notification_is_silent() {
    let output = gateway()
        .handle_payload(json!({"jsonrpc": "2.0", "method": "no/such/method"}), &context())
        .await;
    assert_eq!(output, GatewayOutput::NoContent);
}

#[tokio::test]
async fn test_unparseable_body() {
    let output = gateway().handle_body(b"{not json", &context()).await;
    let GatewayOutput::Single(response) = output else {
        panic!("expected a single parse error");
    };
    assert_eq!(response.error_code(), Some(error_codes::PARSE_ERROR));
    assert_eq!(response.id, Value::Null);
}

#[tokio::test]
async fn test_unknown_method() {
    let response = single(json!({"jsonrpc": "2.0", "id": 2, "method": "resources/list"})).await;
    assert_eq!(response.error_code(), Some(error_codes::METHOD_NOT_FOUND));
    assert_eq!(response.error.unwrap().data.unwrap()["method"], "resources/list");
}

#[tokio::test]
async fn test_invalid_envelopes_echo_usable_ids() {
    let cases = [
        (json!({"jsonrpc": "1.0", "id": 5, "method": "ping"}), json!(5), "invalid_version"),
        (json!({"jsonrpc": "2.0", "id": "s", "method": ""}), json!("s"), "invalid_method"),
        (json!({"jsonrpc": "2.0", "id": [1], "method": "ping"}), Value::Null, "invalid_id"),
        (
            json!({"jsonrpc": "2.0", "id": 9, "method": "ping", "params": null}),
            json!(9),
            "invalid_params",
        ),
        (json!(42), Value::Null, "not_an_object"),
    ];

    for (message, expected_id, reason) in cases {
        let response = single(message.clone()).await;
        assert_eq!(response.error_code(), Some(error_codes::INVALID_REQUEST), "{message}");
        assert_eq!(response.id, expected_id, "{message}");
        assert_eq!(response.error.unwrap().data.unwrap()["reason"], reason);
    }
}

#[tokio::test]
async fn test_empty_batch_is_invalid() {
    let responses = batch(json!([])).await;
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].error_code(), Some(error_codes::INVALID_REQUEST));
    assert_eq!(responses[0].id, Value::Null);
}

#[tokio::test]
async fn test_mixed_batch_keeps_order_and_isolates_failures() {
    let responses = batch(json!([
        {"jsonrpc": "2.0", "id": 1, "method": "ping"},
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        "garbage",
        call(json!(2), "server.echo", json!({"message": "hi"})),
        {"jsonrpc": "2.0", "id": 3, "method": "nope"}
    ]))
    .await;

    assert_eq!(responses.len(), 4);
    assert_eq!(responses[0].id, json!(1));
    assert!(responses[0].is_success());
    assert_eq!(responses[1].error_code(), Some(error_codes::INVALID_REQUEST));
    assert_eq!(responses[1].id, Value::Null);
    assert_eq!(responses[2].id, json!(2));
    assert!(responses[2].is_success());
    assert_eq!(responses[3].error_code(), Some(error_codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn test_batch_with_malformed_item_and_notification() {
    let responses = batch(json!([
        call(json!("a"), "server.echo", json!({"message": "first"})),
        {"jsonrpc": "1.0", "id": "bad", "method": "ping"},
        {"jsonrpc": "2.0", "method": "notifications/initialized"},
        call(json!("b"), "server.echo", json!({"message": "second"}))
    ]))
    .await;

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].id, json!("a"));
    assert_eq!(responses[0].result.as_ref().unwrap()["content"][0]["text"], "first");
    assert_eq!(responses[1].error_code(), Some(error_codes::INVALID_REQUEST));
    assert_eq!(responses[2].id, json!("b"));
    assert_eq!(responses[2].result.as_ref().unwrap()["content"][0]["text"], "second");
}

#[tokio::test]
async fn test_batch_of_notifications_is_no_content() {
    let output = gateway()
        .handle_payload(
            json!([
                {"jsonrpc": "2.0", "method": "notifications/initialized"},
                {"jsonrpc": "2.0", "method": "ping"}
            ]),
            &context(),
        )
        .await;
    assert_eq!(output, GatewayOutput::NoContent);
}

#[tokio::test]
async fn test_tools_list_hides_nothing_visible() {
    let response = single(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"})).await;
    let result = response.result.unwrap();
    let names: Vec<&str> = result["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, vec!["server.echo", "server.whoami", "test.fail"]);
    assert_eq!(result["_meta"]["total"], 3);
}

#[tokio::test]
async fn test_echo_call() {
    let response = single(call(json!(7), "server.echo", json!({"message": "hey", "repeat": 3}))).await;
    let result = response.result.unwrap();
    assert_eq!(result["content"][0]["type"], "text");
    assert_eq!(result["content"][0]["text"], "hey hey hey");
    assert_eq!(result["isError"], false);
}

#[tokio::test]
async fn test_call_unknown_tool() {
    let response = single(call(json!(1), "missing.tool", json!({}))).await;
    assert_eq!(response.error_code(), Some(error_codes::METHOD_NOT_FOUND));
}

#[tokio::test]
async fn test_call_with_invalid_arguments() {
    let response = single(call(json!(1), "server.echo", json!({"repeat": 0}))).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, error_codes::INVALID_PARAMS);

    let data = error.data.unwrap();
    assert_eq!(data["errors"].as_array().unwrap().len(), 2);
    assert!(data["detail"].as_str().unwrap().contains("server.echo"));
}

#[tokio::test]
async fn test_call_param_shape_errors() {
    let cases = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call"}),
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": ["server.echo"]}),
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": ""}}),
        json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {"name": 5}}),
        json!({
            "jsonrpc": "2.0", "id": 1, "method": "tools/call",
            "params": {"name": "server.echo", "arguments": "hi"}
        }),
    ];
    for message in cases {
        let response = single(message.clone()).await;
        assert_eq!(response.error_code(), Some(error_codes::INVALID_PARAMS), "{message}");
    }
}

#[tokio::test]
async fn test_missing_arguments_are_invalid_params() {
    let response = single(json!({
        "jsonrpc": "2.0", "id": 1, "method": "tools/call",
        "params": {"name": "server.whoami"}
    }))
    .await;
    assert_eq!(response.error_code(), Some(error_codes::INVALID_PARAMS));
    assert_eq!(response.id, json!(1));

    let null_arguments = single(call(json!(2), "server.whoami", Value::Null)).await;
    assert_eq!(null_arguments.error_code(), Some(error_codes::INVALID_PARAMS));
}

#[tokio::test]
async fn test_handler_never_runs_when_validation_fails() {
    let counter = Arc::new(CountingTool::default());
    let mut registry = ToolRegistry::new();
    registry
        .register(ToolDefinition::new(
            "test.count",
            "Counts its invocations",
            json!({
                "type": "object",
                "properties": {"item": {"type": "string"}},
                "required": ["item"]
            }),
            counter.clone(),
        ))
        .unwrap();
    let gateway = JsonRpcGateway::new(Arc::new(registry));

    for arguments in [json!({}), json!({"item": 5}), json!({"other": "x"})] {
        let output = gateway
            .handle_payload(call(json!(1), "test.count", arguments), &context())
            .await;
        let GatewayOutput::Single(response) = output else {
            panic!("expected a single response");
        };
        assert_eq!(response.error_code(), Some(error_codes::INVALID_PARAMS));
    }
    assert_eq!(counter.calls.load(Ordering::SeqCst), 0);

    let output = gateway
        .handle_payload(call(json!(2), "test.count", json!({"item": "x"})), &context())
        .await;
    let GatewayOutput::Single(response) = output else {
        panic!("expected a single response");
    };
    assert!(response.is_success());
    assert_eq!(counter.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_handler_failure_is_generic() {
    let response = single(call(json!(1), "test.fail", json!({}))).await;
    let error = response.error.unwrap();
    assert_eq!(error.code, error_codes::INTERNAL_ERROR);
    assert_eq!(error.message, "Internal error");
    assert!(error.data.is_none());
}

#[tokio::test]
async fn test_whoami_sees_request_context() {
    let response = single(call(json!(1), "server.whoami", json!({}))).await;
    let structured = &response.result.unwrap()["structuredContent"];
    assert_eq!(structured["user_id"], "alice");
    assert_eq!(structured["client_id"], "mcp-client");
    assert_eq!(structured["roles"], json!(["member"]));
    assert_eq!(structured["locale"], "en-US");
    assert_eq!(structured["trace_id"], "req-123");
}

#[tokio::test]
async fn test_output_serializes_for_transport() {
    let output = gateway()
        .handle_payload(json!([{"jsonrpc": "2.0", "id": 1, "method": "ping"}]), &context())
        .await;
    let body = output.into_json().unwrap();
    assert_eq!(body, json!([{"jsonrpc": "2.0", "result": {}, "id": 1}]));
    assert_eq!(GatewayOutput::NoContent.into_json(), None);
}
