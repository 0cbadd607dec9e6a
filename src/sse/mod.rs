// ABOUTME: Server-Sent Events (SSE) for authenticated MCP clients
// ABOUTME: Connection caps, drop-based teardown and the heartbeat/expiry event sequence
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Async-IO.org

/// Connection caps and guards
pub mod manager;
/// Per-connection event sequence
pub mod stream;

pub use manager::{SseConnectionGuard, SseConnectionManager, SseRejection};
pub use stream::{mcp_event_stream, StreamMessage};
