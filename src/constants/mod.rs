// ABOUTME: Application constants re-exported from the core crate
// ABOUTME: Token lifetimes, key namespaces, SSE limits and protocol identifiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Constants organized by domain

pub use mcp_gateway_core::constants::{kv, oauth, protocol, redis, sse};
