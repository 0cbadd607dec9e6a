// ABOUTME: Server binary for the MCP device-authorization gateway
// ABOUTME: Loads configuration, wires shared resources and serves the axum router
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # MCP Device Gateway Binary
//!
//! Starts the HTTP server with the OAuth2 endpoints, the JSON-RPC gateway and the
//! event stream. Users come from the host forum; `--user` seeds the in-memory
//! directory for standalone runs.

use anyhow::{Context, Result};
use clap::Parser;
use mcp_device_gateway::{
    config::ServerConfig,
    logging,
    mcp::ServerResources,
    users::{InMemoryUserDirectory, UserProfile},
};
use std::future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "mcp-device-gateway")]
#[command(about = "MCP gateway with OAuth2 device authorization and JSON-RPC tools")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Seed a user id into the in-memory directory (repeatable)
    #[arg(long = "user")]
    users: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    config.validate()?;

    logging::init_from_env()?;

    info!("Starting MCP device gateway");
    info!("{}", config.summary());

    let directory = InMemoryUserDirectory::new();
    for user_id in &args.users {
        directory.insert(UserProfile::new(user_id.as_str(), user_id.as_str()));
    }
    if !args.users.is_empty() {
        info!("Seeded {} users into the in-memory directory", args.users.len());
    }

    let bind_addr = format!("{}:{}", config.host, config.http_port);
    let resources = Arc::new(ServerResources::build(config, Arc::new(directory), Vec::new()).await?);
    let cleanup_task = resources.spawn_cleanup();
    let app = resources.router();

    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    info!("HTTP server listening on http://{bind_addr}");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    cleanup_task.abort();
    if let Err(e) = &served {
        error!("HTTP server error: {e}");
    }
    served.context("HTTP server failed")?;

    info!("MCP device gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
