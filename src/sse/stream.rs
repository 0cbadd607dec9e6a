// ABOUTME: Event sequence for an authenticated MCP stream: initialized, heartbeats, expiry warning
// ABOUTME: The connection guard lives inside the stream so disconnects free the slot

use super::manager::SseConnectionGuard;
use crate::constants::sse::TOKEN_EXPIRY_WARNING_SECS;
use crate::middleware::AuthContext;
use axum::response::sse::Event;
use chrono::{DateTime, Utc};
use futures_util::Stream;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::{interval_at, Instant};

/// One message on an MCP event stream
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// Sent once, first
    Initialized(Value),
    /// Heartbeat
    Ping(Value),
    /// Sent once when the access token has less than five minutes left
    TokenExpiring(Value),
}

impl StreamMessage {
    /// SSE `event:` name
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::Initialized(_) => "initialized",
            Self::Ping(_) => "ping",
            Self::TokenExpiring(_) => "token_expiring",
        }
    }

    /// Render as an axum SSE event
    #[must_use]
    pub fn into_event(self) -> Event {
        let name = self.event_name();
        let data = match self {
            Self::Initialized(data) | Self::Ping(data) | Self::TokenExpiring(data) => data,
        };
        Event::default().event(name).data(data.to_string())
    }
}

fn expiry_warning(expires_at: DateTime<Utc>, warned: &mut bool) -> Option<StreamMessage> {
    let remaining = (expires_at - Utc::now()).num_seconds();
    if *warned || remaining > TOKEN_EXPIRY_WARNING_SECS {
        return None;
    }
    *warned = true;
    Some(StreamMessage::TokenExpiring(json!({
        "expires_at": expires_at.to_rfc3339(),
        "expires_in": remaining.max(0),
    })))
}

/// Messages for one connection; ends once the access token has expired
pub fn mcp_event_stream(
    guard: SseConnectionGuard,
    auth: AuthContext,
    ping_interval: Duration,
) -> impl Stream<Item = StreamMessage> {
    async_stream::stream! {
        let guard = guard;
        let expires_at = auth.expires_at;
        let mut warned = false;

        yield StreamMessage::Initialized(json!({
            "connection_id": guard.connection_id(),
            "user_id": auth.user_id,
            "scopes": auth.scopes,
            "expires_at": expires_at.to_rfc3339(),
        }));

        if let Some(warning) = expiry_warning(expires_at, &mut warned) {
            yield warning;
        }

        let mut ticker = interval_at(Instant::now() + ping_interval, ping_interval);
        loop {
            ticker.tick().await;
            if Utc::now() >= expires_at {
                tracing::debug!(connection_id = %guard.connection_id(), "Closing stream for expired token");
                break;
            }
            if let Some(warning) = expiry_warning(expires_at, &mut warned) {
                yield warning;
            }
            yield StreamMessage::Ping(json!({"timestamp": Utc::now().to_rfc3339()}));
        }
    }
}
