// ABOUTME: Application constants for token lifetimes, key namespaces and protocol identifiers
// ABOUTME: Single source for the numeric contracts of the device grant and token lifecycle
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! Constants grouped by domain

/// `OAuth2` lifetimes, grant identifiers and scope vocabulary
pub mod oauth {
    /// Access token lifetime in seconds
    pub const ACCESS_TOKEN_TTL_SECS: u64 = 3600;
    /// Refresh token lifetime in seconds (7 days)
    pub const REFRESH_TOKEN_TTL_SECS: u64 = 7 * 24 * 3600;
    /// How long a rotated or revoked refresh token is kept for reuse detection
    pub const REVOKED_TOKEN_RETENTION_SECS: u64 = 300;
    /// Authorization code lifetime (redirect flow)
    pub const AUTHORIZATION_CODE_TTL_SECS: u64 = 600;
    /// Default device authorization lifetime
    pub const DEVICE_CODE_TTL_SECS: u64 = 600;
    /// Default minimum polling interval for device clients
    pub const DEVICE_POLL_INTERVAL_SECS: u64 = 5;
    /// Retention of a device record after its token has been issued
    pub const DEVICE_ISSUED_GRACE_SECS: u64 = 3600;
    /// Additive floor applied on every `slow_down`
    pub const SLOW_DOWN_INCREMENT_SECS: u64 = 5;
    /// Ceiling on the interval `slow_down` can impose
    pub const MAX_POLL_INTERVAL_SECS: u64 = 300;
    /// Attempts at claiming a unique device/user code pair
    pub const CODE_GENERATION_ATTEMPTS: usize = 10;
    /// Random bytes in device codes, access tokens and refresh tokens
    pub const TOKEN_BYTES: usize = 32;
    /// User code alphabet: A-Z and 2-9 without glyphs that read alike (I, L, O, 0, 1, 2, 5, 8)
    pub const USER_CODE_CHARSET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ34679";
    /// Characters per user code group
    pub const USER_CODE_GROUP_LEN: usize = 4;

    /// RFC 8628 grant type
    pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";
    /// RFC 6749 authorization code grant type
    pub const AUTHORIZATION_CODE_GRANT_TYPE: &str = "authorization_code";
    /// RFC 6749 refresh token grant type
    pub const REFRESH_TOKEN_GRANT_TYPE: &str = "refresh_token";

    /// Scopes a device client may request
    pub const DEVICE_SCOPES: &[&str] = &["openid", "mcp:read", "mcp:search", "mcp:write"];
    /// Scope required for the server-sent event stream
    pub const SSE_SCOPE: &str = "mcp:sse:read";
    /// Scopes a redirect-flow client may request (device scopes plus the stream scope)
    pub const AUTHORIZATION_CODE_SCOPES: &[&str] =
        &["openid", "mcp:read", "mcp:search", "mcp:write", "mcp:sse:read"];
    /// Scope granted when a client omits `scope`
    pub const DEFAULT_SCOPE: &str = "mcp:read";

    /// Token type returned in every token response
    pub const TOKEN_TYPE_BEARER: &str = "Bearer";
    /// Realm advertised in `WWW-Authenticate` challenges
    pub const AUTH_REALM: &str = "mcp";
    /// PKCE method accepted by the authorization endpoint
    pub const PKCE_METHOD_S256: &str = "S256";
    /// Minimum PKCE verifier length (RFC 7636)
    pub const PKCE_VERIFIER_MIN_LEN: usize = 43;
    /// Maximum PKCE verifier length (RFC 7636)
    pub const PKCE_VERIFIER_MAX_LEN: usize = 128;
    /// RSA modulus size for the signing key
    pub const RSA_KEY_BITS: usize = 2048;
    /// Lifetime of id tokens signed for the redirect flow
    pub const ID_TOKEN_TTL_SECS: i64 = 3600;
}

/// Key namespaces inside the key-value store
pub mod kv {
    /// Device authorization record by device code
    pub const DEVICE_PREFIX: &str = "device:";
    /// Device code by user code
    pub const DEVICE_USER_CODE_PREFIX: &str = "device_user:";
    /// Exactly-once marker for device token issuance
    pub const DEVICE_ISSUED_PREFIX: &str = "device_issued:";
    /// First-writer-wins approve/deny decision by device code
    pub const DEVICE_DECISION_PREFIX: &str = "device_decision:";
    /// Polling bookkeeping by device code
    pub const DEVICE_POLL_PREFIX: &str = "device_poll:";
    /// Access token record by hash
    pub const ACCESS_TOKEN_PREFIX: &str = "access:";
    /// Refresh token record by hash
    pub const REFRESH_TOKEN_PREFIX: &str = "refresh:";
    /// Exactly-once marker for refresh token rotation
    pub const REFRESH_CLAIM_PREFIX: &str = "refresh_claim:";
    /// Rotation family membership set
    pub const FAMILY_PREFIX: &str = "family:";
    /// Marker recording that a whole family was revoked
    pub const FAMILY_REVOKED_PREFIX: &str = "family_revoked:";
    /// Authorization code record
    pub const AUTH_CODE_PREFIX: &str = "auth_code:";
    /// Exactly-once marker for authorization code redemption
    pub const AUTH_CODE_USED_PREFIX: &str = "auth_code_used:";
    /// Namespace prepended to every key by the Redis backend
    pub const REDIS_KEY_PREFIX: &str = "mcp_gateway:";
    /// Default bound on in-memory entries
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;
    /// Default in-memory expiry sweep period
    pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 300;
}

/// Redis connection configuration
pub mod redis {
    /// Redis connection timeout in seconds
    pub const CONNECTION_TIMEOUT_SECS: u64 = 10;
    /// Redis response timeout in seconds
    pub const RESPONSE_TIMEOUT_SECS: u64 = 5;
    /// Number of reconnection retries
    pub const RECONNECTION_RETRIES: usize = 5;
    /// Exponential backoff base for retry delays
    pub const RETRY_EXPONENT_BASE: u64 = 2;
    /// Maximum retry delay in milliseconds
    pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
    /// Initial connection retry count
    pub const INITIAL_CONNECTION_RETRIES: u32 = 3;
    /// Initial retry delay in milliseconds, doubled per attempt
    pub const INITIAL_RETRY_DELAY_MS: u64 = 500;
}

/// Server-sent event stream parameters
pub mod sse {
    /// Heartbeat period
    pub const PING_INTERVAL_SECS: u64 = 15;
    /// Emit `token_expiring` when the token has less than this left
    pub const TOKEN_EXPIRY_WARNING_SECS: i64 = 300;
    /// Default global connection cap
    pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;
    /// Default per-user connection cap
    pub const DEFAULT_MAX_CONNECTIONS_PER_USER: usize = 5;
}

/// MCP protocol identifiers
pub mod protocol {
    /// MCP protocol revision advertised by `initialize`
    pub const MCP_PROTOCOL_VERSION: &str = "2025-06-18";
    /// Server name advertised by `initialize`
    pub const SERVER_NAME: &str = "mcp-device-gateway";
    /// Header carrying the request correlation id
    pub const REQUEST_ID_HEADER: &str = "x-request-id";
    /// Largest accepted request body; JSON-RPC batches stay well under this
    pub const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;
}
