// ABOUTME: Protocol error types for JSON-RPC 2.0 envelope validation
// ABOUTME: Each variant names the structural rule a message broke

/// Reasons a JSON-RPC message is rejected as `Invalid Request`
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// Message is an array or a scalar instead of an object
    #[error("Request must be a JSON object")]
    NotAnObject,

    /// `jsonrpc` member missing or not exactly "2.0"
    #[error("jsonrpc must be exactly \"2.0\"")]
    InvalidVersion,

    /// `method` missing, not a string, or empty
    #[error("method must be a non-empty string")]
    InvalidMethod,

    /// `id` present but not a string, number or null
    #[error("id must be a string, number or null")]
    InvalidId,

    /// `params` present but not an object or array
    #[error("params must be an object or array")]
    InvalidParams,

    /// Batch array with no elements
    #[error("Batch must contain at least one request")]
    EmptyBatch,
}

impl ProtocolError {
    /// Short machine-readable reason placed in the error's `data`
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::NotAnObject => "not_an_object",
            Self::InvalidVersion => "invalid_version",
            Self::InvalidMethod => "invalid_method",
            Self::InvalidId => "invalid_id",
            Self::InvalidParams => "invalid_params",
            Self::EmptyBatch => "empty_batch",
        }
    }
}
