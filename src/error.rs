//! Error types for the AdSense MCP server

use std::io;

use thiserror::Error;

/// Result type alias for the AdSense MCP server
pub type Result<T> = std::result::Result<T, Error>;

/// AdSense MCP server errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// No AdSense account could be resolved (no explicit, default, or
    /// discoverable account)
    #[error("No AdSense accounts found")]
    NoAccounts,

    /// Upstream API error with an HTTP-status-like code
    #[error("Upstream error{}: {message}", status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Upstream {
        /// HTTP status code, when the upstream produced one
        status: Option<u16>,
        /// Upstream error message, passed through unchanged
        message: String,
    },

    /// Cache storage error - fatal to the current operation, never
    /// interpreted as a cache miss
    #[error("Cache storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Protocol error (malformed JSON-RPC traffic)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid tool parameters
    #[error("Invalid params: {0}")]
    InvalidParams(String),
}

impl Error {
    /// Create an upstream error from a status code and message
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Whether this error is transient and worth retrying.
    ///
    /// Retryable: rate-limit responses (429, or a quota/rate-limit message
    /// without a status), server errors (500/503), and transport-level
    /// connect/timeout failures. Everything else (auth failures, malformed
    /// requests, not-found, storage errors) fails on the first attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upstream { status, message } => match status {
                Some(429 | 500 | 503) => true,
                _ => {
                    let msg = message.to_ascii_lowercase();
                    msg.contains("quota") || msg.contains("rate limit")
                }
            },
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Convert to JSON-RPC error code
    #[must_use]
    pub fn to_rpc_code(&self) -> i32 {
        use crate::protocol::rpc_codes;

        match self {
            Self::Json(_) => rpc_codes::PARSE_ERROR,
            Self::Protocol(_) => rpc_codes::INVALID_REQUEST,
            Self::InvalidParams(_) => rpc_codes::INVALID_PARAMS,
            Self::NoAccounts => rpc_codes::NO_ACCOUNTS,
            Self::Upstream { .. } | Self::Http(_) => rpc_codes::UPSTREAM_ERROR,
            _ => rpc_codes::INTERNAL_ERROR,
        }
    }
}
