//! Error types for chat turns, transports and reply backends.

use std::time::Duration;

use thiserror::Error;

/// Chat error type.
#[derive(Error, Debug)]
pub enum ChatError {
    /// HTTP request failed before or while the reply was received.
    #[error("Network request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    ///
    /// The display form is only the human-readable message, since it is
    /// what ends up in the transcript.
    #[error("{message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Message extracted from the error body, or a generic fallback.
        message: String,
    },

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No data arrived within the idle window.
    #[error("No data received for {}s", .0.as_secs())]
    Timeout(Duration),

    /// Reply exceeded the configured size cap.
    #[error("Response exceeded {limit} bytes")]
    ResponseTooLarge {
        /// Maximum number of reply bytes accepted per turn.
        limit: usize,
    },

    /// Stream broke off mid-reply.
    #[error("Stream interrupted: {0}")]
    Stream(String),

    /// Reply backend failure (model service unavailable, bad payload).
    #[error("{0}")]
    Backend(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ChatError {
    /// Build the error for a non-success response.
    ///
    /// A JSON body's non-empty `response` field wins, then `detail`; any
    /// other body falls back to a generic message carrying the status.
    pub fn http_failure(status: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                ["response", "detail"].iter().find_map(|key| {
                    v.get(key)
                        .and_then(serde_json::Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(ToString::to_string)
                })
            })
            .unwrap_or_else(|| format!("HTTP Error {status}: Failed to start stream."));
        Self::Http { status, message }
    }
}

/// Result type alias for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
