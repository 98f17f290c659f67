//! Transports that carry one chat turn to a reply source.
//!
//! Every reply mode is reduced to the same shape: a byte stream whose
//! concatenation is the bot's full reply. The client only ever sees a
//! [`ByteStream`], whether the bytes come from a chunked HTTP body, a
//! single JSON document, or an in-process responder.
//!
//! - [`HttpTransport`]: POSTs to the chat endpoint (`stream` and `json` modes)
//! - [`LocalTransport`]: runs a [`ReplyBackend`](crate::backend::ReplyBackend) in-process (`canned` mode)

pub mod http;
pub mod local;

pub use http::HttpTransport;
pub use local::LocalTransport;

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::backend::CannedBackend;
use crate::config::ClientConfig;
use crate::error::Result;

/// Header carrying the anti-forgery token.
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Stream of raw reply bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Request body for the chat endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// User message content.
    pub message: String,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Whole-reply JSON body used by the `json` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    /// Bot reply text.
    pub response: String,
}

/// How the reply for a turn is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// Chunked text body rendered as it arrives.
    #[default]
    Stream,
    /// One JSON document `{"response": ...}`.
    Json,
    /// Local keyword responder, no network.
    Canned,
}

/// Opens the reply stream for one turn.
#[async_trait::async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send the request and return the reply bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the exchange cannot be established or the
    /// server answers with a non-success status.
    async fn open(&self, request: &ChatRequest, csrf_token: Option<&str>) -> Result<ByteStream>;
}

/// Build the transport for the configured reply mode.
pub fn from_config(config: &ClientConfig) -> Result<Arc<dyn ChatTransport>> {
    Ok(match config.mode {
        ReplyMode::Stream | ReplyMode::Json => Arc::new(HttpTransport::from_config(config)?),
        ReplyMode::Canned => Arc::new(
            LocalTransport::new(Arc::new(CannedBackend::new()))
                .with_delay(config.reply_delay()),
        ),
    })
}
