//! Reply backends.
//!
//! A [`ReplyBackend`] turns one user prompt into a stream of reply text
//! fragments. The server streams them to HTTP clients; the canned mode of
//! the client consumes them in-process.
//!
//! # Backends
//!
//! - [`OllamaBackend`]: a local Ollama chat model (`/api/chat`, NDJSON)
//! - [`CannedBackend`]: keyword-matched stock replies, no model required

pub mod canned;
pub mod ollama;

pub use canned::CannedBackend;
pub use ollama::OllamaBackend;

use std::pin::Pin;
use std::sync::Arc;

use futures::Stream;
use serde::Deserialize;

use crate::config::BackendConfig;
use crate::error::Result;

/// Stream of reply text fragments.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Produces reply text for a prompt.
#[async_trait::async_trait]
pub trait ReplyBackend: Send + Sync + std::fmt::Debug {
    /// Start generating a reply.
    ///
    /// # Errors
    ///
    /// Returns an error if generation cannot start at all. Failures after
    /// the first fragment surface as `Err` items on the stream.
    async fn stream_reply(&self, prompt: &str) -> Result<TextStream>;
}

/// Backend selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Ollama chat model.
    #[default]
    Ollama,
    /// Keyword-matched stock replies.
    Canned,
}

/// Build the backend described by the configuration.
pub fn from_config(config: &BackendConfig) -> Arc<dyn ReplyBackend> {
    match config.kind {
        BackendKind::Ollama => Arc::new(OllamaBackend::new(
            &config.base_url,
            &config.model,
            &config.system_prompt,
        )),
        BackendKind::Canned => Arc::new(CannedBackend::new()),
    }
}
