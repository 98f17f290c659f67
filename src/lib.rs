//! Streaming Chat
//!
//! A chat client that sends user text to a chat endpoint and renders the
//! reply as it streams in, together with the small HTTP service that answers
//! on the other end.
//!
//! # Architecture
//!
//! - **Client**: turn-at-a-time chat client rendering into an injected view
//! - **Transports**: chunked-text, whole-JSON and in-process reply modes
//! - **Backends**: Ollama chat model or keyword-matched stock replies
//! - **Server**: Axum service exposing `POST /send_message/`
//!
//! # Modules
//!
//! - [`chat`]: client, transcript, decoder, view and event wiring
//! - [`transport`]: how a turn reaches its reply source
//! - [`backend`]: reply generation
//! - [`server`]: HTTP endpoint
//! - [`terminal`]: interactive terminal front end

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]

pub mod backend;
pub mod chat;
pub mod config;
pub mod error;
pub mod server;
pub mod terminal;
pub mod transport;

pub use error::{ChatError, Result};

use std::sync::Arc;

use backend::ReplyBackend;
use config::AppConfig;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Reply generator for incoming messages.
    pub backend: Arc<dyn ReplyBackend>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}
