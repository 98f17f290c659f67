//! Chat client core.
//!
//! This module holds everything the client side of a conversation needs,
//! independent of how the page is drawn or how bytes travel.
//!
//! # Architecture
//!
//! - [`StreamingChatClient`]: runs turns and renders replies incrementally
//! - [`Transcript`] / [`Message`]: the append-only conversation record
//! - [`Utf8StreamDecoder`]: chunk-boundary-safe text decoding
//! - [`ChatView`] / [`TokenProvider`]: injected page sinks and sources
//! - [`EventHub`] / [`Subscription`]: UI event wiring with disposers
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use streaming_chat::backend::CannedBackend;
//! use streaming_chat::chat::{ChatView, MemoryView, StaticToken, StreamingChatClient, TurnOutcome};
//! use streaming_chat::transport::LocalTransport;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let view = Arc::new(MemoryView::new());
//! let client = StreamingChatClient::new(
//!     Arc::new(LocalTransport::new(Arc::new(CannedBackend::new()))),
//!     Arc::clone(&view) as Arc<dyn ChatView>,
//!     Arc::new(StaticToken::none()),
//! );
//!
//! let outcome = client.submit("hello").await;
//! assert!(matches!(outcome, TurnOutcome::Completed { .. }));
//! assert_eq!(client.transcript().len(), 2);
//! # }
//! ```

pub mod client;
pub mod decoder;
pub mod events;
pub mod message;
pub mod view;

pub use client::{
    ERROR_ANNOTATION_PREFIX, StreamingChatClient, TurnLimits, TurnOutcome, TurnState,
};
pub use decoder::Utf8StreamDecoder;
pub use events::{EventHub, Subscription, UiEvent};
pub use message::{Message, MessageId, Sender, Transcript};
pub use view::{ChatView, MemoryView, RenderedMessage, StaticToken, TokenProvider, ViewOp};
