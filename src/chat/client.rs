//! Streaming chat client.
//!
//! [`StreamingChatClient`] runs one turn at a time: it renders the user's
//! message, opens the reply stream through its [`ChatTransport`], and grows
//! a placeholder bot message chunk by chunk until the stream ends.
//!
//! # Turn lifecycle
//!
//! ```text
//! Idle -> Sending -> Streaming -> Idle                 (reply complete)
//! Idle -> Sending -> Failed -> Idle                    (request refused)
//! Idle -> Sending -> Streaming -> Failed -> Idle       (stream broke off)
//! ```
//!
//! Whatever the path, the typing indicator is hidden exactly once, after
//! the last chunk or error annotation has been rendered. The same wrap-up
//! runs when a turn's future is dropped mid-flight, so the client is never
//! left busy. A submission while a turn is in flight is rejected rather
//! than interleaved.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::Notify;
use tracing::Instrument;
use uuid::Uuid;

use super::decoder::Utf8StreamDecoder;
use super::events::{EventHub, Subscription, UiEvent};
use super::message::{Message, MessageId, Sender, Transcript};
use super::view::{ChatView, TokenProvider};
use crate::config::ClientConfig;
use crate::error::{ChatError, Result};
use crate::transport::{ChatRequest, ChatTransport};

/// Prefix of the annotation appended to a bot message when its turn fails.
pub const ERROR_ANNOTATION_PREFIX: &str = "\n\n\u{274C} Error: ";

/// Where the client is in the current turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// No turn in flight.
    Idle,
    /// Request sent, waiting for the response to start.
    Sending,
    /// Reply bytes are arriving.
    Streaming,
    /// The turn failed and is being wrapped up.
    Failed,
}

/// Result of one [`StreamingChatClient::submit`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Input was empty after trimming; nothing happened.
    Ignored,
    /// Another turn was still in flight; nothing happened.
    Rejected,
    /// The reply streamed to completion.
    Completed {
        /// Full reply text.
        reply: String,
    },
    /// The turn failed; any partial reply was kept.
    Failed {
        /// Text streamed before the failure.
        partial: String,
        /// Human-readable failure message.
        error: String,
    },
}

/// Per-turn resource bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnLimits {
    /// Longest wait for the response to start or for the next chunk.
    pub idle_timeout: Duration,
    /// Maximum reply size in bytes.
    pub max_response_bytes: usize,
}

impl Default for TurnLimits {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            max_response_bytes: 1024 * 1024,
        }
    }
}

impl From<&ClientConfig> for TurnLimits {
    fn from(config: &ClientConfig) -> Self {
        Self {
            idle_timeout: config.idle_timeout(),
            max_response_bytes: config.max_response_bytes,
        }
    }
}

#[derive(Debug)]
struct ClientInner {
    state: TurnState,
    transcript: Transcript,
    next_id: u64,
}

/// Bot message being streamed into the view.
#[derive(Debug)]
struct PendingReply {
    id: MessageId,
    timestamp: String,
    text: String,
}

/// Chat client with injected transport, view and token source.
pub struct StreamingChatClient {
    transport: Arc<dyn ChatTransport>,
    view: Arc<dyn ChatView>,
    tokens: Arc<dyn TokenProvider>,
    limits: TurnLimits,
    inner: Mutex<ClientInner>,
    turn_finished: Notify,
}

impl std::fmt::Debug for StreamingChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingChatClient")
            .field("limits", &self.limits)
            .field("state", &self.state())
            .finish()
    }
}

impl StreamingChatClient {
    /// Create a client with default limits.
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        view: Arc<dyn ChatView>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            transport,
            view,
            tokens,
            limits: TurnLimits::default(),
            inner: Mutex::new(ClientInner {
                state: TurnState::Idle,
                transcript: Transcript::new(),
                next_id: 0,
            }),
            turn_finished: Notify::new(),
        }
    }

    /// Replace the per-turn limits.
    #[must_use]
    pub fn with_limits(mut self, limits: TurnLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Current turn state.
    pub fn state(&self) -> TurnState {
        self.lock().state
    }

    /// Snapshot of the committed transcript.
    pub fn transcript(&self) -> Transcript {
        self.lock().transcript.clone()
    }

    /// Empty the transcript, e.g. before reloading a conversation.
    ///
    /// Returns `false` and leaves the transcript alone while a turn is in
    /// flight. The view is not touched.
    pub fn clear_transcript(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != TurnState::Idle {
            return false;
        }
        inner.transcript.clear();
        true
    }

    /// Render a bot greeting.
    pub fn welcome(&self, text: &str) {
        self.commit(Message::bot(text));
    }

    /// Submit user input and run the turn to completion.
    pub async fn submit(&self, text: &str) -> TurnOutcome {
        match self.begin_turn(text) {
            Ok(text) => self.run_traced(text).await,
            Err(outcome) => outcome,
        }
    }

    /// Subscribe to UI events; each accepted submission spawns a turn.
    ///
    /// The turn is claimed before the listener returns, so a second event
    /// emitted right after is already rejected. Must be called from within
    /// a tokio runtime. Dropping the returned subscription detaches the client.
    pub fn attach(self: &Arc<Self>, events: &EventHub<UiEvent>) -> Subscription {
        let client = Arc::clone(self);
        events.subscribe(move |event| {
            let Some(text) = event.submitted_text() else {
                return;
            };
            let Ok(text) = client.begin_turn(text) else {
                return;
            };
            let client = Arc::clone(&client);
            let text = text.to_string();
            tokio::spawn(async move {
                client.run_traced(&text).await;
            });
        })
    }

    /// Validate input and claim the client for a new turn.
    fn begin_turn<'a>(&self, text: &'a str) -> std::result::Result<&'a str, TurnOutcome> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TurnOutcome::Ignored);
        }
        if !self.try_begin_turn() {
            tracing::warn!(name: "chat.turn.rejected", "Turn already in flight, submission rejected");
            return Err(TurnOutcome::Rejected);
        }
        Ok(text)
    }

    async fn run_traced(&self, text: &str) -> TurnOutcome {
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!("chat.turn", %turn_id);
        let guard = TurnGuard::new(self);
        self.run_turn(text, guard).instrument(span).await
    }

    /// Wait until no turn is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.turn_finished.notified();
            if self.state() == TurnState::Idle {
                return;
            }
            notified.await;
        }
    }

    async fn run_turn(&self, text: &str, mut guard: TurnGuard<'_>) -> TurnOutcome {
        tracing::info!(name: "chat.turn.started", chars = text.chars().count(), "Turn started");

        self.commit(Message::user(text));
        self.view.clear_input();
        self.view.set_typing(true);
        guard.typing_shown = true;
        self.view.scroll_to_bottom();

        let pending = guard.pending.insert(self.start_reply());
        let result = self.stream_reply(text, pending).await;

        let outcome = match result {
            Ok(()) => {
                tracing::info!(
                    name: "chat.turn.completed",
                    reply_bytes = pending.text.len(),
                    "Turn completed"
                );
                TurnOutcome::Completed {
                    reply: pending.text.clone(),
                }
            }
            Err(e) => {
                self.set_state(TurnState::Failed);
                tracing::warn!(
                    name: "chat.turn.failed",
                    error = %e,
                    partial_bytes = pending.text.len(),
                    "Turn failed"
                );
                let partial = pending.text.clone();
                self.append_reply(pending, &format!("{ERROR_ANNOTATION_PREFIX}{e}"));
                TurnOutcome::Failed {
                    partial,
                    error: e.to_string(),
                }
            }
        };

        guard.completed = true;
        drop(guard);
        outcome
    }

    async fn stream_reply(&self, text: &str, pending: &mut PendingReply) -> Result<()> {
        let request = ChatRequest::new(text);
        let token = self.tokens.csrf_token();
        let mut stream = self
            .bounded(self.transport.open(&request, token.as_deref()))
            .await??;

        self.set_state(TurnState::Streaming);
        tracing::debug!(name: "chat.stream.opened", "Reply stream opened");

        let mut decoder = Utf8StreamDecoder::new();
        let mut received = 0usize;
        while let Some(chunk) = self.bounded(stream.next()).await? {
            let chunk = chunk?;
            received += chunk.len();
            if received > self.limits.max_response_bytes {
                return Err(ChatError::ResponseTooLarge {
                    limit: self.limits.max_response_bytes,
                });
            }
            let decoded = decoder.decode(&chunk);
            if !decoded.is_empty() {
                self.append_reply(pending, &decoded);
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            self.append_reply(pending, &tail);
        }
        Ok(())
    }

    /// Apply the idle timeout to one suspension point of a turn.
    async fn bounded<F: std::future::Future>(&self, fut: F) -> Result<F::Output> {
        tokio::time::timeout(self.limits.idle_timeout, fut)
            .await
            .map_err(|_elapsed| ChatError::Timeout(self.limits.idle_timeout))
    }

    fn try_begin_turn(&self) -> bool {
        let mut inner = self.lock();
        if inner.state != TurnState::Idle {
            return false;
        }
        inner.state = TurnState::Sending;
        true
    }

    fn set_state(&self, state: TurnState) {
        self.lock().state = state;
    }

    /// Record a finished message and render it.
    fn commit(&self, message: Message) {
        let id = {
            let mut inner = self.lock();
            let id = Self::allocate_id(&mut inner);
            inner.transcript.push(message.clone());
            id
        };
        self.view.append_message(id, &message);
        self.view.scroll_to_bottom();
    }

    /// Render the empty bot placeholder for this turn.
    fn start_reply(&self) -> PendingReply {
        let placeholder = Message::new("", Sender::Bot);
        let id = Self::allocate_id(&mut self.lock());
        self.view.append_message(id, &placeholder);
        self.view.scroll_to_bottom();
        PendingReply {
            id,
            timestamp: placeholder.timestamp,
            text: String::new(),
        }
    }

    fn append_reply(&self, pending: &mut PendingReply, text: &str) {
        pending.text.push_str(text);
        self.view.append_text(pending.id, text);
        self.view.scroll_to_bottom();
    }

    /// Commit the finished reply to the transcript.
    fn finish_turn(&self, pending: PendingReply) {
        self.lock().transcript.push(Message {
            text: pending.text,
            sender: Sender::Bot,
            timestamp: pending.timestamp,
        });
    }

    fn allocate_id(inner: &mut ClientInner) -> MessageId {
        let id = MessageId(inner.next_id);
        inner.next_id += 1;
        id
    }

    fn lock(&self) -> MutexGuard<'_, ClientInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Wraps up a claimed turn when dropped.
///
/// Runs whether the turn finished normally or its future was dropped
/// mid-flight: commits whatever reply text arrived, hides the typing
/// indicator if it was shown, and returns the client to `Idle`.
struct TurnGuard<'a> {
    client: &'a StreamingChatClient,
    pending: Option<PendingReply>,
    typing_shown: bool,
    completed: bool,
}

impl<'a> TurnGuard<'a> {
    fn new(client: &'a StreamingChatClient) -> Self {
        Self {
            client,
            pending: None,
            typing_shown: false,
            completed: false,
        }
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.client.finish_turn(pending);
        }
        if self.typing_shown {
            self.client.view.set_typing(false);
        }
        if !self.completed {
            tracing::warn!(name: "chat.turn.abandoned", "Turn dropped before it finished");
        }
        self.client.set_state(TurnState::Idle);
        self.client.turn_finished.notify_waiters();
    }
}
