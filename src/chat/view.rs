//! Rendering sinks and page-provided sources the client is wired to.
//!
//! The client never touches a concrete document. It renders through a
//! [`ChatView`] and reads the anti-forgery token through a
//! [`TokenProvider`], both injected at construction.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use super::message::{Message, MessageId};

/// Transcript container, input field and typing indicator of a chat page.
///
/// Implementations use interior mutability; the client calls these from
/// whichever task runs the current turn.
pub trait ChatView: Send + Sync {
    /// Render a new message at the end of the transcript.
    fn append_message(&self, id: MessageId, message: &Message);

    /// Append text to an already rendered message.
    fn append_text(&self, id: MessageId, text: &str);

    /// Empty the input field after a submission.
    fn clear_input(&self);

    /// Show or hide the "typing" affordance.
    fn set_typing(&self, visible: bool);

    /// Bring the newest content into view.
    fn scroll_to_bottom(&self);
}

/// Source of the page's anti-forgery token.
pub trait TokenProvider: Send + Sync {
    /// Current token, if the page carries one.
    fn csrf_token(&self) -> Option<String>;
}

/// Token fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Provider for pages without a token.
    pub fn none() -> Self {
        Self(None)
    }
}

impl From<Option<String>> for StaticToken {
    fn from(token: Option<String>) -> Self {
        Self(token)
    }
}

impl TokenProvider for StaticToken {
    fn csrf_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// One call made against a [`MemoryView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOp {
    AppendMessage(MessageId),
    AppendText(MessageId, String),
    ClearInput,
    SetTyping(bool),
    ScrollToBottom,
}

#[derive(Debug, Default)]
struct MemoryViewInner {
    ops: Vec<ViewOp>,
    rendered: BTreeMap<MessageId, RenderedMessage>,
}

/// A message as it currently appears on screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    pub message: Message,
    /// Displayed text, including streamed appends.
    pub text: String,
}

/// Headless view that records every call.
///
/// Useful for embedding the client without a live page and for asserting
/// the exact rendering sequence of a turn.
#[derive(Debug, Default)]
pub struct MemoryView {
    inner: Mutex<MemoryViewInner>,
}

impl MemoryView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded call, oldest first.
    pub fn ops(&self) -> Vec<ViewOp> {
        self.lock().ops.clone()
    }

    /// Rendered messages in display order.
    pub fn rendered(&self) -> Vec<RenderedMessage> {
        self.lock().rendered.values().cloned().collect()
    }

    /// Displayed text of one message.
    pub fn text_of(&self, id: MessageId) -> Option<String> {
        self.lock().rendered.get(&id).map(|r| r.text.clone())
    }

    /// Displayed text of the newest message.
    pub fn last_text(&self) -> Option<String> {
        self.lock().rendered.values().next_back().map(|r| r.text.clone())
    }

    /// Whether the typing indicator is currently shown.
    pub fn typing_visible(&self) -> bool {
        self.lock()
            .ops
            .iter()
            .rev()
            .find_map(|op| match op {
                ViewOp::SetTyping(visible) => Some(*visible),
                _ => None,
            })
            .unwrap_or(false)
    }

    /// Number of times the typing indicator was hidden.
    pub fn typing_hidden_count(&self) -> usize {
        self.lock()
            .ops
            .iter()
            .filter(|op| matches!(op, ViewOp::SetTyping(false)))
            .count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryViewInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ChatView for MemoryView {
    fn append_message(&self, id: MessageId, message: &Message) {
        let mut inner = self.lock();
        inner.ops.push(ViewOp::AppendMessage(id));
        inner.rendered.insert(
            id,
            RenderedMessage {
                message: message.clone(),
                text: message.text.clone(),
            },
        );
    }

    fn append_text(&self, id: MessageId, text: &str) {
        let mut inner = self.lock();
        inner.ops.push(ViewOp::AppendText(id, text.to_string()));
        if let Some(rendered) = inner.rendered.get_mut(&id) {
            rendered.text.push_str(text);
        }
    }

    fn clear_input(&self) {
        self.lock().ops.push(ViewOp::ClearInput);
    }

    fn set_typing(&self, visible: bool) {
        self.lock().ops.push(ViewOp::SetTyping(visible));
    }

    fn scroll_to_bottom(&self) {
        self.lock().ops.push(ViewOp::ScrollToBottom);
    }
}
