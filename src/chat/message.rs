//! Transcript messages.

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// Typed by the person at the keyboard.
    User,
    /// Produced by the reply endpoint.
    Bot,
}

impl Sender {
    /// Label used by text renderers.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "You",
            Self::Bot => "Bot",
        }
    }
}

/// Identifier the client assigns to every rendered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

/// A single transcript entry. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Message text.
    pub text: String,
    /// Message author.
    pub sender: Sender,
    /// Wall-clock time of creation, formatted for display.
    pub timestamp: String,
}

impl Message {
    /// Create a message stamped with the current local time.
    pub fn new(text: impl Into<String>, sender: Sender) -> Self {
        Self {
            text: text.into(),
            sender,
            timestamp: display_time(&Local::now()),
        }
    }

    /// Create a user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(text, Sender::User)
    }

    /// Create a bot message.
    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(text, Sender::Bot)
    }
}

/// Format a time as a two-digit 12-hour clock, e.g. `03:07 PM`.
pub fn display_time<Tz: TimeZone>(time: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    time.format("%I:%M %p").to_string()
}

/// Ordered, append-only conversation record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// Create an empty transcript.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message at the end.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// All messages in insertion order.
    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the transcript is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Messages from one sender.
    pub fn by_sender(&self, sender: Sender) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.sender == sender)
    }

    /// Drop every message (transcript reload).
    pub fn clear(&mut self) {
        self.messages.clear();
    }
}
