//! Keyword-matched stock replies.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Local;

use super::{ReplyBackend, TextStream};
use crate::chat::message::display_time;
use crate::error::Result;

/// Replies used when no keyword matches, handed out in rotation.
const FALLBACK_REPLIES: [&str; 10] = [
    "That's interesting! Tell me more about that.",
    "I understand what you mean. How does that make you feel?",
    "Thanks for sharing that with me!",
    "That sounds really cool! What happened next?",
    "I see! That's a great point.",
    "Wow, I hadn't thought of it that way before.",
    "That's fascinating! Can you elaborate?",
    "I appreciate you telling me about this.",
    "That makes a lot of sense to me.",
    "Interesting perspective! What do you think about it?",
];

/// Responder that needs no model service.
#[derive(Debug, Default)]
pub struct CannedBackend {
    cursor: AtomicUsize,
}

impl CannedBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the reply for a message.
    ///
    /// Keywords are checked in priority order against the lower-cased
    /// words of the message, so `hi` does not fire inside `this`.
    pub fn reply_for(&self, message: &str) -> String {
        let lower = message.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|w| !w.is_empty())
            .collect();
        let has = |w: &str| words.contains(&w);

        if has("hello") || has("hi") || has("hey") {
            "Hello there! Nice to meet you! \u{1F44B}".to_string()
        } else if lower.contains("how are you") {
            "I'm doing great, thank you for asking! How are you doing today?".to_string()
        } else if has("bye") || has("goodbye") {
            "Goodbye! It was nice chatting with you. Have a wonderful day! \u{1F44B}".to_string()
        } else if words.iter().any(|w| w.starts_with("thank")) {
            "You're very welcome! Happy to help! \u{1F60A}".to_string()
        } else if has("help") {
            "I'm here to chat with you! Just type anything and I'll respond. What would you like to talk about?".to_string()
        } else if has("weather") {
            "I wish I could check the weather for you! You might want to look outside or check a weather app. \u{2600}\u{FE0F}".to_string()
        } else if has("time") {
            format!(
                "The current time is {}! \u{23F0}",
                display_time(&Local::now())
            )
        } else {
            let idx = self.cursor.fetch_add(1, Ordering::Relaxed) % FALLBACK_REPLIES.len();
            FALLBACK_REPLIES[idx].to_string()
        }
    }
}

#[async_trait::async_trait]
impl ReplyBackend for CannedBackend {
    async fn stream_reply(&self, prompt: &str) -> Result<TextStream> {
        let reply = self.reply_for(prompt);
        let words: Vec<Result<String>> = reply
            .split_inclusive(' ')
            .map(|w| Ok(w.to_string()))
            .collect();
        Ok(Box::pin(futures::stream::iter(words)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_keyword_priority() {
        let bot = CannedBackend::new();
        assert!(bot.reply_for("Hi there").starts_with("Hello there!"));
        assert!(bot.reply_for("hello, how are you?").starts_with("Hello there!"));
        assert!(bot.reply_for("How are you doing").starts_with("I'm doing great"));
        assert!(bot.reply_for("ok bye").starts_with("Goodbye!"));
        assert!(bot.reply_for("Thanks a lot").starts_with("You're very welcome"));
        assert!(bot.reply_for("I need help").starts_with("I'm here to chat"));
        assert!(bot.reply_for("what's the weather like").starts_with("I wish I could"));
        assert!(bot.reply_for("what time is it").starts_with("The current time is"));
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let bot = CannedBackend::new();
        let reply = bot.reply_for("this is something");
        assert!(FALLBACK_REPLIES.contains(&reply.as_str()));
    }

    #[test]
    fn test_fallback_rotates() {
        let bot = CannedBackend::new();
        let first = bot.reply_for("pineapples");
        let second = bot.reply_for("pineapples");
        assert_eq!(first, FALLBACK_REPLIES[0]);
        assert_eq!(second, FALLBACK_REPLIES[1]);
    }

    #[tokio::test]
    async fn test_stream_reassembles_reply() {
        let bot = CannedBackend::new();
        let stream = bot.stream_reply("help").await.unwrap();
        let parts: Vec<String> = stream.map(|p| p.unwrap()).collect().await;
        assert!(parts.len() > 1);
        assert_eq!(parts.concat(), bot.reply_for("help"));
    }
}
