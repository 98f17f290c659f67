//! Interactive terminal front end.
//!
//! `/clear` starts a fresh transcript and `/quit` ends the session.
//!
//! Messages and streamed chunks go to stdout; the typing indicator goes to
//! stderr so piping stdout captures a clean transcript.

use std::io::Write;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use crate::chat::{
    ChatView, EventHub, Message, MessageId, Sender, StaticToken, StreamingChatClient, TurnLimits,
    UiEvent,
};
use crate::config::AppConfig;
use crate::transport;

/// Line that ends the session.
const QUIT_COMMAND: &str = "/quit";
/// Line that starts a fresh transcript.
const CLEAR_COMMAND: &str = "/clear";

/// [`ChatView`] writing to the process's standard streams.
#[derive(Debug, Default)]
pub struct TerminalView;

impl TerminalView {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Header line printed before a message body.
fn message_header(message: &Message) -> String {
    format!("[{}] {}: ", message.timestamp, message.sender.label())
}

impl ChatView for TerminalView {
    fn append_message(&self, _id: MessageId, message: &Message) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{}{}", message_header(message), message.text);
        // Bot placeholders stay open for streamed text.
        if message.sender == Sender::User || !message.text.is_empty() {
            let _ = writeln!(out);
        }
        let _ = out.flush();
    }

    fn append_text(&self, _id: MessageId, text: &str) {
        let mut out = std::io::stdout().lock();
        let _ = write!(out, "{text}");
        let _ = out.flush();
    }

    fn clear_input(&self) {}

    fn set_typing(&self, visible: bool) {
        if visible {
            eprintln!("(bot is typing...)");
        } else {
            // close the streamed line
            println!();
        }
    }

    fn scroll_to_bottom(&self) {}
}

/// Run an interactive session until `/quit` or end of input.
pub async fn run(config: &AppConfig) -> anyhow::Result<()> {
    let transport = transport::from_config(&config.client)?;
    let client = Arc::new(
        StreamingChatClient::new(
            transport,
            Arc::new(TerminalView::new()),
            Arc::new(StaticToken::from(config.client.csrf_token.clone())),
        )
        .with_limits(TurnLimits::from(&config.client)),
    );

    tracing::info!(
        name: "terminal.session.started",
        endpoint = %config.client.endpoint,
        mode = ?config.client.mode,
        "Chat session started"
    );

    client.welcome(&config.client.welcome_message);

    let events = EventHub::new();
    let subscription = client.attach(&events);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            QUIT_COMMAND => break,
            CLEAR_COMMAND => {
                client.clear_transcript();
                eprintln!("(transcript cleared)");
                continue;
            }
            _ => {}
        }
        events.emit(&UiEvent::KeyPressed {
            key: "Enter".to_string(),
            input: line,
        });
        // Let the reply finish before reading on, so output does not interleave.
        client.wait_idle().await;
    }

    subscription.dispose();
    client.wait_idle().await;
    tracing::info!(name: "terminal.session.ended", "Chat session ended");
    Ok(())
}
