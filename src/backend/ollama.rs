//! Ollama chat backend.
//!
//! Connects to `/api/chat` with streaming enabled and yields the
//! `message.content` of every newline-delimited JSON record.

use futures::StreamExt;
use serde::Deserialize;

use super::{ReplyBackend, TextStream};
use crate::error::{ChatError, Result};

/// Longest NDJSON record accepted before the reply is abandoned.
const MAX_LINE_BYTES: usize = 256 * 1024;

/// Driver for a local Ollama server.
#[derive(Clone)]
pub struct OllamaBackend {
    http: reqwest::Client,
    base_url: String,
    model: String,
    system_prompt: String,
}

impl std::fmt::Debug for OllamaBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OllamaBackend")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

/// One NDJSON record of a streamed chat reply.
#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
}

impl OllamaBackend {
    /// Create a backend for the given server, model and system prompt.
    #[must_use]
    pub fn new(base_url: &str, model: &str, system_prompt: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
        }
    }

    fn request_body(&self, prompt: &str) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "stream": true,
            "messages": [
                { "role": "system", "content": self.system_prompt },
                { "role": "user", "content": prompt },
            ],
        })
    }
}

#[async_trait::async_trait]
impl ReplyBackend for OllamaBackend {
    async fn stream_reply(&self, prompt: &str) -> Result<TextStream> {
        let url = format!("{}/api/chat", self.base_url);
        let resp = self.http.post(&url).json(&self.request_body(prompt)).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChatError::Backend(format!(
                "Ollama returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let byte_stream = resp.bytes_stream();
        let out = async_stream::try_stream! {
            let mut lines = LineBuffer::new(MAX_LINE_BYTES);
            let mut finished = false;

            futures::pin_mut!(byte_stream);
            'read: while let Some(chunk) = byte_stream.next().await {
                let chunk = chunk?;
                for line in lines.push(&chunk)? {
                    match parse_line(&line)? {
                        Some(Record::Text(text)) => yield text,
                        Some(Record::Done) => {
                            finished = true;
                            break 'read;
                        }
                        None => {}
                    }
                }
            }

            // Final record without a trailing newline.
            if !finished {
                if let Some(Record::Text(text)) = parse_line(&lines.into_remainder())? {
                    yield text;
                }
            }
        };

        Ok(Box::pin(out))
    }
}

/// Splits a byte stream into newline-terminated lines of bounded length.
#[derive(Debug)]
struct LineBuffer {
    buf: Vec<u8>,
    max_line: usize,
}

impl LineBuffer {
    fn new(max_line: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_line,
        }
    }

    /// Append a chunk and drain every complete line.
    fn push(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
            lines.push(self.buf.drain(..=pos).collect());
        }
        if self.buf.len() > self.max_line {
            return Err(ChatError::Backend(format!(
                "Ollama sent a record longer than {} bytes",
                self.max_line
            )));
        }
        Ok(lines)
    }

    /// Bytes after the last newline.
    fn into_remainder(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Record {
    Text(String),
    Done,
}

/// Parse one NDJSON line. Blank lines and empty deltas yield `None`.
fn parse_line(line: &[u8]) -> Result<Option<Record>> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let chunk: ChatChunk = serde_json::from_str(line)?;
    if let Some(error) = chunk.error {
        return Err(ChatError::Backend(format!("Ollama error: {error}")));
    }
    if let Some(text) = chunk.message.map(|m| m.content).filter(|s| !s.is_empty()) {
        return Ok(Some(Record::Text(text)));
    }
    Ok(chunk.done.then_some(Record::Done))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_line() {
        let line = br#"{"model":"tinyllama","message":{"role":"assistant","content":"Hel"},"done":false}"#;
        assert_eq!(parse_line(line).unwrap(), Some(Record::Text("Hel".into())));
    }

    #[test]
    fn test_parse_done_and_blank() {
        let done = br#"{"message":{"role":"assistant","content":""},"done":true,"total_duration":1}"#;
        assert_eq!(parse_line(done).unwrap(), Some(Record::Done));
        assert_eq!(parse_line(b"  \n").unwrap(), None);
    }

    #[test]
    fn test_parse_error_record() {
        let err = parse_line(br#"{"error":"model 'x' not found"}"#).unwrap_err();
        assert!(err.to_string().contains("model 'x' not found"));
    }

    #[test]
    fn test_line_buffer_splits_across_chunks() {
        let mut lines = LineBuffer::new(64);
        assert!(lines.push(b"{\"a\":").unwrap().is_empty());

        let out = lines.push(b"1}\n{\"b\":2}\n{\"c\"").unwrap();
        assert_eq!(out, vec![b"{\"a\":1}\n".to_vec(), b"{\"b\":2}\n".to_vec()]);
        assert_eq!(lines.into_remainder(), b"{\"c\"".to_vec());
    }

    #[test]
    fn test_line_buffer_rejects_unterminated_flood() {
        let mut lines = LineBuffer::new(8);
        assert!(lines.push(b"12345").is_ok());

        let err = lines.push(b"6789").unwrap_err();
        assert!(matches!(err, ChatError::Backend(_)));
        assert!(err.to_string().contains("longer than 8 bytes"));
    }

    #[test]
    fn test_line_buffer_limit_applies_per_line() {
        let mut lines = LineBuffer::new(8);
        let out = lines.push(b"1234567\n1234567\n1234567").unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_request_body_carries_system_prompt() {
        let backend = OllamaBackend::new("http://localhost:11434/", "tinyllama", "Be brief.");
        assert_eq!(backend.base_url, "http://localhost:11434");

        let body = backend.request_body("hello");
        assert_eq!(body["stream"], true);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "Be brief.");
        assert_eq!(body["messages"][1]["content"], "hello");
    }
}
