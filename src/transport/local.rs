//! In-process transport over a reply backend.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::{ByteStream, ChatRequest, ChatTransport};
use crate::backend::ReplyBackend;
use crate::error::Result;

/// Answers turns without a network hop.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    backend: Arc<dyn ReplyBackend>,
    delay: Duration,
}

impl LocalTransport {
    pub fn new(backend: Arc<dyn ReplyBackend>) -> Self {
        Self {
            backend,
            delay: Duration::ZERO,
        }
    }

    /// Pause before each reply starts, like a remote bot "thinking".
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl ChatTransport for LocalTransport {
    async fn open(&self, request: &ChatRequest, _csrf_token: Option<&str>) -> Result<ByteStream> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let text = self.backend.stream_reply(&request.message).await?;
        Ok(Box::pin(text.map(|part| part.map(String::into_bytes))))
    }
}
