//! HTTP transport for the chat endpoint.

use futures::StreamExt;
use reqwest::header::ACCEPT;
use url::Url;

use super::{ByteStream, CSRF_HEADER, ChatReply, ChatRequest, ChatTransport, ReplyMode};
use crate::config::ClientConfig;
use crate::error::{ChatError, Result};

/// Default cap on bodies read whole (json replies and error bodies).
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// POSTs each turn to a fixed endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    endpoint: Url,
    http: reqwest::Client,
    mode: ReplyMode,
    max_body_bytes: usize,
}

impl HttpTransport {
    /// Create a transport for `endpoint`.
    ///
    /// `ReplyMode::Canned` has no HTTP form and is treated as `Stream`.
    pub fn new(endpoint: impl AsRef<str>, mode: ReplyMode) -> Result<Self> {
        Self::with_client(endpoint, reqwest::Client::new(), mode)
    }

    /// Create a transport with a custom reqwest client.
    pub fn with_client(
        endpoint: impl AsRef<str>,
        http: reqwest::Client,
        mode: ReplyMode,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint.as_ref())?;
        Ok(Self {
            endpoint,
            http,
            mode,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    /// Limit how much of a json reply or error body is read.
    #[must_use]
    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    /// Create a transport from client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self::with_client(&config.endpoint, http, config.mode)?
            .with_max_body_bytes(config.max_response_bytes))
    }

    /// Get the endpoint URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ChatTransport for HttpTransport {
    async fn open(&self, request: &ChatRequest, csrf_token: Option<&str>) -> Result<ByteStream> {
        let accept = match self.mode {
            ReplyMode::Json => "application/json",
            ReplyMode::Stream | ReplyMode::Canned => "text/plain",
        };

        let response = self
            .http
            .post(self.endpoint.clone())
            .header(ACCEPT, accept)
            .header(CSRF_HEADER, csrf_token.unwrap_or_default())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // An unreadable or oversized body still yields the generic message.
            let body = read_capped(response, self.max_body_bytes)
                .await
                .unwrap_or_default();
            return Err(ChatError::http_failure(status.as_u16(), &body));
        }

        match self.mode {
            ReplyMode::Json => {
                let body = read_capped(response, self.max_body_bytes).await?;
                let reply: ChatReply = serde_json::from_slice(&body)?;
                Ok(Box::pin(futures::stream::once(async move {
                    Ok(reply.response.into_bytes())
                })))
            }
            ReplyMode::Stream | ReplyMode::Canned => Ok(Box::pin(
                response
                    .bytes_stream()
                    .map(|chunk| chunk.map(|b| b.to_vec()).map_err(ChatError::from)),
            )),
        }
    }
}

/// Read a whole body, giving up once it exceeds `limit` bytes.
async fn read_capped(response: reqwest::Response, limit: usize) -> Result<Vec<u8>> {
    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(ChatError::ResponseTooLarge { limit });
    }

    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if body.len() + chunk.len() > limit {
            return Err(ChatError::ResponseTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_endpoint() {
        let err = HttpTransport::new("not a url", ReplyMode::Stream).unwrap_err();
        assert!(matches!(err, ChatError::InvalidUrl(_)));
    }

    #[test]
    fn test_keeps_endpoint() {
        let transport =
            HttpTransport::new("http://127.0.0.1:8000/send_message/", ReplyMode::Json).unwrap();
        assert_eq!(transport.endpoint().path(), "/send_message/");
    }
}
