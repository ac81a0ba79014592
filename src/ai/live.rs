use super::{ChatError, ChatResult, EventStream, ResponseSource, decode_body};
use crate::types::ChatRequest;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use reqwest::header::ACCEPT;

/// Streams answers from an OpenAI-style chat-completions endpoint.
pub struct LiveSource {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
}

impl LiveSource {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            api_key,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ResponseSource for LiveSource {
    async fn connect(&self, request: ChatRequest) -> ChatResult<EventStream> {
        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, "text/event-stream")
            .json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        tracing::info!(
            endpoint = %self.endpoint,
            model = %request.model,
            messages = request.messages.len(),
            "sending chat request"
        );
        let response = builder.send().await.map_err(|err| {
            tracing::error!(error = %err, "chat request failed");
            ChatError::from(err)
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "chat endpoint rejected request");
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }
        tracing::debug!(status = %status, "chat stream accepted");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ChatError::from));
        Ok(decode_body(body))
    }
}
