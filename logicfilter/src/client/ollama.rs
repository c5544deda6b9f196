//! Ollama HTTP adapter.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{ChatMessage, ChatOptions, ModelClient};
use crate::errors::TransportError;

/// Model endpoint client for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<&'a ChatOptions>,
}

#[derive(Deserialize)]
struct ChatApiResponse {
    #[serde(default)]
    message: Option<ApiMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl OllamaClient {
    /// Creates a client for the given base URL and per-call timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    /// Creates a client from the pipeline configuration.
    pub fn from_config(config: &crate::config::EnhancerConfig) -> Result<Self, TransportError> {
        Self::new(config.ollama_url.clone(), config.model_timeout())
    }

    /// Returns the base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.base_url)
    }

    fn tags_url(&self) -> String {
        format!("{}/api/tags", self.base_url)
    }

    fn map_send_error(&self, err: &reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_connect() {
            TransportError::unavailable(err.to_string())
        } else {
            TransportError::upstream(err.to_string())
        }
    }

    fn classify_status(model: &str, status: StatusCode, body: &str) -> TransportError {
        let message = serde_json::from_str::<ErrorBody>(body)
            .map(|b| b.error)
            .unwrap_or_else(|_| body.trim().to_string());

        if status == StatusCode::NOT_FOUND || message.to_lowercase().contains("not found") {
            return TransportError::model_not_found(model);
        }
        if status == StatusCode::SERVICE_UNAVAILABLE || status == StatusCode::BAD_GATEWAY {
            return TransportError::unavailable(format!("HTTP {}: {message}", status.as_u16()));
        }
        TransportError::upstream(format!("HTTP {}: {message}", status.as_u16()))
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, TransportError> {
        if model.trim().is_empty() {
            return Err(TransportError::upstream("invalid request: empty model id"));
        }
        if messages.is_empty() {
            return Err(TransportError::upstream("invalid request: no messages"));
        }

        let start = Instant::now();
        let body = ChatApiRequest {
            model,
            messages,
            stream: false,
            options: options.temperature.is_some().then_some(options),
        };

        let response = self
            .client
            .post(self.chat_url())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(&e))?;

        if !status.is_success() {
            return Err(Self::classify_status(model, status, &text));
        }

        let parsed: ChatApiResponse = serde_json::from_str(&text)
            .map_err(|e| TransportError::upstream(format!("failed to parse chat response: {e}")))?;

        if let Some(error) = parsed.error {
            if error.to_lowercase().contains("not found") {
                return Err(TransportError::model_not_found(model));
            }
            return Err(TransportError::upstream(error));
        }

        let content = parsed
            .message
            .and_then(|m| m.content)
            .map(|c| c.trim().to_string())
            .ok_or_else(|| TransportError::upstream("response is missing message.content"))?;

        if content.is_empty() {
            return Err(TransportError::upstream("model returned empty content"));
        }

        debug!(
            model = %model,
            latency_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            chars = content.len(),
            "Chat call completed"
        );

        Ok(content)
    }

    async fn list_models(&self) -> Result<Vec<String>, TransportError> {
        let response = self
            .client
            .get(self.tags_url())
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::unavailable(format!(
                "model listing returned HTTP {}",
                status.as_u16()
            )));
        }

        let tags: TagsResponse = response
            .json()
            .await
            .map_err(|e| TransportError::upstream(format!("failed to parse model list: {e}")))?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}
