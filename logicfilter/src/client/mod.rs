//! Model endpoint client.
//!
//! A [`ModelClient`] issues exactly one request per call and reports failures
//! as a typed [`TransportError`]. Retries and fallback live one layer up, in
//! the fallback resolver.

#[cfg(feature = "ollama")]
mod ollama;

#[cfg(feature = "ollama")]
pub use ollama::OllamaClient;

use crate::errors::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Role of a chat message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Model output.
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single role/content pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Author role.
    pub role: Role,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// Creates a message.
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Sampling options forwarded with a chat call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// Sampling temperature; the service default when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

impl ChatOptions {
    /// Options with a fixed temperature.
    #[must_use]
    pub fn with_temperature(temperature: f32) -> Self {
        Self {
            temperature: Some(temperature),
        }
    }
}

/// Client for the external inference service.
///
/// Implementations must be safe to share across concurrently running
/// pipelines and hold no mutable state beyond their connection pool.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Sends one chat request and returns the generated text.
    ///
    /// `model` must be non-empty and `messages` must contain at least one
    /// message. Generated text is never empty on success.
    async fn invoke(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: &ChatOptions,
    ) -> Result<String, TransportError>;

    /// Lists the models the service can serve.
    async fn list_models(&self) -> Result<Vec<String>, TransportError>;

    /// Checks that the service is reachable.
    async fn health(&self) -> Result<(), TransportError> {
        self.list_models().await.map(|_| ())
    }
}

/// Normalises a model tag so `deepseek-r1` and `deepseek-r1:latest` compare equal.
#[must_use]
pub fn canonical_model_name(model: &str) -> String {
    let model = model.trim();
    if model.contains(':') {
        model.to_string()
    } else {
        format!("{model}:latest")
    }
}
