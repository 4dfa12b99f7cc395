//! Text generation capability consumed by the generators.
//!
//! Generators only see [`TextGenerator`]; the concrete backend is chosen from
//! [`LlmConfig`] by [`create_generator`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use intake_core::config::LlmConfig;
use intake_core::models::{Message, MessageRole};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

/// Errors from a text generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Generator unavailable: {0}")]
    Unavailable(String),
}

/// One role-tagged turn of context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role(),
            content: message.content.clone(),
        }
    }
}

/// A single completion request.
#[derive(Debug, Clone, Default)]
pub struct GenerationRequest {
    pub system_prompt: String,
    pub messages: Vec<ChatMessage>,
    /// Route to the cheaper model.
    pub small_model: bool,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages,
            small_model: false,
        }
    }

    #[must_use]
    pub fn small(mut self) -> Self {
        self.small_model = true;
        self
    }
}

/// Plain-text completion backend.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Produce a completion for the prompt and transcript.
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError>;

    /// Identifier of the model that serves the given tier, recorded in document metadata.
    fn model_name(&self, small: bool) -> String;
}

/// Select the backend named by `config.provider`.
pub fn create_generator(config: &LlmConfig) -> Result<Arc<dyn TextGenerator>, GenerationError> {
    match config.provider.as_str() {
        "placeholder" => Ok(Arc::new(PlaceholderGenerator)),
        "openai" => Ok(Arc::new(OpenAiCompatible::from_config(config)?)),
        other => Err(GenerationError::Unavailable(format!(
            "unknown llm provider '{other}' (expected 'placeholder' or 'openai')"
        ))),
    }
}

// ============================================================================
// Placeholder backend
// ============================================================================

/// Offline backend producing deterministic canned text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaceholderGenerator;

#[async_trait]
impl TextGenerator for PlaceholderGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let latest = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map_or("no requirements captured yet", |m| m.content.as_str());

        if request.small_model {
            return Ok(latest.lines().next().unwrap_or_default().to_string());
        }

        Ok(format!(
            "Placeholder draft generated offline from {} message(s).\n\nLatest request: {latest}\n",
            request.messages.len()
        ))
    }

    fn model_name(&self, _small: bool) -> String {
        "placeholder".to_string()
    }
}

// ============================================================================
// OpenAI-compatible backend
// ============================================================================

/// Chat-completions client for OpenAI and compatible endpoints.
pub struct OpenAiCompatible {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    small_model: String,
    max_tokens: u32,
}

impl std::fmt::Debug for OpenAiCompatible {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatible")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("small_model", &self.small_model)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatible {
    /// Build a client, reading the API key from the configured environment variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self, GenerationError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            GenerationError::Unavailable(format!("{} is not set", config.api_key_env))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!(
            base_url = %config.base_url,
            model = %config.model,
            "Using OpenAI-compatible generator"
        );

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            small_model: config.small_model.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn build_request_body(&self, request: &GenerationRequest) -> serde_json::Value {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(serde_json::json!({
            "role": "system",
            "content": request.system_prompt,
        }));
        for message in &request.messages {
            messages.push(serde_json::json!({
                "role": message.role.to_string(),
                "content": message.content,
            }));
        }

        serde_json::json!({
            "model": self.model_name(request.small_model),
            "messages": messages,
            "max_tokens": self.max_tokens,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiCompatible {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let body = self.build_request_body(&request);
        debug!(
            model = %self.model_name(request.small_model),
            messages = request.messages.len(),
            "OpenAiCompatible::generate: sending request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed: ChatCompletionResponse = serde_json::from_str(&text)
            .map_err(|e| GenerationError::InvalidResponse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| GenerationError::InvalidResponse("response had no content".to_string()))
    }

    fn model_name(&self, small: bool) -> String {
        if small {
            self.small_model.clone()
        } else {
            self.model.clone()
        }
    }
}

#[cfg(test)]
#[path = "llm_tests.rs"]
mod tests;
