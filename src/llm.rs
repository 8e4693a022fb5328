//! Chat model abstraction and implementations.
//!
//! Defines the [`ChatModel`] trait consumed by the orchestrator, with
//! Ollama (`/api/chat`) and OpenAI (`/v1/chat/completions`) backends.
//! Both share the retry/backoff discipline of the embedding providers.
//! The generation deadline is enforced by the orchestrator, not here;
//! the per-request HTTP timeout below only bounds a single attempt.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::embedding::post_with_retry;
use crate::models::Message;

/// Stateless request/response text generation. The full conversation
/// history is supplied on every call; the model holds no session state.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Generate a reply given prior turns and the composed prompt for
    /// the current question. `prompt` already embeds the retrieved
    /// context block; it is sent as the final user message.
    async fn generate(&self, history: &[Message], prompt: &str) -> Result<String>;
}

/// Instantiate the configured chat provider.
pub fn create_chat_model(config: &LlmConfig) -> Result<Box<dyn ChatModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Box::new(OllamaChat::new(config)?)),
        "openai" => Ok(Box::new(OpenAiChat::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}

/// Serialize history plus the composed prompt into the wire format both
/// chat APIs share.
fn build_messages(history: &[Message], prompt: &str) -> Vec<serde_json::Value> {
    let mut messages: Vec<serde_json::Value> = history
        .iter()
        .map(|m| {
            serde_json::json!({
                "role": m.role.as_str(),
                "content": m.content,
            })
        })
        .collect();
    messages.push(serde_json::json!({ "role": "user", "content": prompt }));
    messages
}

// ============ Ollama ============

/// Chat backend using a local Ollama instance.
pub struct OllamaChat {
    model: String,
    url: String,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, history: &[Message], prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(history, prompt),
            "stream": false,
        });

        let json = post_with_retry(
            &self.client,
            &format!("{}/api/chat", self.url),
            None,
            &body,
            0,
        )
        .await?;

        json.get("message")
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid Ollama response: missing message content"))
    }
}

// ============ OpenAI ============

/// Chat backend using the OpenAI API. Requires `OPENAI_API_KEY`.
pub struct OpenAiChat {
    model: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiChat {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            model: config.model.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAiChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, history: &[Message], prompt: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": build_messages(history, prompt),
        });

        let json = post_with_retry(
            &self.client,
            "https://api.openai.com/v1/chat/completions",
            Some(&self.api_key),
            &body,
            0,
        )
        .await?;

        json.get("choices")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Invalid OpenAI response: missing choice content"))
    }
}
