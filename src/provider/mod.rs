pub mod structured;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::ProviderError;

/// A single conversation message in provider wire form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Text → fixed-length vector embedding service.
///
/// Repeated calls on identical text must produce vectors whose cosine
/// similarity to themselves is 1.0; exact determinism across provider
/// versions is not assumed.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Black-box text completion service.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, ProviderError>;
}

pub struct OpenAiProvider {
    client: Client,
    api_key: String,
    model: String,
    embed_model: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String, embed_model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            embed_model,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::MalformedResponse("empty embedding data".into()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let body = serde_json::json!({
            "model": self.embed_model,
            "input": texts,
        });

        let response = self
            .client
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let parsed: serde_json::Value = response.json().await?;
        let data = parsed
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| ProviderError::MalformedResponse("missing 'data' array".into()))?;

        let mut vectors = Vec::with_capacity(data.len());
        for entry in data {
            let embedding = entry
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| {
                    ProviderError::MalformedResponse("missing 'embedding' field".into())
                })?;
            let vector: Vec<f32> = embedding
                .iter()
                .filter_map(|v| v.as_f64())
                .map(|v| v as f32)
                .collect();
            if vector.len() != embedding.len() {
                return Err(ProviderError::MalformedResponse(
                    "non-numeric embedding component".into(),
                ));
            }
            vectors.push(vector);
        }

        debug!(count = vectors.len(), model = %self.embed_model, "embedded batch");
        Ok(vectors)
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, ProviderError> {
        let mut all_messages = vec![ChatMessage::new("system", system)];
        all_messages.extend_from_slice(messages);

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": all_messages,
            "temperature": temperature,
        });
        if let Some(max) = max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }

        let response = self
            .client
            .post("https://api.openai.com/v1/chat/completions")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let parsed: serde_json::Value = response.json().await?;
        parsed
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::MalformedResponse("missing completion content".into()))
    }
}

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            client: Client::new(),
            api_key,
            model,
            max_tokens,
        }
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn complete(
        &self,
        system: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: Option<u32>,
    ) -> Result<String, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": max_tokens.unwrap_or(self.max_tokens),
            "system": system,
            "messages": messages,
            "temperature": temperature,
        });

        let response = self
            .client
            .post("https://api.anthropic.com/v1/messages")
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status, body });
        }

        let parsed: serde_json::Value = response.json().await?;
        parsed
            .get("content")
            .and_then(|c| c.as_array())
            .and_then(|c| c.first())
            .and_then(|b| b.get("text"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| ProviderError::MalformedResponse("missing content block".into()))
    }
}

/// Create a chat provider from config.
pub fn chat_from_config(config: &ProviderConfig) -> anyhow::Result<Box<dyn ChatProvider>> {
    let api_key = config.api_key.clone().ok_or_else(|| {
        anyhow::anyhow!(
            "no API key for provider '{}'. Set {} env var.",
            config.provider,
            match config.provider.as_str() {
                "openai" => "OPENAI_API_KEY",
                "anthropic" => "ANTHROPIC_API_KEY",
                _ => "the appropriate API key",
            }
        )
    })?;

    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiProvider::new(
            api_key,
            config.model.clone(),
            config.embed_model.clone(),
        ))),
        "anthropic" => Ok(Box::new(AnthropicProvider::new(
            api_key,
            config.model.clone(),
            config.max_tokens,
        ))),
        other => anyhow::bail!("unknown provider: {other}"),
    }
}

/// Create the embedding provider from config. Embeddings always come from the
/// OpenAI embedding endpoint regardless of the chat provider.
pub fn embedder_from_config(config: &ProviderConfig) -> anyhow::Result<Box<dyn EmbeddingProvider>> {
    let api_key = config
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .ok_or_else(|| anyhow::anyhow!("no API key for embeddings. Set OPENAI_API_KEY."))?;

    Ok(Box::new(OpenAiProvider::new(
        api_key,
        config.model.clone(),
        config.embed_model.clone(),
    )))
}
