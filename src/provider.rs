use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{Error, Result};

/// Text → fixed-length vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// One vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed(&[text.to_string()]).await?;
        out.pop()
        .ok_or_else(|| Error::Provider("embedding response contained no vectors".into()))
    }
}

/// Prompt → completion text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<String>;
}

fn http_client(config: &ProviderConfig) -> Result<Client> {
    Client::builder()
    .timeout(Duration::from_secs(config.request_timeout_secs))
    .build()
    .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {}", e)))
}

// --- EMBEDDINGS ---

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` client.
pub struct OpenAiEmbeddings {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl OpenAiEmbeddings {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config)?,
            url: format!("{}/embeddings", config.api_base),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = EmbeddingRequest { model: &self.model, input: texts };
        let resp = self
        .http
        .post(&self.url)
        .bearer_auth(&self.api_key)
        .json(&payload)
        .send()
        .await
        .map_err(|e| Error::Provider(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Provider(format!("embedding HTTP {}: {}", status, body)));
        }

        let mut parsed: EmbeddingResponse = resp
        .json()
        .await
        .map_err(|e| Error::Provider(format!("decode failed: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(Error::Provider(format!(
                "asked for {} embeddings, received {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // The API tags each vector with its input index; honour it over arrival order.
        parsed.data.sort_by_key(|d| d.index.unwrap_or(usize::MAX));
        debug!("Embedded {} texts with {}", texts.len(), self.model);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

// --- CHAT COMPLETIONS ---

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI-compatible `/chat/completions` client. One user message per call.
pub struct ChatCompletions {
    http: Client,
    url: String,
    api_key: String,
    model: String,
}

impl ChatCompletions {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        Ok(Self {
            http: http_client(config)?,
            url: format!("{}/chat/completions", config.api_base),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
        })
    }
}

#[async_trait]
impl TextGenerator for ChatCompletions {
    async fn generate(&self, prompt: &str, max_output_tokens: u32) -> Result<String> {
        let payload = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            max_tokens: max_output_tokens,
        };

        let resp = self
        .http
        .post(&self.url)
        .bearer_auth(&self.api_key)
        .json(&payload)
        .send()
        .await
        .map_err(|e| Error::Generation(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("chat HTTP {}: {}", status, body)));
        }

        let parsed: ChatResponse = resp
        .json()
        .await
        .map_err(|e| Error::Generation(format!("decode failed: {}", e)))?;

        parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| Error::Generation("response contained no message content".into()))
    }
}
