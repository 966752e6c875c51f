//! Provider + Embedder collaborators — external LLM inference and embedding
//! generation the pipeline consumes but never implements itself. A shared
//! reqwest-based HTTP client shape with a bounded retry loop, narrowed to
//! the two-method interface the pipeline actually needs:
//! `chat(model, messages, max_output_tokens?)` and `embed(texts[])`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use spectyra_core::{EMBED_RETRY_ATTEMPTS, HTTP_TIMEOUT_SECS, RETRY_DELAY_MS};

use crate::types::{Message, Role, Usage};

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("upstream request failed: {0}")]
    Request(String),
    #[error("upstream returned an error: {0}")]
    Upstream(String),
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

pub struct ChatResult {
    pub text: String,
    pub usage: Option<Usage>,
}

/// `chat(model, messages, max_output_tokens?) -> {text, usage?}`.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        max_output_tokens: Option<u32>,
    ) -> Result<ChatResult, ProviderError>;
}

/// `embed(texts[]) -> vectors[][]`.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .expect("failed to build reqwest client")
}

// ---------------------------------------------------------------------------
// OpenAI chat completions
// ---------------------------------------------------------------------------

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

pub struct OpenAiChatProvider {
    api_key: String,
    http: reqwest::Client,
}

impl OpenAiChatProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: http_client(),
        }
    }
}

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        // Chat Completions has no tool role for a bare text tool turn in
        // this gateway's usage; fold it into user so the upstream call
        // still sees the content.
        Role::Tool => "user",
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        max_output_tokens: Option<u32>,
    ) -> Result<ChatResult, ProviderError> {
        let body = OpenAiChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: role_str(m.role),
                    content: &m.content,
                })
                .collect(),
            max_tokens: max_output_tokens,
        };

        let response = self
            .http
            .post(OPENAI_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("{status}: {text}")));
        }

        let parsed: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = parsed.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            estimated: false,
        });

        Ok(ChatResult { text, usage })
    }
}

// ---------------------------------------------------------------------------
// DeepSeek chat completions (OpenAI-compatible wire shape, distinct host)
// ---------------------------------------------------------------------------

const DEEPSEEK_CHAT_URL: &str = "https://api.deepseek.com/chat/completions";

pub struct DeepSeekChatProvider {
    api_key: String,
    http: reqwest::Client,
}

impl DeepSeekChatProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: http_client(),
        }
    }
}

#[async_trait]
impl ChatProvider for DeepSeekChatProvider {
    fn name(&self) -> &'static str {
        "deepseek"
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[Message],
        max_output_tokens: Option<u32>,
    ) -> Result<ChatResult, ProviderError> {
        let body = OpenAiChatRequest {
            model,
            messages: messages
                .iter()
                .map(|m| OpenAiMessage {
                    role: role_str(m.role),
                    content: &m.content,
                })
                .collect(),
            max_tokens: max_output_tokens,
        };

        let response = self
            .http
            .post(DEEPSEEK_CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::Upstream(format!("{status}: {text}")));
        }

        let parsed: OpenAiChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        let usage = parsed.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
            estimated: false,
        });

        Ok(ChatResult { text, usage })
    }
}

/// Dispatches to the named provider. Unknown provider names fail fast with
/// `UpstreamUnavailable` at the call site.
pub fn resolve_provider(
    name: &str,
    openai_key: Option<&str>,
    deepseek_key: Option<&str>,
) -> Option<Box<dyn ChatProvider>> {
    match name {
        "openai" => openai_key.map(|k| Box::new(OpenAiChatProvider::new(k.to_string())) as Box<dyn ChatProvider>),
        "deepseek" => deepseek_key
            .map(|k| Box::new(DeepSeekChatProvider::new(k.to_string())) as Box<dyn ChatProvider>),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Gemini embeddings
// ---------------------------------------------------------------------------

const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

/// Fixed embedding dimension produced by `gemini-embedding-001` at the
/// dimensionality this gateway requests — one fixed-size embedding per unit.
pub const EMBEDDING_DIM: u32 = 768;

pub struct GeminiEmbedder {
    api_key: String,
    http: reqwest::Client,
}

impl GeminiEmbedder {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            http: http_client(),
        }
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let url = format!("{GEMINI_EMBED_URL}?key={}", self.api_key);
        let body = serde_json::json!({
            "model": "models/gemini-embedding-001",
            "content": { "parts": [{ "text": text }] },
            "outputDimensionality": EMBEDDING_DIM,
        });

        let mut last_err = None;
        for attempt in 0..=EMBED_RETRY_ATTEMPTS {
            if attempt > 0 {
                debug!(attempt, "retrying embedder call");
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
            }

            let sent = self.http.post(&url).json(&body).send().await;
            let response = match sent {
                Ok(r) => r,
                Err(e) => {
                    last_err = Some(ProviderError::Request(e.to_string()));
                    continue;
                }
            };

            if !response.status().is_success() {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                last_err = Some(ProviderError::Upstream(format!("{status}: {text}")));
                continue;
            }

            let json: serde_json::Value = match response.json().await {
                Ok(j) => j,
                Err(e) => {
                    last_err = Some(ProviderError::Malformed(e.to_string()));
                    continue;
                }
            };

            let values = json["embedding"]["values"].as_array().cloned();
            match values {
                Some(values) => {
                    return Ok(values
                        .iter()
                        .filter_map(|v| v.as_f64().map(|f| f as f32))
                        .collect());
                }
                None => {
                    last_err = Some(ProviderError::Malformed(
                        "missing embedding.values in response".to_string(),
                    ));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| ProviderError::Malformed("embed retries exhausted".into())))
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed_one(text).await?);
        }
        Ok(out)
    }
}

/// Deterministic local embedder for tests and offline dry runs: hashes
/// character n-grams into a fixed-width bag-of-features vector. Not
/// semantically meaningful, but stable and dependency-free so pipeline
/// tests don't need network access.
pub struct HashingEmbedder {
    pub dim: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self { dim: 32 }
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|t| hash_embed(t, self.dim)).collect())
    }
}

fn hash_embed(text: &str, dim: usize) -> Vec<f32> {
    let mut v = vec![0.0_f32; dim];
    for word in text.split_whitespace() {
        let h = spectyra_core::hash_prefix(word);
        let bucket = h
            .bytes()
            .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize))
            % dim;
        v[bucket] += 1.0;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 1e-6 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}
