//! Embedding providers.
//!
//! Concrete [`Embedder`] implementations selected by `embedding.provider`:
//! - **[`DisabledEmbedder`]**: store-only mode. Reports `dims() == 0`; the
//!   vector writer persists segments without embeddings and never calls it.
//! - **[`OpenAiEmbedder`]**: `POST {url}/v1/embeddings`. The bearer key is
//!   the caller's credential when one is supplied, else `OPENAI_API_KEY`.
//! - **[`OllamaEmbedder`]**: `POST {url}/api/embed` on a local Ollama.
//!
//! # Retry Strategy
//!
//! Both HTTP providers retry transient failures with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Once retries are exhausted the error is returned with its transient flag
//! still set, so callers can tell a flaky upstream from a rejected request.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use brainstore_core::embedding::Embedder;
use brainstore_core::Error;

use crate::config::EmbeddingConfig;

const OPENAI_URL: &str = "https://api.openai.com";
const OLLAMA_URL: &str = "http://localhost:11434";

/// Build the embedder named by `config.provider`.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledEmbedder)),
        "openai" => Ok(Arc::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaEmbedder::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ Disabled ============

/// Embedder for store-only mode.
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(
        &self,
        _texts: &[String],
        _credential: Option<&str>,
    ) -> brainstore_core::Result<Vec<Vec<f32>>> {
        Err(Error::embedding("Embedding provider is disabled", false))
    }
}

// ============ Shared HTTP plumbing ============

struct HttpSettings {
    client: reqwest::Client,
    model: String,
    dims: usize,
    url: String,
    max_retries: u32,
}

impl HttpSettings {
    fn from_config(config: &EmbeddingConfig, provider: &str, default_url: &str) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for {} provider", provider))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for {} provider", provider))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| default_url.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            client,
            model,
            dims,
            url,
            max_retries: config.max_retries,
        })
    }

    /// POST `body` to `endpoint` with retry/backoff and return the JSON reply.
    async fn post_json(
        &self,
        provider: &str,
        endpoint: &str,
        bearer: Option<&str>,
        body: &serde_json::Value,
    ) -> brainstore_core::Result<serde_json::Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tracing::debug!(provider, attempt, delay_secs = delay.as_secs(), "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(endpoint).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json().await.map_err(|e| {
                            Error::embedding(format!("{} returned invalid JSON: {}", provider, e), false)
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let message = format!("{} API error {}: {}", provider, status, body_text);

                    if status.as_u16() == 429 || status.is_server_error() {
                        tracing::warn!(provider, %status, attempt, "transient embedding failure");
                        last_err = Some(Error::embedding(message, true));
                        continue;
                    }

                    return Err(Error::embedding(message, false));
                }
                Err(e) => {
                    tracing::warn!(provider, error = %e, attempt, "embedding request failed");
                    last_err = Some(Error::embedding(
                        format!("{} connection error ({}): {}", provider, self.url, e),
                        true,
                    ));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            Error::embedding(format!("{} embedding failed after retries", provider), true)
        }))
    }
}

fn parse_float_array(value: &serde_json::Value, what: &str) -> brainstore_core::Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| Error::embedding(format!("Invalid {} response: embedding is not an array", what), false))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| Error::embedding(format!("Invalid {} response: non-numeric value", what), false))
        })
        .collect()
}

fn check_count(got: usize, expected: usize, what: &str) -> brainstore_core::Result<()> {
    if got != expected {
        return Err(Error::embedding(
            format!("{} returned {} embeddings for {} inputs", what, got, expected),
            false,
        ));
    }
    Ok(())
}

// ============ OpenAI ============

/// Embedder backed by the OpenAI embeddings API.
pub struct OpenAiEmbedder {
    http: HttpSettings,
    server_key: Option<String>,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let http = HttpSettings::from_config(config, "OpenAI", OPENAI_URL)?;
        let server_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty());
        if server_key.is_none() {
            tracing::warn!("OPENAI_API_KEY not set; uploads must supply their own key");
        }
        Ok(Self { http, server_key })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    fn dims(&self) -> usize {
        self.http.dims
    }

    async fn embed(
        &self,
        texts: &[String],
        credential: Option<&str>,
    ) -> brainstore_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let key = credential
            .or(self.server_key.as_deref())
            .ok_or_else(|| Error::embedding("no OpenAI API key available", false))?;

        let body = serde_json::json!({
            "model": self.http.model,
            "input": texts,
        });
        let json = self
            .http
            .post_json(
                "OpenAI",
                &format!("{}/v1/embeddings", self.http.url),
                Some(key),
                &body,
            )
            .await?;

        let embeddings = parse_openai_response(&json)?;
        check_count(embeddings.len(), texts.len(), "OpenAI")?;
        Ok(embeddings)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> brainstore_core::Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::embedding("Invalid OpenAI response: missing data array", false))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        let embedding = item
            .get("embedding")
            .ok_or_else(|| Error::embedding("Invalid OpenAI response: missing embedding", false))?;
        indexed.push((index, parse_float_array(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(index, _)| *index);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance. The caller credential is
/// ignored.
pub struct OllamaEmbedder {
    http: HttpSettings,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            http: HttpSettings::from_config(config, "Ollama", OLLAMA_URL)?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.http.model
    }

    fn dims(&self) -> usize {
        self.http.dims
    }

    async fn embed(
        &self,
        texts: &[String],
        _credential: Option<&str>,
    ) -> brainstore_core::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let body = serde_json::json!({
            "model": self.http.model,
            "input": texts,
        });
        let json = self
            .http
            .post_json("Ollama", &format!("{}/api/embed", self.http.url), None, &body)
            .await?;

        let embeddings = parse_ollama_response(&json)?;
        check_count(embeddings.len(), texts.len(), "Ollama")?;
        Ok(embeddings)
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> brainstore_core::Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| Error::embedding("Invalid Ollama response: missing embeddings array", false))?
        .iter()
        .map(|e| parse_float_array(e, "Ollama"))
        .collect()
}
