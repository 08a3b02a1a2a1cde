//! Pluggable embedding providers for vector search.
//!
//! Provides a trait-based abstraction over embedding models, with a local
//! hashed term-frequency embedder (always available, deterministic) and an
//! HTTP embedder for OpenAI and Azure OpenAI deployments.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::LlmError;
use crate::providers::openai_compat::DEFAULT_AZURE_API_VERSION;

/// Trait for embedding providers.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the provider name.
    fn provider_name(&self) -> &str;
}

/// Local hashed term-frequency embedder.
///
/// Each lowercase alphanumeric term is hashed into a bucket and the vector is
/// L2-normalised, so texts sharing vocabulary land close together.
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    /// Synchronous embedding, used by the store when indexing snapshots.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            *tf.entry(word).or_insert(0) += 1;
        }

        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

/// djb2 string hash.
fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn provider_name(&self) -> &str {
        "local"
    }
}

/// OpenAI / Azure OpenAI embeddings endpoint client.
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    url: String,
    auth: EmbedAuth,
    model: String,
    dims: usize,
    timeout_secs: u64,
}

enum EmbedAuth {
    Bearer(String),
    AzureKey(String),
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self, LlmError> {
        let azure = config.provider == "azure";
        let (url, auth) = if azure {
            let resource = config
                .base_url
                .as_deref()
                .ok_or_else(|| LlmError::ApiRequest {
                    message: "azure embeddings require base_url".to_string(),
                })?
                .trim_end_matches('/');
            (
                format!(
                    "{}/openai/deployments/{}/embeddings?api-version={}",
                    resource,
                    config.model,
                    config
                        .api_version
                        .as_deref()
                        .unwrap_or(DEFAULT_AZURE_API_VERSION)
                ),
                EmbedAuth::AzureKey(api_key),
            )
        } else {
            let base = config
                .base_url
                .as_deref()
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/');
            (format!("{}/embeddings", base), EmbedAuth::Bearer(api_key))
        };

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection {
                message: format!("Failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            url,
            auth,
            model: config.model.clone(),
            dims: config.dimensions,
            timeout_secs: config.timeout_secs,
        })
    }

    fn parse_embedding(body: &Value) -> Result<Vec<f32>, LlmError> {
        let values = body["data"][0]["embedding"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No embedding in response".to_string(),
            })?;
        let vector: Vec<f32> = values
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        if vector.is_empty() {
            return Err(LlmError::EmptyResponse);
        }
        Ok(vector)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut body = json!({ "model": self.model, "input": text });
        if self.model.starts_with("text-embedding-3") && self.dims > 0 {
            body["dimensions"] = json!(self.dims);
        }

        let request = self.client.post(&self.url).json(&body);
        let request = match &self.auth {
            EmbedAuth::Bearer(key) => request.bearer_auth(key),
            EmbedAuth::AzureKey(key) => request.header("api-key", key),
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LlmError::Timeout {
                    timeout_secs: self.timeout_secs,
                }
            } else {
                LlmError::Connection {
                    message: e.to_string(),
                }
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiRequest {
                message: format!("Embedding request failed ({}): {}", status, text),
            });
        }

        let json: Value = response.json().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Invalid JSON: {}", e),
        })?;
        Self::parse_embedding(&json)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn provider_name(&self) -> &str {
        match self.auth {
            EmbedAuth::Bearer(_) => "openai",
            EmbedAuth::AzureKey(_) => "azure",
        }
    }
}

/// Create an embedder based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, LlmError> {
    match config.provider.as_str() {
        "openai" | "azure" => {
            let api_key = std::env::var(&config.api_key_env)
                .ok()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| LlmError::AuthFailed {
                    provider: format!(
                        "{} embeddings: env var '{}' not set",
                        config.provider, config.api_key_env
                    ),
                })?;
            Ok(Arc::new(OpenAiEmbedder::new(config, api_key)?))
        }
        "local" => Ok(Arc::new(LocalEmbedder::new(config.dimensions))),
        other => {
            tracing::warn!("Unknown embedding provider '{}', using local", other);
            Ok(Arc::new(LocalEmbedder::new(config.dimensions)))
        }
    }
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
