//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and concrete implementations:
//! - **[`DisabledProvider`]**: always fails; used when embeddings are not configured.
//! - **[`OpenAIProvider`]**: calls the OpenAI embeddings API.
//! - **[`GeminiProvider`]**: calls Google's `batchEmbedContents` endpoint.
//! - **[`LocalProvider`]**: runs a sentence-embedding model in-process via
//!   fastembed (feature `local-embeddings`); no network calls after the
//!   model download.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to instantiate the provider named by
//! `[embedding].provider`:
//!
//! ```rust
//! use docqa::config::EmbeddingConfig;
//! use docqa::embedding::create_provider;
//!
//! let config = EmbeddingConfig {
//!     provider: "disabled".to_string(),
//!     ..EmbeddingConfig::default()
//! };
//! let provider = create_provider(&config).unwrap();
//! assert_eq!(provider.model_name(), "disabled");
//! ```
//!
//! # Retry Strategy
//!
//! The hosted providers use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors and timeouts → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Every failure, including an exhausted retry budget, surfaces as
//! [`RagError::EmbeddingProvider`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use async_trait::async_trait;
use docqa_core::embedding::Metric;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// A backend that maps texts to fixed-length vectors.
///
/// Implementations must return exactly one vector per input, in input
/// order, and be deterministic for a fixed model version.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the model identifier (e.g. `"all-minilm-l6-v2"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `384`).
    fn dims(&self) -> usize;

    /// Similarity function the vectors are meant to be compared with.
    fn metric(&self) -> Metric {
        Metric::Cosine
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed `texts` in batches of at most `batch_size`, preserving order.
pub async fn embed_batched(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = batch_size.max(1);
    let mut vectors = Vec::with_capacity(texts.len());

    for batch in texts.chunks(batch_size) {
        let embedded = provider.embed(batch).await?;
        if embedded.len() != batch.len() {
            return Err(RagError::embedding(format!(
                "{} returned {} vectors for {} texts",
                provider.model_name(),
                embedded.len(),
                batch.len()
            )));
        }
        vectors.extend(embedded);
    }

    Ok(vectors)
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    provider
        .embed(&[text.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RagError::embedding("Empty embedding response"))
}

// ============ Disabled Provider ============

/// A no-op embedding provider that always returns errors.
pub struct DisabledProvider;

#[async_trait]
impl EmbeddingProvider for DisabledProvider {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::embedding("Embedding provider is disabled"))
    }
}

// ============ Shared HTTP plumbing ============

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send the request built by `build` until it succeeds or the retry budget
/// is exhausted, returning the parsed JSON body.
async fn send_with_retry<F>(
    label: &str,
    max_retries: u32,
    timeout_secs: u64,
    build: F,
) -> Result<serde_json::Value>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            // Exponential backoff: 1s, 2s, 4s, 8s, ...
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        match build().send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| RagError::embedding(format!("{}: invalid JSON: {}", label, e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let message = format!("{} API error {}: {}", label, status, body_text);

                // Rate limited or server error: retry
                if status.as_u16() == 429 || status.is_server_error() {
                    tracing::warn!(attempt, "{}", message);
                    last_err = Some(message);
                    continue;
                }

                return Err(RagError::embedding(message));
            }
            Err(e) if e.is_timeout() => {
                let message = format!("{} request timed out after {}s", label, timeout_secs);
                tracing::warn!(attempt, "{}", message);
                last_err = Some(message);
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "{} request failed", label);
                last_err = Some(format!("{} request failed: {}", label, e));
            }
        }
    }

    Err(RagError::embedding(last_err.unwrap_or_else(|| {
        format!("{} embedding failed after retries", label)
    })))
}

fn parse_vector(values: &serde_json::Value, label: &str) -> Result<Vec<f32>> {
    let values = values
        .as_array()
        .ok_or_else(|| RagError::embedding(format!("Invalid {} response: vector is not an array", label)))?;
    values
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| RagError::embedding(format!("Invalid {} response: non-numeric value", label)))
        })
        .collect()
}

// ============ OpenAI Provider ============

const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAIProvider {
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    max_retries: u32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl OpenAIProvider {
    /// # Errors
    ///
    /// Returns an error if `model` or `dims` is not set in config, or if
    /// `OPENAI_API_KEY` is not in the environment.
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for OpenAI provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow::anyhow!("embedding.dims required for OpenAI provider"))?;
        let api_key = match std::env::var("OPENAI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("OPENAI_API_KEY environment variable not set"),
        };

        Ok(Self {
            model,
            dims,
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/v1/embeddings", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = send_with_retry("OpenAI", self.max_retries, self.timeout_secs, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
        })
        .await?;

        parse_openai_response(&json)
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| RagError::embedding("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| RagError::embedding("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Gemini Provider ============

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const GEMINI_DEFAULT_MODEL: &str = "embedding-001";
const GEMINI_DEFAULT_DIMS: usize = 768;

/// Embedding provider using Google's Generative Language API.
///
/// Requires the `GEMINI_API_KEY` environment variable.
pub struct GeminiProvider {
    model: String,
    dims: usize,
    api_key: String,
    base_url: String,
    max_retries: u32,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let api_key = match std::env::var("GEMINI_API_KEY") {
            Ok(key) => key,
            Err(_) => bail!("GEMINI_API_KEY environment variable not set"),
        };
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| GEMINI_DEFAULT_MODEL.to_string());

        Ok(Self {
            model: model.trim_start_matches("models/").to_string(),
            dims: config.dims.unwrap_or(GEMINI_DEFAULT_DIMS),
            api_key,
            base_url: config
                .url
                .clone()
                .unwrap_or_else(|| GEMINI_BASE_URL.to_string()),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
            client: http_client(config.timeout_secs)?,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!(
            "{}/v1beta/models/{}:batchEmbedContents",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let model_ref = format!("models/{}", self.model);
        let requests: Vec<serde_json::Value> = texts
            .iter()
            .map(|text| {
                serde_json::json!({
                    "model": model_ref,
                    "content": { "parts": [{ "text": text }] },
                })
            })
            .collect();
        let body = serde_json::json!({ "requests": requests });

        let json = send_with_retry("Gemini", self.max_retries, self.timeout_secs, || {
            self.client
                .post(&url)
                .header("x-goog-api-key", &self.api_key)
                .json(&body)
        })
        .await?;

        parse_gemini_response(&json)
    }
}

fn parse_gemini_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| RagError::embedding("Invalid Gemini response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|item| {
            let values = item
                .get("values")
                .ok_or_else(|| RagError::embedding("Invalid Gemini response: missing values"))?;
            parse_vector(values, "Gemini")
        })
        .collect()
}

// ============ Local Provider (fastembed) ============

/// In-process sentence embeddings via fastembed.
///
/// The model is loaded lazily on first use and kept for the lifetime of
/// the provider. Inference runs on the blocking thread pool.
#[cfg(feature = "local-embeddings")]
pub struct LocalProvider {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
    loaded: Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings")]
impl LocalProvider {
    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "all-minilm-l6-v2".to_string());
        let (model, default_dims) = config_to_fastembed_model(&model_name)?;

        Ok(Self {
            model_name,
            model,
            dims: config.dims.unwrap_or(default_dims),
            batch_size: config.batch_size,
            loaded: Arc::new(std::sync::Mutex::new(None)),
        })
    }
}

#[cfg(feature = "local-embeddings")]
fn config_to_fastembed_model(name: &str) -> anyhow::Result<(fastembed::EmbeddingModel, usize)> {
    match name {
        "all-minilm-l6-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML6V2, 384)),
        "all-minilm-l12-v2" => Ok((fastembed::EmbeddingModel::AllMiniLML12V2, 384)),
        "bge-small-en-v1.5" => Ok((fastembed::EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((fastembed::EmbeddingModel::BGEBaseENV15, 768)),
        "multilingual-e5-small" => Ok((fastembed::EmbeddingModel::MultilingualE5Small, 384)),
        other => bail!(
            "Unknown local embedding model: '{}'. Supported: all-minilm-l6-v2, all-minilm-l12-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, multilingual-e5-small",
            other
        ),
    }
}

#[cfg(feature = "local-embeddings")]
#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let loaded = Arc::clone(&self.loaded);
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| RagError::embedding("local embedding model lock poisoned"))?;
            if guard.is_none() {
                tracing::info!(model = ?model, "loading local embedding model");
                let instance = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(false),
                )
                .map_err(|e| {
                    RagError::embedding(format!("Failed to initialize local embedding model: {}", e))
                })?;
                *guard = Some(instance);
            }
            let Some(instance) = guard.as_mut() else {
                return Err(RagError::embedding("local embedding model unavailable"));
            };
            instance
                .embed(texts, Some(batch_size))
                .map_err(|e| RagError::embedding(format!("Local embedding failed: {}", e)))
        })
        .await
        .map_err(|e| RagError::embedding(format!("local embedding task panicked: {}", e)))?
    }
}

/// Create the [`EmbeddingProvider`] named by the configuration.
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledProvider`] |
/// | `"openai"` | [`OpenAIProvider`] |
/// | `"gemini"` | [`GeminiProvider`] |
/// | `"local"` | `LocalProvider` (feature `local-embeddings`) |
pub fn create_provider(config: &EmbeddingConfig) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "openai" => Ok(Arc::new(OpenAIProvider::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiProvider::new(config)?)),
        #[cfg(feature = "local-embeddings")]
        "local" => Ok(Arc::new(LocalProvider::new(config)?)),
        #[cfg(not(feature = "local-embeddings"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings"),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns `[len, index]` per text and records batch sizes.
    struct Recording {
        batches: std::sync::Mutex<Vec<usize>>,
        drop_last: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for Recording {
        fn model_name(&self) -> &str {
            "recording"
        }
        fn dims(&self) -> usize {
            1
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.batches.lock().unwrap().push(texts.len());
            let mut out: Vec<Vec<f32>> = texts.iter().map(|t| vec![t.len() as f32]).collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    #[tokio::test]
    async fn batched_embedding_preserves_order() {
        let provider = Recording {
            batches: Default::default(),
            drop_last: false,
        };
        let texts: Vec<String> = (1..=5).map(|n| "x".repeat(n)).collect();
        let vectors = embed_batched(&provider, &texts, 2).await.unwrap();
        assert_eq!(vectors, [[1.0], [2.0], [3.0], [4.0], [5.0]]);
        assert_eq!(*provider.batches.lock().unwrap(), [2, 2, 1]);
    }

    #[tokio::test]
    async fn count_mismatch_is_provider_error() {
        let provider = Recording {
            batches: Default::default(),
            drop_last: true,
        };
        let err = embed_batched(&provider, &["a".to_string()], 8)
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingProvider(_)));
    }

    #[tokio::test]
    async fn disabled_provider_fails() {
        let err = embed_query(&DisabledProvider, "q").await.unwrap_err();
        assert_eq!(err.code(), "embedding_error");
    }

    #[test]
    fn openai_response_sorted_by_index() {
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [0.0, 1.0] },
                { "index": 0, "embedding": [1.0, 0.0] },
            ]
        });
        assert_eq!(
            parse_openai_response(&json).unwrap(),
            [vec![1.0, 0.0], vec![0.0, 1.0]]
        );
    }

    #[test]
    fn gemini_response_parsed() {
        let json = serde_json::json!({
            "embeddings": [{ "values": [0.5, 0.25] }, { "values": [1.0, 0.0] }]
        });
        assert_eq!(
            parse_gemini_response(&json).unwrap(),
            [vec![0.5, 0.25], vec![1.0, 0.0]]
        );
        assert!(parse_gemini_response(&serde_json::json!({})).is_err());
    }

    #[test]
    fn unknown_provider_rejected() {
        let config = EmbeddingConfig {
            provider: "magic".to_string(),
            ..EmbeddingConfig::default()
        };
        assert!(create_provider(&config).is_err());
    }
}
