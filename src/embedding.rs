//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and concrete implementations:
//! - **[`HuggingFaceEmbedder`]** calls the Hugging Face inference
//!   feature-extraction pipeline (default, `all-mpnet-base-v2`, 768 dims).
//! - **[`OpenAIEmbedder`]** calls the OpenAI embeddings API.
//! - **[`OllamaEmbedder`]** calls a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalEmbedder`** runs models in-process via fastembed (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! Also provides [`cosine_similarity`], shared by the in-memory index and
//! the MMR re-ranker.
//!
//! # Provider Selection
//!
//! Use [`create_embedder`] to instantiate the provider named by
//! `embedding.provider`:
//!
//! ```rust,no_run
//! # use gitinsight::config::{Config, Secrets};
//! # use gitinsight::embedding::create_embedder;
//! let config = Config::default(); // provider = "huggingface"
//! let secrets = Secrets::from_env(&config).unwrap();
//! let embedder = create_embedder(&config.embedding, &secrets).unwrap();
//! assert_eq!(embedder.dims(), 768);
//! ```
//!
//! # Failures
//!
//! Requests are sent once. A non-success status surfaces as
//! [`EmbedError::Api`] with the response body; the caller decides whether
//! to try again.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{EmbeddingConfig, Secrets};
use crate::error::{ConfigError, EmbedError};

/// Turns text into fixed-length vectors.
///
/// Implementors provide [`embed_batch`](Embedder::embed_batch), a single
/// request; batching and dimension checks live in the provided methods.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the model identifier (e.g. `"sentence-transformers/all-mpnet-base-v2"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;
    /// Maximum number of texts per provider request.
    fn batch_size(&self) -> usize {
        32
    }

    /// Embed one batch with a single provider call.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Embed any number of texts, one vector per input, in input order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size().max(1)) {
            let embedded = self.embed_batch(batch).await?;
            if embedded.len() != batch.len() {
                return Err(EmbedError::BadResponse {
                    provider: "embedder",
                    reason: format!("sent {} texts, got {} vectors", batch.len(), embedded.len()),
                });
            }
            for vector in &embedded {
                if vector.len() != self.dims() {
                    return Err(EmbedError::BadResponse {
                        provider: "embedder",
                        reason: format!(
                            "model {} returned {} dims, expected {}",
                            self.model_name(),
                            vector.len(),
                            self.dims()
                        ),
                    });
                }
            }
            vectors.extend(embedded);
        }
        Ok(vectors)
    }

    /// Embed a single query text.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_documents(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::BadResponse {
                provider: "embedder",
                reason: "empty embedding response".to_string(),
            })
    }
}

/// Send a JSON body and return the parsed JSON response, mapping failures
/// onto [`EmbedError`].
async fn send_json(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value, EmbedError> {
    let response = request
        .json(body)
        .send()
        .await
        .map_err(|source| EmbedError::Transport { provider, source })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(EmbedError::Api {
            provider,
            status: status.as_u16(),
            body,
        });
    }

    response
        .json()
        .await
        .map_err(|source| EmbedError::Transport { provider, source })
}

fn float_array(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

// ============ Hugging Face Provider ============

const HF_PROVIDER: &str = "huggingface";

/// Embedding provider using the Hugging Face inference API.
///
/// Posts `{"inputs": [...]}` to the model's feature-extraction pipeline
/// with a bearer token from `HUGGINGFACE_API_KEY`.
pub struct HuggingFaceEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl HuggingFaceEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Self {
        let url = config.url.clone().unwrap_or_else(|| {
            format!(
                "https://router.huggingface.co/hf-inference/models/{}/pipeline/feature-extraction",
                config.model
            )
        });
        Self {
            client: reqwest::Client::new(),
            url,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
        }
    }
}

#[async_trait]
impl Embedder for HuggingFaceEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({ "inputs": texts });
        let request = self.client.post(&self.url).bearer_auth(&self.api_key);
        let json = send_json(HF_PROVIDER, request, &body).await?;
        parse_huggingface_response(&json)
    }
}

/// Parse a feature-extraction response.
///
/// Sentence-transformer models return one pooled vector per input
/// (`[[f32]]`). Raw encoder models return per-token vectors
/// (`[[[f32]]]`), which are mean-pooled here.
fn parse_huggingface_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let bad = |reason: &str| EmbedError::BadResponse {
        provider: HF_PROVIDER,
        reason: reason.to_string(),
    };

    if let Some(message) = json.get("error").and_then(|e| e.as_str()) {
        return Err(bad(message));
    }

    let items = json.as_array().ok_or_else(|| bad("expected an array"))?;

    items
        .iter()
        .map(|item| {
            if let Some(vector) = float_array(item) {
                return Ok(vector);
            }
            let tokens: Vec<Vec<f32>> = item
                .as_array()
                .ok_or_else(|| bad("embedding is not an array"))?
                .iter()
                .map(float_array)
                .collect::<Option<_>>()
                .ok_or_else(|| bad("embedding contains non-numeric values"))?;
            mean_pool(&tokens).ok_or_else(|| bad("empty token embedding"))
        })
        .collect()
}

fn mean_pool(tokens: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = tokens.first()?;
    let mut sum = vec![0.0f32; first.len()];
    for token in tokens {
        for (acc, v) in sum.iter_mut().zip(token) {
            *acc += v;
        }
    }
    let n = tokens.len() as f32;
    Some(sum.into_iter().map(|v| v / n).collect())
}

// ============ OpenAI Provider ============

const OPENAI_PROVIDER: &str = "openai";

/// Embedding provider using the OpenAI API.
///
/// Calls `POST /v1/embeddings` with the configured model. Requires the
/// `OPENAI_API_KEY` environment variable.
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl OpenAIEmbedder {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1/embeddings".to_string()),
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
        }
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let request = self.client.post(&self.url).bearer_auth(&self.api_key);
        let json = send_json(OPENAI_PROVIDER, request, &body).await?;
        parse_openai_response(&json)
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays, ordered by their `index` field.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let bad = |reason: &str| EmbedError::BadResponse {
        provider: OPENAI_PROVIDER,
        reason: reason.to_string(),
    };

    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| bad("missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(float_array)
            .ok_or_else(|| bad("missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, embedding));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Provider ============

const OLLAMA_PROVIDER: &str = "ollama";

/// Embedding provider using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default:
/// `http://localhost:11434`). Requires an embedding model pulled in Ollama.
pub struct OllamaEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434".to_string());
        Self {
            client: reqwest::Client::new(),
            url: format!("{}/api/embed", base.trim_end_matches('/')),
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size,
        }
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = send_json(OLLAMA_PROVIDER, self.client.post(&self.url), &body).await?;
        parse_ollama_response(&json)
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let bad = |reason: &str| EmbedError::BadResponse {
        provider: OLLAMA_PROVIDER,
        reason: reason.to_string(),
    };

    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| bad("missing embeddings array"))?
        .iter()
        .map(|item| float_array(item).ok_or_else(|| bad("embedding is not an array")))
        .collect()
}

// ============ Local Provider (fastembed) ============

/// Embedding provider running a fastembed model in-process.
///
/// The model is loaded on first use and reused afterwards. Inference runs
/// on the blocking thread pool.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalEmbedder {
    model_name: String,
    model: fastembed::EmbeddingModel,
    dims: usize,
    batch_size: usize,
    loaded: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ConfigError> {
        let (model, dims) = resolve_local_model(&config.model)?;
        if dims != config.dims {
            return Err(ConfigError::Invalid(format!(
                "embedding.dims is {} but local model '{}' produces {}",
                config.dims, config.model, dims
            )));
        }
        Ok(Self {
            model_name: config.model.clone(),
            model,
            dims,
            batch_size: config.batch_size,
            loaded: Default::default(),
        })
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn resolve_local_model(name: &str) -> Result<(fastembed::EmbeddingModel, usize), ConfigError> {
    use fastembed::EmbeddingModel;

    match name.to_ascii_lowercase().trim_start_matches("sentence-transformers/") {
        "all-minilm-l6-v2" => Ok((EmbeddingModel::AllMiniLML6V2, 384)),
        "bge-small-en-v1.5" => Ok((EmbeddingModel::BGESmallENV15, 384)),
        "bge-base-en-v1.5" => Ok((EmbeddingModel::BGEBaseENV15, 768)),
        "bge-large-en-v1.5" => Ok((EmbeddingModel::BGELargeENV15, 1024)),
        "nomic-embed-text-v1.5" => Ok((EmbeddingModel::NomicEmbedTextV15, 768)),
        "paraphrase-multilingual-mpnet-base-v2" => {
            Ok((EmbeddingModel::ParaphraseMLMpnetBaseV2, 768))
        }
        other => Err(ConfigError::Invalid(format!(
            "Unknown local embedding model: '{}'",
            other
        ))),
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        &self.model_name
    }
    fn dims(&self) -> usize {
        self.dims
    }
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let loaded = self.loaded.clone();
        let model = self.model.clone();
        let batch_size = self.batch_size;
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut guard = loaded
                .lock()
                .map_err(|_| EmbedError::Local("model lock poisoned".to_string()))?;
            if guard.is_none() {
                let init = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(model).with_show_download_progress(true),
                )
                .map_err(|e| EmbedError::Local(format!("failed to load model: {}", e)))?;
                *guard = Some(init);
            }
            match guard.as_mut() {
                Some(embedding) => embedding
                    .embed(texts, Some(batch_size))
                    .map_err(|e| EmbedError::Local(e.to_string())),
                None => Err(EmbedError::Local("model not loaded".to_string())),
            }
        })
        .await
        .map_err(|e| EmbedError::Local(e.to_string()))?
    }
}

/// Create the [`Embedder`] named by `embedding.provider`.
///
/// # Supported Providers
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"huggingface"` | [`HuggingFaceEmbedder`] |
/// | `"openai"` | [`OpenAIEmbedder`] |
/// | `"ollama"` | [`OllamaEmbedder`] |
/// | `"local"` | `LocalEmbedder` (requires `local-embeddings-fastembed`) |
pub fn create_embedder(
    config: &EmbeddingConfig,
    secrets: &Secrets,
) -> Result<std::sync::Arc<dyn Embedder>, ConfigError> {
    let key = |var: &'static str| {
        secrets
            .embedding_api_key
            .clone()
            .ok_or(ConfigError::MissingSecret(var))
    };

    match config.provider.as_str() {
        "huggingface" => Ok(std::sync::Arc::new(HuggingFaceEmbedder::new(
            config,
            key("HUGGINGFACE_API_KEY")?,
        ))),
        "openai" => Ok(std::sync::Arc::new(OpenAIEmbedder::new(
            config,
            key("OPENAI_API_KEY")?,
        ))),
        "ollama" => Ok(std::sync::Arc::new(OllamaEmbedder::new(config))),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(std::sync::Arc::new(LocalEmbedder::new(config)?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(ConfigError::Invalid(
            "Local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        other => Err(ConfigError::Invalid(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, zero vectors, or vectors of different
/// lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_parse_huggingface_pooled() {
        let json = json!([[0.1, 0.2], [0.3, 0.4]]);
        let vectors = parse_huggingface_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[test]
    fn test_parse_huggingface_token_level_is_mean_pooled() {
        let json = json!([[[1.0, 2.0], [3.0, 4.0]]]);
        let vectors = parse_huggingface_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![2.0, 3.0]]);
    }

    #[test]
    fn test_parse_huggingface_error_payload() {
        let json = json!({"error": "Model is loading"});
        let err = parse_huggingface_response(&json).unwrap_err();
        assert!(err.to_string().contains("Model is loading"));
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]}
            ]
        });
        let vectors = parse_openai_response(&json).unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_openai_missing_data() {
        assert!(parse_openai_response(&json!({"object": "list"})).is_err());
    }

    #[test]
    fn test_parse_ollama() {
        let json = json!({"embeddings": [[0.5, 0.5, 0.5]]});
        assert_eq!(parse_ollama_response(&json).unwrap(), vec![vec![0.5, 0.5, 0.5]]);
        assert!(parse_ollama_response(&json!({})).is_err());
    }

    #[test]
    fn test_create_embedder_needs_key() {
        let secrets = Secrets {
            llm_api_key: "g".to_string(),
            embedding_api_key: None,
            index_api_key: None,
        };
        let err = create_embedder(&EmbeddingConfig::default(), &secrets)
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::MissingSecret("HUGGINGFACE_API_KEY")));
    }

    #[test]
    fn test_create_embedder_default_huggingface() {
        let secrets = Secrets {
            llm_api_key: "g".to_string(),
            embedding_api_key: Some("h".to_string()),
            index_api_key: None,
        };
        let embedder = create_embedder(&EmbeddingConfig::default(), &secrets).unwrap();
        assert_eq!(embedder.model_name(), "sentence-transformers/all-mpnet-base-v2");
        assert_eq!(embedder.dims(), 768);
    }

    /// Returns `[len, batch_number]` per text and counts calls.
    struct CountingEmbedder {
        calls: AtomicUsize,
        dims: usize,
    }

    #[async_trait]
    impl Embedder for CountingEmbedder {
        fn model_name(&self) -> &str {
            "counting"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        fn batch_size(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as f32;
            Ok(texts.iter().map(|t| vec![t.len() as f32, call]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_documents_batches_in_order() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
            dims: 2,
        };
        let texts: Vec<String> = ["a", "bb", "ccc", "dddd", "eeeee"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let vectors = embedder.embed_documents(&texts).await.unwrap();

        assert_eq!(embedder.calls.load(Ordering::SeqCst), 3);
        let lens: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(vectors[4][1], 2.0);
    }

    #[tokio::test]
    async fn test_embed_documents_rejects_wrong_dims() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
            dims: 3,
        };
        let err = embedder.embed_query("hello").await.unwrap_err();
        assert!(matches!(err, EmbedError::BadResponse { .. }));
    }

    #[tokio::test]
    async fn test_embed_documents_empty_input_makes_no_calls() {
        let embedder = CountingEmbedder {
            calls: AtomicUsize::new(0),
            dims: 2,
        };
        assert!(embedder.embed_documents(&[]).await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }
}
