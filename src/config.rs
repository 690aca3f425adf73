//! TOML configuration and environment secrets.
//!
//! Every setting has a default, so running without a config file is valid.
//! Provider credentials are never read from the file: [`Secrets::from_env`]
//! pulls them from the environment and fails fast on the first missing one.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::language::Language;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub workspace: WorkspaceConfig,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub index: IndexConfig,
    pub retrieval: RetrievalConfig,
    pub llm: LlmConfig,
    pub session: SessionConfig,
    pub server: ServerConfig,
    pub fetch: FetchConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Local directory the repository is cloned into.
    pub repo_dir: PathBuf,
    pub language: Language,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            repo_dir: PathBuf::from("repo"),
            language: Language::Python,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ChunkingConfig {
    pub max_chars: usize,
    pub overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            overlap_chars: 200,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub dims: usize,
    pub batch_size: usize,
    /// Overrides the provider's default endpoint.
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "huggingface".to_string(),
            model: "sentence-transformers/all-mpnet-base-v2".to_string(),
            dims: 768,
            batch_size: 32,
            url: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct IndexConfig {
    pub provider: String,
    pub name: String,
    pub metric: String,
    pub cloud: String,
    pub region: String,
    pub upsert_batch_size: usize,
    pub ready_timeout_secs: u64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: "pinecone".to_string(),
            name: "gitinsight".to_string(),
            metric: "cosine".to_string(),
            cloud: "aws".to_string(),
            region: "us-east-1".to_string(),
            upsert_batch_size: 100,
            ready_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    /// `"mmr"` (diversity re-ranking) or `"similarity"` (plain nearest
    /// neighbours).
    pub mode: String,
    /// Chunks handed to the model per question.
    pub k: usize,
    /// Candidates fetched before diversity re-ranking.
    pub fetch_k: usize,
    /// 1.0 ranks purely by relevance, 0.0 purely by diversity.
    pub lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: "mmr".to_string(),
            k: 8,
            fetch_k: 20,
            lambda: 0.5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: String,
    pub model: String,
    pub temperature: Option<f32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            temperature: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SessionConfig {
    /// Give each session its own index and working directory.
    pub isolate: bool,
    /// Chat input that triggers Clear instead of a question.
    pub clear_keyword: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            isolate: false,
            clear_keyword: "clear".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8501".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct FetchConfig {
    pub shallow: bool,
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        // Chunking
        if self.chunking.max_chars == 0 {
            return invalid("chunking.max_chars must be > 0".into());
        }
        if self.chunking.overlap_chars >= self.chunking.max_chars {
            return invalid("chunking.overlap_chars must be < chunking.max_chars".into());
        }

        // Retrieval
        match self.retrieval.mode.as_str() {
            "mmr" | "similarity" => {}
            other => {
                return invalid(format!(
                    "Unknown retrieval mode: '{}'. Must be mmr or similarity.",
                    other
                ))
            }
        }
        if self.retrieval.k == 0 {
            return invalid("retrieval.k must be >= 1".into());
        }
        if self.retrieval.fetch_k < self.retrieval.k {
            return invalid("retrieval.fetch_k must be >= retrieval.k".into());
        }
        if !(0.0..=1.0).contains(&self.retrieval.lambda) {
            return invalid("retrieval.lambda must be in [0.0, 1.0]".into());
        }

        // Embedding
        match self.embedding.provider.as_str() {
            "huggingface" | "openai" | "ollama" | "local" => {}
            other => {
                return invalid(format!(
                    "Unknown embedding provider: '{}'. Must be huggingface, openai, ollama, or local.",
                    other
                ))
            }
        }
        if self.embedding.dims == 0 {
            return invalid("embedding.dims must be > 0".into());
        }
        if self.embedding.batch_size == 0 {
            return invalid("embedding.batch_size must be > 0".into());
        }
        if self.embedding.model.trim().is_empty() {
            return invalid("embedding.model must not be empty".into());
        }

        // Index
        match self.index.provider.as_str() {
            "pinecone" | "memory" => {}
            other => {
                return invalid(format!(
                    "Unknown index provider: '{}'. Must be pinecone or memory.",
                    other
                ))
            }
        }
        if self.index.name.trim().is_empty() {
            return invalid("index.name must not be empty".into());
        }
        match self.index.metric.as_str() {
            "cosine" | "dotproduct" | "euclidean" => {}
            other => {
                return invalid(format!(
                    "Unknown index metric: '{}'. Must be cosine, dotproduct, or euclidean.",
                    other
                ))
            }
        }
        if self.index.upsert_batch_size == 0 {
            return invalid("index.upsert_batch_size must be > 0".into());
        }

        // LLM
        if self.llm.provider != "gemini" {
            return invalid(format!(
                "Unknown llm provider: '{}'. Must be gemini.",
                self.llm.provider
            ));
        }

        if self.session.clear_keyword.trim().is_empty() {
            return invalid("session.clear_keyword must not be empty".into());
        }

        Ok(())
    }
}

/// Provider credentials, read once at startup.
#[derive(Clone, Default)]
pub struct Secrets {
    pub llm_api_key: String,
    pub embedding_api_key: Option<String>,
    pub index_api_key: Option<String>,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets").finish_non_exhaustive()
    }
}

impl Secrets {
    /// Read the credentials the configured providers need from the process
    /// environment.
    pub fn from_env(config: &Config) -> Result<Self, ConfigError> {
        Self::from_lookup(config, |var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(config: &Config, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let require = |var: &'static str| -> Result<String, ConfigError> {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::MissingSecret(var))
        };

        // gemini is the only llm provider
        let llm_api_key = require("GOOGLE_API_KEY")?;

        let embedding_api_key = match embedding_key_var(&config.embedding.provider) {
            Some(var) => Some(require(var)?),
            None => None,
        };

        let index_api_key = match config.index.provider.as_str() {
            "pinecone" => Some(require("PINECONE_API_KEY")?),
            _ => None,
        };

        Ok(Self {
            llm_api_key,
            embedding_api_key,
            index_api_key,
        })
    }
}

fn embedding_key_var(provider: &str) -> Option<&'static str> {
    match provider {
        "huggingface" => Some("HUGGINGFACE_API_KEY"),
        "openai" => Some("OPENAI_API_KEY"),
        _ => None,
    }
}
