//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait covers the index lifecycle (ensure, describe,
//! delete) and the two data operations the pipeline needs (upsert, query).
//! Implementations:
//!
//! - [`pinecone::PineconeIndex`] talks to the Pinecone REST API.
//! - [`memory::InMemoryIndex`] keeps everything in process; used for local
//!   runs (`index.provider = "memory"`) and tests.
//!
//! Implementations must be `Send + Sync` so one instance can be shared by
//! every session.

pub mod memory;
pub mod pinecone;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{IndexConfig, Secrets};
use crate::error::{ConfigError, IndexError};
use crate::models::VectorRecord;

/// What an index must look like.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub dims: usize,
    pub metric: String,
    pub cloud: String,
    pub region: String,
}

impl IndexSpec {
    pub fn new(config: &IndexConfig, name: &str, dims: usize) -> Self {
        Self {
            name: name.to_string(),
            dims,
            metric: config.metric.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
        }
    }
}

/// What an existing index reports about itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
    pub name: String,
    pub dims: usize,
    pub metric: String,
    pub ready: bool,
    /// Data-plane host, when the backend has one.
    pub host: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsureOutcome {
    Created,
    Existing,
}

/// A query hit, carrying its stored vector so callers can re-rank.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub id: String,
    pub text: String,
    pub source_path: String,
    pub score: f32,
    pub values: Vec<f32>,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the index if absent and wait until it is ready.
    ///
    /// An existing index is reused only if its dimension and metric match
    /// `spec`; otherwise [`IndexError::ConfigMismatch`].
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsureOutcome, IndexError>;

    /// `None` when no index of that name exists.
    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>, IndexError>;

    /// Delete an index. Returns `false` when it did not exist.
    async fn delete_index(&self, name: &str) -> Result<bool, IndexError>;

    /// Insert or overwrite records by id. Returns the number written.
    async fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<usize, IndexError>;

    /// The `top_k` records nearest to `vector`, best first.
    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Candidate>, IndexError>;
}

/// Fail unless an existing index can serve `spec`.
pub fn check_compatible(spec: &IndexSpec, found: &IndexDescription) -> Result<(), IndexError> {
    if found.dims != spec.dims || found.metric != spec.metric {
        return Err(IndexError::ConfigMismatch {
            name: spec.name.clone(),
            found: format!("dimension {} / metric {}", found.dims, found.metric),
            requested: format!("dimension {} / metric {}", spec.dims, spec.metric),
        });
    }
    Ok(())
}

/// Create the [`VectorIndex`] named by `index.provider`.
pub fn create_index(
    config: &IndexConfig,
    secrets: &Secrets,
) -> Result<Arc<dyn VectorIndex>, ConfigError> {
    match config.provider.as_str() {
        "pinecone" => {
            let api_key = secrets
                .index_api_key
                .clone()
                .ok_or(ConfigError::MissingSecret("PINECONE_API_KEY"))?;
            Ok(Arc::new(pinecone::PineconeIndex::new(config, api_key)))
        }
        "memory" => Ok(Arc::new(memory::InMemoryIndex::new())),
        other => Err(ConfigError::Invalid(format!(
            "Unknown index provider: {}",
            other
        ))),
    }
}
