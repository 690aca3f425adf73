//! Ingestion pipeline orchestration.
//!
//! Coordinates the flow from a checked-out repository to a populated index:
//! loader → splitter → ensure index → embedding → upsert.
//!
//! The index is ensured before any text is embedded, so a mismatched
//! existing index fails the run before any embedding call is paid for.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::chunk::Splitter;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::IngestError;
use crate::index::{EnsureOutcome, IndexSpec, VectorIndex};
use crate::loader::load_documents;
use crate::models::VectorRecord;
use crate::present;
use crate::session::Services;

/// What one ingestion run did.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct IngestReport {
    pub index_name: String,
    pub documents: usize,
    pub chunks: usize,
    pub upserted: usize,
    /// `true` when the index did not exist before this run.
    pub index_created: bool,
}

/// Load, split, embed and upsert every matching file under `dir` into
/// `index_name`, creating the index if needed.
pub async fn ingest_directory(
    config: &Config,
    dir: &Path,
    index_name: &str,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
) -> Result<IngestReport, IngestError> {
    let language = config.workspace.language;

    let documents = load_documents(dir, language)?;
    if documents.is_empty() {
        return Err(IngestError::NoDocuments {
            language: language.to_string(),
            path: dir.to_path_buf(),
        });
    }

    let splitter = Splitter::from_config(language, &config.chunking);
    let chunks = splitter.split_documents(&documents);
    tracing::info!(
        documents = documents.len(),
        chunks = chunks.len(),
        "split documents"
    );

    let spec = IndexSpec::new(&config.index, index_name, embedder.dims());
    let outcome = index.ensure_index(&spec).await?;
    tracing::info!(index = index_name, ?outcome, "index ready");

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_documents(&texts).await?;
    tracing::debug!(count = vectors.len(), model = embedder.model_name(), "embedded chunks");

    let records: Vec<VectorRecord> = chunks
        .iter()
        .zip(vectors)
        .map(|(chunk, values)| VectorRecord::from_chunk(chunk, values))
        .collect();

    let upserted = index.upsert(index_name, &records).await?;
    tracing::info!(index = index_name, upserted, "stored chunks");

    Ok(IngestReport {
        index_name: index_name.to_string(),
        documents: documents.len(),
        chunks: chunks.len(),
        upserted,
        index_created: outcome == EnsureOutcome::Created,
    })
}

/// `gitinsight ingest`: ingest an already checked-out directory.
pub async fn run_ingest(
    services: &Services,
    dir: Option<PathBuf>,
    index_name: Option<String>,
) -> Result<()> {
    let config = &services.config;
    let dir = dir.unwrap_or_else(|| config.workspace.repo_dir.clone());
    let index_name = index_name.unwrap_or_else(|| config.index.name.clone());

    let report = ingest_directory(
        config,
        &dir,
        &index_name,
        services.embedder.as_ref(),
        services.index.as_ref(),
    )
    .await
    .with_context(|| format!("Failed to ingest {}", dir.display()))?;

    println!("{}", present::index_status(&report));
    println!("{}", present::stored_chunks(&report));
    Ok(())
}
