//! Retrieval over a [`VectorIndex`].
//!
//! Two strategies:
//!
//! - **Similarity** returns the `k` nearest chunks as the index ranks them.
//! - **MMR** (maximal marginal relevance) fetches `fetch_k` candidates and
//!   greedily picks `k` that balance relevance to the query against
//!   redundancy with chunks already picked:
//!
//! ```text
//! mmr(d) = λ · sim(q, d) − (1 − λ) · max_{s ∈ selected} sim(d, s)
//! ```
//!
//! With λ = 1 MMR degenerates to similarity order; with λ = 0 it only
//! rewards novelty. The first pick is always the most relevant candidate.

use crate::config::RetrievalConfig;
use crate::embedding::cosine_similarity;
use crate::error::IndexError;
use crate::index::VectorIndex;
use crate::models::ScoredChunk;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchStrategy {
    Similarity { k: usize },
    Mmr { k: usize, fetch_k: usize, lambda: f32 },
}

impl SearchStrategy {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        match config.mode.as_str() {
            "similarity" => SearchStrategy::Similarity { k: config.k },
            _ => SearchStrategy::Mmr {
                k: config.k,
                fetch_k: config.fetch_k,
                lambda: config.lambda,
            },
        }
    }
}

/// Fetch the chunks that best answer `query_vector`, best first.
pub async fn retrieve(
    index: &dyn VectorIndex,
    index_name: &str,
    query_vector: &[f32],
    strategy: SearchStrategy,
) -> Result<Vec<ScoredChunk>, IndexError> {
    let to_scored = |c: &crate::index::Candidate| ScoredChunk {
        text: c.text.clone(),
        source_path: c.source_path.clone(),
        score: c.score,
    };

    match strategy {
        SearchStrategy::Similarity { k } => {
            let hits = index.query(index_name, query_vector, k).await?;
            Ok(hits.iter().map(to_scored).collect())
        }
        SearchStrategy::Mmr { k, fetch_k, lambda } => {
            let candidates = index
                .query(index_name, query_vector, fetch_k.max(k))
                .await?;
            let vectors: Vec<&[f32]> = candidates.iter().map(|c| c.values.as_slice()).collect();
            let picked = maximal_marginal_relevance(query_vector, &vectors, k, lambda);
            tracing::debug!(
                candidates = candidates.len(),
                picked = picked.len(),
                "mmr re-ranked"
            );
            Ok(picked.into_iter().map(|i| to_scored(&candidates[i])).collect())
        }
    }
}

/// Indices into `candidates` chosen by MMR, in pick order.
///
/// Returns at most `k` indices; fewer when there are fewer candidates.
/// Ties keep the earlier candidate.
pub fn maximal_marginal_relevance(
    query: &[f32],
    candidates: &[&[f32]],
    k: usize,
    lambda: f32,
) -> Vec<usize> {
    let relevance: Vec<f32> = candidates
        .iter()
        .map(|c| cosine_similarity(query, c))
        .collect();

    let mut selected: Vec<usize> = Vec::with_capacity(k.min(candidates.len()));
    // Highest similarity to any selected candidate so far.
    let mut redundancy = vec![f32::NEG_INFINITY; candidates.len()];
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &i) in remaining.iter().enumerate() {
            let score = if selected.is_empty() {
                relevance[i]
            } else {
                lambda * relevance[i] - (1.0 - lambda) * redundancy[i]
            };
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        let chosen = remaining.remove(best_pos);
        selected.push(chosen);

        for &i in &remaining {
            let sim = cosine_similarity(candidates[i], candidates[chosen]);
            if sim > redundancy[i] {
                redundancy[i] = sim;
            }
        }
    }

    selected
}
