//! In-memory [`VectorIndex`] implementation for local runs and tests.
//!
//! Uses `HashMap`s behind `std::sync::RwLock`. Queries are brute-force
//! over every stored vector. Indexes are ready as soon as they are created.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use super::{check_compatible, Candidate, EnsureOutcome, IndexDescription, IndexSpec, VectorIndex};
use crate::embedding::cosine_similarity;
use crate::error::IndexError;
use crate::models::VectorRecord;

struct StoredIndex {
    dims: usize,
    metric: String,
    records: HashMap<String, VectorRecord>,
}

impl StoredIndex {
    fn description(&self, name: &str) -> IndexDescription {
        IndexDescription {
            name: name.to_string(),
            dims: self.dims,
            metric: self.metric.clone(),
            ready: true,
            host: None,
        }
    }
}

#[derive(Default)]
pub struct InMemoryIndex {
    indexes: RwLock<HashMap<String, StoredIndex>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records stored in `name`, `None` if the index is absent.
    pub fn record_count(&self, name: &str) -> Option<usize> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        indexes.get(name).map(|idx| idx.records.len())
    }

    pub fn index_names(&self) -> Vec<String> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = indexes.keys().cloned().collect();
        names.sort();
        names
    }
}

fn score(metric: &str, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        "dotproduct" => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        "euclidean" => {
            let dist: f32 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum::<f32>().sqrt();
            1.0 / (1.0 + dist)
        }
        _ => cosine_similarity(a, b),
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_index(&self, spec: &IndexSpec) -> Result<EnsureOutcome, IndexError> {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = indexes.get(&spec.name) {
            check_compatible(spec, &existing.description(&spec.name))?;
            return Ok(EnsureOutcome::Existing);
        }
        indexes.insert(
            spec.name.clone(),
            StoredIndex {
                dims: spec.dims,
                metric: spec.metric.clone(),
                records: HashMap::new(),
            },
        );
        Ok(EnsureOutcome::Created)
    }

    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>, IndexError> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        Ok(indexes.get(name).map(|idx| idx.description(name)))
    }

    async fn delete_index(&self, name: &str) -> Result<bool, IndexError> {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        Ok(indexes.remove(name).is_some())
    }

    async fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<usize, IndexError> {
        let mut indexes = self.indexes.write().unwrap_or_else(PoisonError::into_inner);
        let index = indexes
            .get_mut(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;

        for record in records {
            if record.values.len() != index.dims {
                return Err(IndexError::Dimension {
                    name: name.to_string(),
                    expected: index.dims,
                    found: record.values.len(),
                });
            }
        }
        for record in records {
            index.records.insert(record.id.clone(), record.clone());
        }
        Ok(records.len())
    }

    async fn query(
        &self,
        name: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<Candidate>, IndexError> {
        let indexes = self.indexes.read().unwrap_or_else(PoisonError::into_inner);
        let index = indexes
            .get(name)
            .ok_or_else(|| IndexError::NotFound(name.to_string()))?;
        if vector.len() != index.dims {
            return Err(IndexError::Dimension {
                name: name.to_string(),
                expected: index.dims,
                found: vector.len(),
            });
        }

        let mut scored: Vec<Candidate> = index
            .records
            .values()
            .map(|r| Candidate {
                id: r.id.clone(),
                text: r.text.clone(),
                source_path: r.source_path.clone(),
                score: score(&index.metric, vector, &r.values),
                values: r.values.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;

    fn spec(dims: usize) -> IndexSpec {
        IndexSpec::new(&IndexConfig::default(), "test", dims)
    }

    fn record(id: &str, values: Vec<f32>) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            values,
            text: format!("text of {id}"),
            source_path: format!("{id}.py"),
        }
    }

    #[tokio::test]
    async fn test_ensure_creates_then_reuses() {
        let index = InMemoryIndex::new();
        assert_eq!(index.ensure_index(&spec(2)).await.unwrap(), EnsureOutcome::Created);
        assert_eq!(index.ensure_index(&spec(2)).await.unwrap(), EnsureOutcome::Existing);
        assert_eq!(index.index_names(), vec!["test".to_string()]);
    }

    #[tokio::test]
    async fn test_ensure_rejects_mismatch() {
        let index = InMemoryIndex::new();
        index.ensure_index(&spec(2)).await.unwrap();
        let err = index.ensure_index(&spec(3)).await.unwrap_err();
        assert!(matches!(err, IndexError::ConfigMismatch { .. }));
    }

    #[tokio::test]
    async fn test_upsert_overwrites_by_id() {
        let index = InMemoryIndex::new();
        index.ensure_index(&spec(2)).await.unwrap();
        index
            .upsert("test", &[record("a", vec![1.0, 0.0]), record("b", vec![0.0, 1.0])])
            .await
            .unwrap();
        index.upsert("test", &[record("a", vec![0.5, 0.5])]).await.unwrap();
        assert_eq!(index.record_count("test"), Some(2));
    }

    #[tokio::test]
    async fn test_upsert_rejects_wrong_dims() {
        let index = InMemoryIndex::new();
        index.ensure_index(&spec(2)).await.unwrap();
        let err = index
            .upsert("test", &[record("a", vec![1.0, 0.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, IndexError::Dimension { expected: 2, found: 3, .. }));
        assert_eq!(index.record_count("test"), Some(0));
    }

    #[tokio::test]
    async fn test_query_orders_by_similarity() {
        let index = InMemoryIndex::new();
        index.ensure_index(&spec(2)).await.unwrap();
        index
            .upsert(
                "test",
                &[
                    record("far", vec![-1.0, 0.0]),
                    record("near", vec![1.0, 0.1]),
                    record("mid", vec![0.5, 0.5]),
                ],
            )
            .await
            .unwrap();

        let hits = index.query("test", &[1.0, 0.0], 2).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["near", "mid"]);
        assert_eq!(hits[0].values, vec![1.0, 0.1]);
        assert_eq!(hits[0].source_path, "near.py");
    }

    #[tokio::test]
    async fn test_missing_index() {
        let index = InMemoryIndex::new();
        assert!(index.describe("nope").await.unwrap().is_none());
        assert!(!index.delete_index("nope").await.unwrap());
        assert!(matches!(
            index.query("nope", &[1.0], 1).await.unwrap_err(),
            IndexError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_delete_removes_records() {
        let index = InMemoryIndex::new();
        index.ensure_index(&spec(1)).await.unwrap();
        index.upsert("test", &[record("a", vec![1.0])]).await.unwrap();
        assert!(index.delete_index("test").await.unwrap());
        assert_eq!(index.record_count("test"), None);
    }
}
