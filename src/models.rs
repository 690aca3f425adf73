//! Core data models used throughout GitInsight.
//!
//! These types represent the documents, chunks, vector records, and chat
//! messages that flow through the ingestion and question-answering pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One source file loaded from the working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub text: String,
    /// Path relative to the repository root, `/`-separated.
    pub source_path: String,
}

/// A slice of a document's text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub text: String,
    pub source_path: String,
    /// Position within the parent document, contiguous from 0.
    pub index: usize,
}

impl Chunk {
    /// Stable record id: re-ingesting identical content overwrites the same
    /// vector instead of adding a duplicate.
    pub fn record_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.source_path.as_bytes());
        hasher.update((self.index as u64).to_le_bytes());
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A chunk paired with its embedding, ready for upsert.
#[derive(Debug, Clone)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub text: String,
    pub source_path: String,
}

impl VectorRecord {
    pub fn from_chunk(chunk: &Chunk, values: Vec<f32>) -> Self {
        Self {
            id: chunk.record_id(),
            values,
            text: chunk.text.clone(),
            source_path: chunk.source_path.clone(),
        }
    }
}

/// A retrieval result.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub text: String,
    pub source_path: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One entry of a session transcript.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(text: &str, path: &str, index: usize) -> Chunk {
        Chunk {
            text: text.to_string(),
            source_path: path.to_string(),
            index,
        }
    }

    #[test]
    fn test_record_id_is_stable() {
        let a = chunk("def f(): pass", "a.py", 0);
        assert_eq!(a.record_id(), a.clone().record_id());
        assert_eq!(a.record_id().len(), 64);
    }

    #[test]
    fn test_record_id_depends_on_position_and_path() {
        let base = chunk("x = 1", "a.py", 0);
        assert_ne!(base.record_id(), chunk("x = 1", "a.py", 1).record_id());
        assert_ne!(base.record_id(), chunk("x = 1", "b.py", 0).record_id());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_value(Message::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }
}
