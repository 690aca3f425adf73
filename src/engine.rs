//! Conversation engine: retrieval-augmented answers with summary memory.
//!
//! A [`ConversationEngine`] is bound to one index. Each question goes
//! through up to four model-visible steps:
//!
//! 1. If earlier turns exist, rewrite the follow-up into a standalone
//!    question using the running summary.
//! 2. Embed it and retrieve chunks (MMR by default).
//! 3. Ask the model to answer from the retrieved chunks, the summary and
//!    the question.
//! 4. Fold the new turn into the summary.
//!
//! The summary replaces the full transcript as the model's memory, so
//! prompt size stays bounded however long the conversation runs.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::embedding::Embedder;
use crate::error::EngineError;
use crate::index::VectorIndex;
use crate::llm::ChatModel;
use crate::models::ScoredChunk;
use crate::search::{retrieve, SearchStrategy};

/// A synthesized answer and the files it drew on.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub text: String,
    /// Distinct source paths of the retrieved chunks, sorted.
    pub sources: Vec<String>,
}

pub struct ConversationEngine {
    index_name: String,
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn ChatModel>,
    strategy: SearchStrategy,
    summary: String,
}

impl std::fmt::Debug for ConversationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationEngine")
            .field("index_name", &self.index_name)
            .field("model", &self.llm.model_name())
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

impl ConversationEngine {
    /// Bind to an existing index. Fails with [`EngineError::IndexMissing`]
    /// when no index of that name exists.
    pub async fn connect(
        index_name: &str,
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn ChatModel>,
        strategy: SearchStrategy,
    ) -> Result<Self, EngineError> {
        if index.describe(index_name).await?.is_none() {
            return Err(EngineError::IndexMissing(index_name.to_string()));
        }

        tracing::info!(index = index_name, model = llm.model_name(), "conversation engine ready");

        Ok(Self {
            index_name: index_name.to_string(),
            index,
            embedder,
            llm,
            strategy,
            summary: String::new(),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub async fn ask(&mut self, question: &str) -> Result<Answer, EngineError> {
        let standalone = if self.summary.is_empty() {
            question.to_string()
        } else {
            let rewritten = self
                .llm
                .complete(&condense_prompt(&self.summary, question))
                .await?;
            let rewritten = rewritten.trim();
            if rewritten.is_empty() {
                question.to_string()
            } else {
                rewritten.to_string()
            }
        };

        let query_vector = self.embedder.embed_query(&standalone).await?;
        let chunks = retrieve(
            self.index.as_ref(),
            &self.index_name,
            &query_vector,
            self.strategy,
        )
        .await?;

        let prompt = answer_prompt(&self.summary, &chunks, &standalone);
        tracing::debug!(
            chunks = chunks.len(),
            prompt_chars = prompt.len(),
            "answering question"
        );
        let text = self.llm.complete(&prompt).await?;

        match self
            .llm
            .complete(&summary_prompt(&self.summary, question, &text))
            .await
        {
            Ok(updated) => self.summary = updated.trim().to_string(),
            Err(e) => tracing::warn!(error = %e, "summary update failed; keeping previous summary"),
        }

        let sources: BTreeSet<String> = chunks.into_iter().map(|c| c.source_path).collect();

        Ok(Answer {
            text,
            sources: sources.into_iter().collect(),
        })
    }
}

// ============ Prompts ============

fn condense_prompt(summary: &str, question: &str) -> String {
    format!(
        "Given the conversation summary and a follow-up question, rephrase the \
         follow-up question to be a standalone question that can be understood \
         without the conversation. Reply with the question only.\n\n\
         Conversation summary:\n{summary}\n\n\
         Follow-up question: {question}\n\
         Standalone question:"
    )
}

fn answer_prompt(summary: &str, chunks: &[ScoredChunk], question: &str) -> String {
    let mut context = String::new();
    for chunk in chunks {
        context.push_str(&format!(
            "--- {} ---\n{}\n\n",
            chunk.source_path,
            chunk.text.trim_end()
        ));
    }
    if context.is_empty() {
        context.push_str("(no matching code found)\n\n");
    }

    let history = if summary.is_empty() {
        "(none)"
    } else {
        summary
    };

    format!(
        "You answer questions about a code repository. Use the source excerpts \
         below; each is labelled with its file path. Mention file and function \
         names where they help. If the excerpts do not contain the answer, say \
         that you don't know rather than guessing.\n\n\
         Source excerpts:\n{context}\
         Conversation so far:\n{history}\n\n\
         Question: {question}\n\
         Answer:"
    )
}

fn summary_prompt(summary: &str, question: &str, answer: &str) -> String {
    let current = if summary.is_empty() {
        "(empty)"
    } else {
        summary
    };
    format!(
        "Progressively summarize the conversation, adding onto the previous \
         summary and returning a new summary.\n\n\
         Current summary:\n{current}\n\n\
         New lines of conversation:\n\
         Human: {question}\n\
         AI: {answer}\n\n\
         New summary:"
    )
}
