//! Session controller.
//!
//! A [`Session`] holds one user's state: its index name and working
//! directory, the chat transcript, and the conversation engine once a
//! repository has been processed. [`Services`] bundles the shared
//! collaborators and implements the three user actions against a session:
//!
//! | Action | Effect |
//! |--------|--------|
//! | [`Services::process`] | fetch → ingest → connect engine |
//! | [`Services::ask`] | answer a question (or run Clear on the clear keyword) |
//! | [`Services::clear`] | remove working directory and index, reset the session |
//!
//! Handlers take `&mut Session`, so two actions on the same session can't
//! interleave. [`SessionStore`] wraps each session in an async mutex for
//! the HTTP API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::cleanup::{force_remove_dir_async, RemoveOutcome};
use crate::config::{Config, Secrets};
use crate::embedding::{create_embedder, Embedder};
use crate::engine::ConversationEngine;
use crate::error::{ConfigError, ProcessError};
use crate::fetch::{GitFetcher, RepoFetcher};
use crate::index::{create_index, VectorIndex};
use crate::ingest::{ingest_directory, IngestReport};
use crate::llm::{create_chat_model, ChatModel};
use crate::models::Message;
use crate::present;
use crate::search::SearchStrategy;

#[derive(Debug)]
pub struct Session {
    id: String,
    index_name: String,
    repo_dir: PathBuf,
    transcript: Vec<Message>,
    /// `None` until a Process succeeds.
    engine: Option<ConversationEngine>,
}

impl Session {
    pub fn new(config: &Config) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), config)
    }

    /// A session on the configured index name and working directory,
    /// whatever `session.isolate` says. One-shot CLI commands use this so
    /// that `process` and a later `clear` address the same resources.
    pub fn shared(config: &Config) -> Self {
        Self::build(Uuid::new_v4().to_string(), config, false)
    }

    /// With `session.isolate`, the index name gets the first 8 hex chars of
    /// the id as a suffix and the working directory gets the id as a
    /// subdirectory; otherwise every session shares the configured ones.
    pub fn with_id(id: String, config: &Config) -> Self {
        Self::build(id, config, config.session.isolate)
    }

    fn build(id: String, config: &Config, isolate: bool) -> Self {
        let (index_name, repo_dir) = if isolate {
            let short: String = id.chars().filter(|c| *c != '-').take(8).collect();
            (
                format!("{}-{}", config.index.name, short),
                config.workspace.repo_dir.join(&id),
            )
        } else {
            (
                config.index.name.clone(),
                config.workspace.repo_dir.clone(),
            )
        };

        Self {
            id,
            index_name,
            repo_dir,
            transcript: Vec::new(),
            engine: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    fn reset(&mut self) {
        self.engine = None;
        self.transcript.clear();
    }
}

/// Serializable view of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub initialized: bool,
    pub index_name: String,
    pub transcript: Vec<Message>,
}

impl From<&Session> for SessionSnapshot {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id.clone(),
            initialized: session.is_initialized(),
            index_name: session.index_name.clone(),
            transcript: session.transcript.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessReport {
    pub url: String,
    #[serde(flatten)]
    pub ingest: IngestReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub index_name: String,
    pub repo_removed: bool,
    pub index_deleted: bool,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplyKind {
    /// Asked before any repository was processed.
    Instructions,
    Answer { sources: Vec<String> },
    Cleared { report: ClearReport },
    Error,
}

/// The assistant's response to one chat submission.
#[derive(Debug, Clone, Serialize)]
pub struct Reply {
    pub text: String,
    #[serde(flatten)]
    pub kind: ReplyKind,
}

/// Shared collaborators, built once per process.
pub struct Services {
    pub config: Config,
    pub fetcher: Arc<dyn RepoFetcher>,
    pub embedder: Arc<dyn Embedder>,
    pub index: Arc<dyn VectorIndex>,
    pub llm: Arc<dyn ChatModel>,
    /// Serializes Process and Clear across sessions that share the working
    /// directory and index name.
    workspace: Mutex<()>,
}

impl Services {
    pub fn new(
        config: Config,
        fetcher: Arc<dyn RepoFetcher>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        llm: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            config,
            fetcher,
            embedder,
            index,
            llm,
            workspace: Mutex::new(()),
        }
    }

    pub fn from_config(config: Config, secrets: &Secrets) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.clone(),
            Arc::new(GitFetcher::new(&config.fetch)),
            create_embedder(&config.embedding, secrets)?,
            create_index(&config.index, secrets)?,
            create_chat_model(&config.llm, secrets)?,
        ))
    }

    /// Held for the whole of a Process or Clear. Isolated sessions own their
    /// resources and skip it.
    async fn lock_workspace(&self, session: &Session) -> Option<MutexGuard<'_, ()>> {
        let shared = session.index_name == self.config.index.name
            || session.repo_dir == self.config.workspace.repo_dir;
        if shared {
            Some(self.workspace.lock().await)
        } else {
            None
        }
    }

    /// Clone `url`, ingest it, and bind a conversation engine.
    ///
    /// The session is uninitialized from the start of the call until it
    /// succeeds, so a failure at any step leaves it uninitialized.
    pub async fn process(
        &self,
        session: &mut Session,
        url: &str,
    ) -> Result<ProcessReport, ProcessError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(ProcessError::EmptyUrl);
        }

        session.engine = None;
        let _workspace = self.lock_workspace(session).await;

        self.fetcher.fetch(url, &session.repo_dir).await?;

        let ingest = ingest_directory(
            &self.config,
            &session.repo_dir,
            &session.index_name,
            self.embedder.as_ref(),
            self.index.as_ref(),
        )
        .await?;

        let engine = ConversationEngine::connect(
            &session.index_name,
            self.index.clone(),
            self.embedder.clone(),
            self.llm.clone(),
            SearchStrategy::from_config(&self.config.retrieval),
        )
        .await?;
        session.engine = Some(engine);

        tracing::info!(session = %session.id, url, chunks = ingest.chunks, "repository processed");

        Ok(ProcessReport {
            url: url.to_string(),
            ingest,
        })
    }

    /// Handle one chat submission. Never fails: errors become the reply.
    pub async fn ask(&self, session: &mut Session, text: &str) -> Reply {
        session.transcript.push(Message::user(text));

        let Some(engine) = session.engine.as_mut() else {
            return record(session, present::INSTRUCTIONS.to_string(), ReplyKind::Instructions);
        };

        if text.trim().eq_ignore_ascii_case(self.config.session.clear_keyword.trim()) {
            let report = self.clear(session).await;
            return Reply {
                text: present::CLEARED.to_string(),
                kind: ReplyKind::Cleared { report },
            };
        }

        let result = engine.ask(text).await;
        match result {
            Ok(answer) => record(
                session,
                answer.text,
                ReplyKind::Answer {
                    sources: answer.sources,
                },
            ),
            Err(e) => {
                tracing::warn!(session = %session.id, error = %e, "question failed");
                record(session, present::question_error(&e), ReplyKind::Error)
            }
        }
    }

    /// Remove the working directory and the index, then reset the session.
    /// Problems are reported as warnings; the session is reset regardless.
    pub async fn clear(&self, session: &mut Session) -> ClearReport {
        let mut report = ClearReport {
            index_name: session.index_name.clone(),
            ..Default::default()
        };
        session.engine = None;
        let _workspace = self.lock_workspace(session).await;

        match force_remove_dir_async(&session.repo_dir).await {
            Ok(outcome) => report.repo_removed = outcome == RemoveOutcome::Removed,
            Err(e) => {
                tracing::warn!(path = %session.repo_dir.display(), error = %e, "cleanup failed");
                let what = session.repo_dir.display().to_string();
                report.warnings.push(present::cleanup_warning(&what, &e));
            }
        }

        match self.index.delete_index(&session.index_name).await {
            Ok(deleted) => report.index_deleted = deleted,
            Err(e) => {
                tracing::warn!(index = %session.index_name, error = %e, "index deletion failed");
                let what = format!("index {}", session.index_name);
                report.warnings.push(present::cleanup_warning(&what, &e));
            }
        }

        session.reset();
        tracing::info!(
            session = %session.id,
            repo_removed = report.repo_removed,
            index_deleted = report.index_deleted,
            "session cleared"
        );
        report
    }
}

fn record(session: &mut Session, text: String, kind: ReplyKind) -> Reply {
    session.transcript.push(Message::assistant(text.clone()));
    Reply { text, kind }
}

/// Live sessions keyed by id.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create(&self, config: &Config) -> (String, Arc<Mutex<Session>>) {
        let session = Session::new(config);
        let id = session.id.clone();
        let handle = Arc::new(Mutex::new(session));
        self.sessions
            .write()
            .await
            .insert(id.clone(), handle.clone());
        (id, handle)
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Mutex<Session>>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Forget a session. Its index and working directory are left alone.
    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
