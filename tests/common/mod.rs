//! Fake collaborators shared by the integration tests.
//!
//! The fetcher writes fixture files instead of cloning, the embedder maps
//! text to a tiny deterministic vector, and the chat model answers from a
//! script. The in-memory index stands in for Pinecone.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use gitinsight::config::Config;
use gitinsight::embedding::Embedder;
use gitinsight::error::{EmbedError, FetchError, LlmError};
use gitinsight::fetch::{prepare_destination, RepoFetcher};
use gitinsight::index::memory::InMemoryIndex;
use gitinsight::llm::ChatModel;
use gitinsight::session::Services;

pub struct FixtureFetcher {
    pub calls: AtomicUsize,
    pub fail: bool,
    in_flight: AtomicUsize,
    /// Most fetches ever running at once.
    pub max_in_flight: AtomicUsize,
}

#[async_trait]
impl RepoFetcher for FixtureFetcher {
    async fn fetch(&self, _url: &str, dest: &Path) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(FetchError::CloneFailed(
                "fatal: repository not found".to_string(),
            ));
        }
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        // Give a concurrent caller the chance to overlap.
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        prepare_destination(dest).await?;
        std::fs::create_dir_all(dest.join("pkg")).unwrap();
        std::fs::write(
            dest.join("main.py"),
            "from pkg.util import greet\n\n\ndef main():\n    print(greet(\"world\"))\n",
        )
        .unwrap();
        std::fs::write(
            dest.join("pkg/util.py"),
            "def greet(name):\n    return f\"hello {name}\"\n",
        )
        .unwrap();
        std::fs::write(dest.join("README.md"), "# demo\n\nA demo repository.\n").unwrap();
        Ok(())
    }
}

pub struct CountingEmbedder {
    pub calls: AtomicUsize,
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn model_name(&self) -> &str {
        "counting"
    }

    fn dims(&self) -> usize {
        2
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts
            .iter()
            .map(|t| vec![t.len() as f32, t.matches("def").count() as f32 + 1.0])
            .collect())
    }
}

pub struct ScriptedChat {
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

#[async_trait]
impl ChatModel for ScriptedChat {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(LlmError::Empty("SAFETY".to_string()));
        }
        if prompt.contains("Progressively summarize") {
            Ok("The user asked about the entry point.".to_string())
        } else if prompt.contains("Standalone question:") {
            Ok("Where does main call greet?".to_string())
        } else {
            Ok("main() in main.py calls greet from pkg/util.py.".to_string())
        }
    }
}

pub struct Harness {
    pub tmp: TempDir,
    pub services: Services,
    pub fetcher: Arc<FixtureFetcher>,
    pub embedder: Arc<CountingEmbedder>,
    pub chat: Arc<ScriptedChat>,
    pub index: Arc<InMemoryIndex>,
}

pub fn harness_with(fetch_fails: bool) -> Harness {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::default();
    config.workspace.repo_dir = tmp.path().join("repo");
    config.index.provider = "memory".to_string();

    let fetcher = Arc::new(FixtureFetcher {
        calls: AtomicUsize::new(0),
        fail: fetch_fails,
        in_flight: AtomicUsize::new(0),
        max_in_flight: AtomicUsize::new(0),
    });
    let embedder = Arc::new(CountingEmbedder {
        calls: AtomicUsize::new(0),
    });
    let chat = Arc::new(ScriptedChat {
        calls: AtomicUsize::new(0),
        fail: AtomicBool::new(false),
    });
    let index = Arc::new(InMemoryIndex::new());

    let services = Services::new(
        config,
        fetcher.clone(),
        embedder.clone(),
        index.clone(),
        chat.clone(),
    );

    Harness {
        tmp,
        services,
        fetcher,
        embedder,
        chat,
        index,
    }
}

pub fn harness() -> Harness {
    harness_with(false)
}

pub const URL: &str = "https://github.com/example/demo";
