//! Typed error kinds for each pipeline component.
//!
//! Components return these instead of formatting messages themselves; the
//! [`present`](crate::present) module turns them into user-facing text and
//! the CLI wraps them in `anyhow` at the edges.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("{0} environment variable not set")]
    MissingSecret(&'static str),
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Failed to execute 'git clone'. Is git installed? ({0})")]
    GitMissing(std::io::Error),

    #[error("git clone failed: {0}")]
    CloneFailed(String),

    #[error("Could not prepare working directory {path}: {reason}")]
    Workdir { path: PathBuf, reason: String },
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Repository directory does not exist: {0}")]
    MissingRoot(PathBuf),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] globset::Error),

    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
}

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        source: reqwest::Error,
    },

    #[error("Invalid {provider} response: {reason}")]
    BadResponse {
        provider: &'static str,
        reason: String,
    },

    #[error("Local embedding model failed: {0}")]
    Local(String),
}

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Index '{name}' exists with {found}, requested {requested}")]
    ConfigMismatch {
        name: String,
        found: String,
        requested: String,
    },

    #[error("Index '{0}' not found")]
    NotFound(String),

    #[error("Index '{name}' was not ready after {secs}s")]
    NotReady { name: String, secs: u64 },

    #[error("Index service error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Index request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid index response: {0}")]
    BadResponse(String),

    #[error("Vector has dimension {found}, index '{name}' expects {expected}")]
    Dimension {
        name: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider} request failed: {source}")]
    Transport {
        provider: &'static str,
        source: reqwest::Error,
    },

    #[error("Model returned no text (finish reason: {0})")]
    Empty(String),
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("No {language} files found in {path}")]
    NoDocuments { language: String, path: PathBuf },

    #[error("Embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("Index operation failed: {0}")]
    Index(#[from] IndexError),
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Index '{0}' does not exist; process a repository first")]
    IndexMissing(String),

    #[error("Index operation failed: {0}")]
    Index(#[from] IndexError),

    #[error("Embedding failed: {0}")]
    Embed(#[from] EmbedError),

    #[error("Language model call failed: {0}")]
    Llm(#[from] LlmError),
}

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Repository URL must not be empty")]
    EmptyUrl,

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error("Could not remove {path} (still locked after retry): {source}")]
    Locked {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Could not remove {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}
