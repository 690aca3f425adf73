//! # gitinsight CLI
//!
//! Ask questions about a Git repository's source code. A repository is
//! cloned, its files for one language are chunked and embedded into a
//! vector index, and questions are answered by a chat model grounded in
//! the retrieved chunks.
//!
//! ## Usage
//!
//! ```bash
//! gitinsight [--config ./gitinsight.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `gitinsight ingest` | Index an already checked-out directory |
//! | `gitinsight process <url>` | Clone and index a repository |
//! | `gitinsight clear` | Remove the working directory and the index |
//! | `gitinsight chat` | Interactive terminal chat |
//! | `gitinsight serve` | Start the HTTP session API |
//!
//! ## Environment
//!
//! `GOOGLE_API_KEY` is always required. `HUGGINGFACE_API_KEY` (or
//! `OPENAI_API_KEY`) and `PINECONE_API_KEY` are required for the default
//! providers. A `.env` file in the working directory is loaded first.
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use gitinsight::config::{self, Config, Secrets};
use gitinsight::session::{Services, Session};
use gitinsight::{chat_cmd, ingest, present, server};

/// gitinsight: conversational question answering over a Git repository.
#[derive(Parser)]
#[command(
    name = "gitinsight",
    about = "Chat with the source code of a Git repository",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, split, embed and store the files of a local directory.
    ///
    /// Uses `[workspace].repo_dir` and `[index].name` unless overridden.
    Ingest {
        /// Directory to ingest.
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Index to write into.
        #[arg(long)]
        index: Option<String>,
    },

    /// Clone a repository into the working directory and ingest it.
    Process {
        /// Repository URL, e.g. https://github.com/owner/repo
        url: String,
    },

    /// Delete the working directory and the index.
    Clear,

    /// Interactive chat in the terminal.
    Chat,

    /// Start the HTTP session API on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => {
            let cfg = Config::default();
            cfg.validate()?;
            cfg
        }
    };

    let secrets = Secrets::from_env(&cfg)?;
    let services = Services::from_config(cfg, &secrets)?;

    match cli.command {
        Commands::Ingest { dir, index } => {
            ingest::run_ingest(&services, dir, index).await?;
        }
        Commands::Process { url } => {
            let mut session = Session::shared(&services.config);
            let report = services
                .process(&mut session, &url)
                .await
                .map_err(|e| anyhow!(present::process_error(&e)))?;
            println!("{}", present::index_status(&report.ingest));
            println!("{}", present::stored_chunks(&report.ingest));
            println!("{}", present::process_success(&report));
        }
        Commands::Clear => {
            let mut session = Session::shared(&services.config);
            let report = services.clear(&mut session).await;
            for line in present::clear_summary(&report) {
                println!("{}", line);
            }
        }
        Commands::Chat => {
            chat_cmd::run_chat(&services).await?;
        }
        Commands::Serve => {
            server::run_server(services).await?;
        }
    }

    Ok(())
}
