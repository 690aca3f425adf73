//! User-facing text.
//!
//! Components return typed results; every string a user reads is produced
//! here, so the CLI, the chat loop and the HTTP API word things the same
//! way.

use crate::error::{EngineError, ProcessError};
use crate::ingest::IngestReport;
use crate::session::{ClearReport, ProcessReport};

/// Reply to any question asked before a repository has been processed.
pub const INSTRUCTIONS: &str =
    "Please process a GitHub repository first by submitting its URL.";

/// Reply to the clear keyword.
pub const CLEARED: &str = "Repository data cleared!";

pub fn question_error(err: &EngineError) -> String {
    format!("Error processing your question: {}", err)
}

pub fn process_error(err: &ProcessError) -> String {
    match err {
        ProcessError::EmptyUrl => "Please enter a GitHub repository URL".to_string(),
        other => format!("Error processing repository: {}", other),
    }
}

pub fn process_success(report: &ProcessReport) -> String {
    format!(
        "Repository processed: {} ({} files, {} chunks)",
        report.url, report.ingest.documents, report.ingest.chunks
    )
}

pub fn index_status(report: &IngestReport) -> String {
    if report.index_created {
        format!("Created new index: {}", report.index_name)
    } else {
        format!("Using existing index: {}", report.index_name)
    }
}

pub fn stored_chunks(report: &IngestReport) -> String {
    format!(
        "Successfully stored {} document chunks in index: {}",
        report.upserted, report.index_name
    )
}

pub fn cleanup_warning(what: &str, err: &dyn std::fmt::Display) -> String {
    format!("Could not remove {}: {}", what, err)
}

/// One line per thing Clear did (or failed to do).
pub fn clear_summary(report: &ClearReport) -> Vec<String> {
    let mut lines = Vec::new();
    if report.repo_removed {
        lines.push("Removed repository files".to_string());
    }
    if report.index_deleted {
        lines.push(format!("Deleted index: {}", report.index_name));
    }
    lines.extend(report.warnings.iter().map(|w| format!("Warning: {}", w)));
    lines.push("Repository data cleared successfully!".to_string());
    lines
}
