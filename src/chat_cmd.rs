//! Terminal chat (`gitinsight chat`).
//!
//! A line-oriented rendition of the chat UI: the sidebar actions become
//! colon commands and any other line is a question. Every submission
//! prints exactly one assistant reply.
//!
//! | Input | Action |
//! |-------|--------|
//! | `:process <url>` | Clone and ingest a repository |
//! | `:clear` | Remove repository data and the index |
//! | `:history` | Print the transcript |
//! | `:quit` | Exit |
//! | anything else | Ask a question |

use std::io::Write;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::models::Role;
use crate::present;
use crate::session::{Services, Session};

/// What the loop should do after one line.
#[derive(Debug, PartialEq, Eq)]
pub enum Step {
    Print(Vec<String>),
    Quit,
}

/// Handle one line of input against `session`.
pub async fn handle_line(services: &Services, session: &mut Session, line: &str) -> Step {
    let line = line.trim();

    if line == ":quit" || line == ":q" {
        return Step::Quit;
    }

    if line == ":history" {
        let lines = session
            .transcript()
            .iter()
            .map(|m| {
                let who = match m.role {
                    Role::User => "you",
                    Role::Assistant => "assistant",
                };
                format!("[{}] {}: {}", m.at.format("%H:%M:%S"), who, m.content)
            })
            .collect::<Vec<_>>();
        if lines.is_empty() {
            return Step::Print(vec!["(no messages yet)".to_string()]);
        }
        return Step::Print(lines);
    }

    if line == ":clear" {
        let report = services.clear(session).await;
        return Step::Print(present::clear_summary(&report));
    }

    if let Some(rest) = line
        .strip_prefix(":process")
        .filter(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
    {
        let message = match services.process(session, rest).await {
            Ok(report) => present::process_success(&report),
            Err(e) => present::process_error(&e),
        };
        return Step::Print(vec![message]);
    }

    if line.is_empty() {
        return Step::Print(Vec::new());
    }

    let reply = services.ask(session, line).await;
    Step::Print(vec![reply.text])
}

pub async fn run_chat(services: &Services) -> Result<()> {
    let mut session = Session::new(&services.config);
    tracing::debug!(session = %session.id(), index = session.index_name(), "chat started");

    println!("gitinsight chat. Type :process <url> to load a repository, :quit to exit.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match handle_line(services, &mut session, &line).await {
            Step::Quit => break,
            Step::Print(out) => {
                for text in out {
                    println!("{}", text);
                }
            }
        }
    }

    Ok(())
}
