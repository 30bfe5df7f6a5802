#![allow(clippy::uninlined_format_args)]

use anyhow::{Context, Result, bail};
use std::io::Write;
use std::sync::Arc;
use tldr_docs::ai::{LlmClient, PlainTextExtractor};
use tldr_docs::core::config::AppConfig;
use tldr_docs::core::models::{StreamingState, SummaryEvent};
use tldr_docs::worker::SummaryCoordinator;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    tldr_docs::setup_logging();

    let Some(path) = std::env::args().nth(1) else {
        bail!("usage: tldr-docs <path-to-text-file>");
    };

    let config = AppConfig::from_env().context("loading configuration")?;
    let coordinator = SummaryCoordinator::new(config.summarizer.clone())?;
    let client = Arc::new(LlmClient::from_config(&config)?);
    info!(model = client.model_name(), path = %path, "Summarizing document");

    let bytes = tokio::fs::read(&path)
        .await
        .with_context(|| format!("reading {}", path))?;
    let mut handle = coordinator.summarize_document(&bytes, &path, &PlainTextExtractor, client)?;

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let mut printer = TerminalPrinter::default();
    while let Some(event) = handle.next_event().await {
        match event {
            SummaryEvent::Snapshot(state) => printer.render(&state)?,
            SummaryEvent::Failed(err) => {
                error!(category = %err.category(), "Summary failed: {}", err);
                eprintln!("{}", err.user_message());
                std::process::exit(1);
            }
            SummaryEvent::Cancelled => {
                eprintln!("\nCancelled.");
                std::process::exit(130);
            }
        }
    }
    Ok(())
}

/// Prints only what each snapshot adds to the previous one.
#[derive(Default)]
struct TerminalPrinter {
    bullet: Option<usize>,
    printed: usize,
}

impl TerminalPrinter {
    fn render(&mut self, state: &StreamingState) -> std::io::Result<()> {
        let mut out = std::io::stdout().lock();

        if let Some(index) = state.current_index() {
            if self.bullet != Some(index) {
                if self.bullet.is_some() {
                    writeln!(out)?;
                }
                write!(out, "- ")?;
                self.bullet = Some(index);
                self.printed = 0;
            }
            if let Some(new_text) = state.current_bullet_text.get(self.printed..) {
                write!(out, "{}", new_text)?;
                self.printed = state.current_bullet_text.len();
            }
        }

        if state.is_complete {
            writeln!(out)?;
        }
        out.flush()
    }
}
