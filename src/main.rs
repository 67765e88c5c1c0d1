// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! wordlint language server.
//!
//! Speaks LSP on stdin/stdout. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use wordlint::analyzer::MatchMode;
use wordlint::config::Config;
use wordlint::lsp::{ExitStatus, Server};

/// Command-line arguments for wordlint.
#[derive(Parser, Debug)]
#[command(name = "wordlint")]
#[command(about = "Language server that flags configured words")]
#[command(version = env!("WORDLINT_VERSION"))]
struct Args {
    /// Path to configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Word to flag. Can be specified multiple times.
    /// Replaces the configured word list when given.
    #[arg(short, long = "word")]
    words: Vec<String>,

    /// How words are matched. Overrides the config file if set.
    #[arg(long, value_enum)]
    match_mode: Option<MatchMode>,

    /// Match words case-sensitively.
    #[arg(long)]
    case_sensitive: bool,

    /// Communicate over stdin/stdout (the only supported transport).
    #[arg(long)]
    stdio: bool,
}

/// The main entry point.
#[tokio::main]
async fn main() {
    let args = Args::parse();

    let code = match init_logging() {
        Ok(()) => match run(args).await {
            Ok(status) => status.code(),
            Err(e) => {
                error!("{:#}", e);
                ExitStatus::Abnormal.code()
            }
        },
        Err(_) => ExitStatus::Abnormal.code(),
    };

    // Stdin is read on a blocking thread that would hold the runtime open.
    std::process::exit(code);
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("wordlint=info".parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Runs one session on stdin/stdout.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or the session fails.
async fn run(args: Args) -> Result<ExitStatus> {
    let mut config = Config::load(args.config.clone())?;

    // Merge CLI overrides into config
    if !args.words.is_empty() {
        config.words = args.words;
    }
    if let Some(mode) = args.match_mode {
        config.match_mode = mode;
    }
    if args.case_sensitive {
        config.case_sensitive = true;
    }

    let analyzer = config.analyzer()?;

    info!("Starting wordlint {}", env!("WORDLINT_VERSION"));
    info!(
        "Flagging {} words ({:?}, case-sensitive: {})",
        analyzer.word_count(),
        config.match_mode,
        config.case_sensitive
    );
    if !args.stdio {
        info!("No transport flag given; using stdio");
    }

    let server = Server::new(Arc::new(analyzer)).with_version(env!("WORDLINT_VERSION"));
    let status = server
        .run(tokio::io::stdin(), tokio::io::stdout())
        .await
        .context("Session failed")?;

    info!("Exiting with status {}", status.code());
    Ok(status)
}
