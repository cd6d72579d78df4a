//! # warden-cli
//!
//! Developer command-line tool for Warden policies and programs:
//! - `warden check` — parse and compile a policy file, printing
//!   compile warnings and caret-annotated parse errors
//! - `warden run` — execute a planner program offline against canned
//!   tool results, printing the run report as JSON
//!
//! Neither command talks to a model or a real tool; both work entirely
//! from files so policies can be validated and programs replayed in CI.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Warden CLI — validate policies and replay programs offline.
#[derive(Parser)]
#[command(name = "warden", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and compile a policy file.
    Check {
        /// Path to the policy source.
        file: PathBuf,
        /// Policy language: sift, sift-lite, or rulebook.
        #[arg(long, default_value = "sift")]
        language: String,
        /// Tool catalog (JSON) used to warn about patterns matching no
        /// registered tool.
        #[arg(long)]
        tools: Option<PathBuf>,
    },
    /// Run a program offline against canned tool results.
    Run {
        /// Path to the policy source.
        #[arg(long)]
        policy: PathBuf,
        /// Policy language: sift, sift-lite, or rulebook.
        #[arg(long, default_value = "sift")]
        language: String,
        /// Path to the program (JSON statement list).
        #[arg(long)]
        program: PathBuf,
        /// Tool catalog (JSON) mapping tool names to canned results.
        #[arg(long)]
        tools: Option<PathBuf>,
        /// Stop rule evaluation at the first hard violation.
        #[arg(long)]
        fail_fast: bool,
    },
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so reports stay clean on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Commands::Check {
            file,
            language,
            tools,
        } => commands::check::execute(file, language, tools.as_deref()),
        Commands::Run {
            policy,
            language,
            program,
            tools,
            fail_fast,
        } => commands::run::execute(policy, language, program, tools.as_deref(), *fail_fast),
    }
}
