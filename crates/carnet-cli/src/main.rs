//! carnet: command-line front end for carnet notes.
//!
//! Imports publishing datasets into the vault, keeps Archives/Restes
//! companions aligned with their Journal note, reconciles the local tags
//! table with a tag export, and rewrites frontmatter canonically.

mod commands;
mod config;
mod fs_store;
mod presenter;

use std::path::PathBuf;
use std::process::ExitCode;

use carnet_core::NoteKind;
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::ImportArgs;
use crate::config::Config;
use crate::fs_store::FsStore;

#[derive(Parser)]
#[command(name = "carnet")]
#[command(author, version, about = "Frontmatter-first notes for a photo journal")]
#[command(propagate_version = true)]
struct Cli {
    /// Vault root (overrides CARNET_VAULT_DIR)
    #[arg(long, global = true)]
    vault: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a `<key>_<YYYYMMDD>_PG.csv` dataset
    Import {
        /// Dataset file
        dataset: PathBuf,

        /// Directory for created notes, relative to the vault (default: CARNET_IMPORT_DIR)
        #[arg(short, long)]
        out: Option<String>,

        /// Classify every row without writing
        #[arg(long)]
        dry_run: bool,

        /// Import even when a newer dataset of the same key was imported
        #[arg(long)]
        allow_regression: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create or update the Archives/Restes companion of a Journal note
    Companion {
        #[command(subcommand)]
        action: CompanionAction,
    },

    /// Reconcile the local tags table with a tag export
    Tags {
        /// Export file (default: newest under wp_tags/wp_tags_csv)
        csv: Option<PathBuf>,

        /// Write the default selection to the table
        #[arg(long)]
        apply: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a note's frontmatter in canonical form
    Fmt {
        note: PathBuf,

        /// Show the diff and fail instead of writing
        #[arg(long)]
        check: bool,
    },

    /// Replace a note's tags
    Retag {
        note: PathBuf,

        /// Tag slug (repeatable)
        #[arg(short, long = "tag", required = true, num_args = 1..)]
        tags: Vec<String>,
    },
}

#[derive(Subcommand)]
enum CompanionAction {
    /// Create the companion note
    Create {
        journal: PathBuf,

        /// archives or restes
        #[arg(short, long)]
        kind: NoteKind,
    },

    /// Bring the companion note in line with its Journal
    Sync {
        journal: PathBuf,

        /// archives or restes
        #[arg(short, long)]
        kind: NoteKind,

        /// Accept the default selection
        #[arg(short, long)]
        yes: bool,
    },
}

/// Install the tracing subscriber.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables file logging)
///   RUST_LOG    - standard env filter (default: "carnet=info,carnet_core=info")
///
/// Console logs go to stderr; stdout carries command output.
fn init_tracing() -> Option<WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "carnet=info,carnet_core=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = if let Some(ref path) = log_file {
        let path = std::path::Path::new(path);
        let file_dir = path.parent().unwrap_or(std::path::Path::new("."));
        let file_name = path
            .file_name()
            .and_then(|f| f.to_str())
            .unwrap_or("carnet.log");
        let file_appender = tracing_appender::rolling::daily(file_dir, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking),
                )
                .init();
        } else {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false),
                )
                .init();
        }
        Some(guard)
    } else {
        if log_format == "json" {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .init();
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
        None
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stderr)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().with_vault_dir(cli.vault.clone());

    match run(cli, config).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<ExitCode> {
    let store = FsStore::new(config.vault_dir.clone());
    info!(vault = %store.root().display(), "Using vault");

    match cli.command {
        Commands::Import {
            dataset,
            out,
            dry_run,
            allow_regression,
            json,
        } => {
            let args = ImportArgs {
                dataset,
                out,
                dry_run,
                allow_regression,
                json,
            };
            commands::import(&store, &config, args).await
        }
        Commands::Companion { action } => match action {
            CompanionAction::Create { journal, kind } => {
                commands::companion_create(&store, &journal, kind).await
            }
            CompanionAction::Sync { journal, kind, yes } => {
                commands::companion_sync(&store, &journal, kind, yes).await
            }
        },
        Commands::Tags { csv, apply, json } => {
            commands::tags(&store, &config, csv.as_deref(), apply, json).await
        }
        Commands::Fmt { note, check } => commands::fmt(&store, &note, check).await,
        Commands::Retag { note, tags } => commands::retag(&store, &config, &note, &tags).await,
    }
}
