//! Command-line entry point.
//!
//! Stands in for the out-of-scope operator tooling around the store: just
//! enough surface (`init-library`, `list-libraries`, `prune-versions`,
//! `fsck`) to exercise the library end-to-end against an in-memory backend.

use std::process::ExitCode;
use std::sync::Arc;

use arctic_rs::auth::NullAuthProvider;
use arctic_rs::backend::{Backend, LibraryKind, MemoryBackend};
use arctic_rs::config::Config;
use arctic_rs::error::{Error, Result};
use arctic_rs::hub::{ArcticHub, BackendFactory};
use arctic_rs::ids::LibraryName;
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tracing::{error, info};

/// arctic-rs: a versioned time-series and tick-data store.
#[derive(Parser)]
#[command(name = "arctic-rs", version)]
struct Cli {
    /// Path to a TOML configuration file (defaults to `arctic-rs.toml`).
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new library.
    InitLibrary {
        /// Library name, optionally `namespace.base`.
        name: String,
        /// Library kind: version-store, tick-store, or top-level-tick-store.
        #[arg(long, default_value = "version-store")]
        kind: String,
    },
    /// List every registered library.
    ListLibraries,
    /// Release superseded versions past their grace period.
    PruneVersions {
        /// Library name.
        library: String,
        /// Symbol to prune.
        symbol: String,
    },
    /// Run the consistency checker against a library.
    Fsck {
        /// Library name.
        library: String,
    },
}

struct MemoryFactory;

#[async_trait]
impl BackendFactory for MemoryFactory {
    async fn connect(&self, _credential: &str) -> Result<Arc<dyn Backend>> {
        Ok(Arc::new(MemoryBackend::new()))
    }
}

fn parse_kind(raw: &str) -> Result<LibraryKind> {
    match raw {
        "version-store" => Ok(LibraryKind::VersionStore),
        "tick-store" => Ok(LibraryKind::TickStore),
        "top-level-tick-store" => Ok(LibraryKind::TopLevelTickStore),
        other => Err(Error::invalid_input(format!("unknown library kind '{other}'"))),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = match cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    let hub = ArcticHub::connect(
        Arc::new(MemoryFactory),
        Arc::new(NullAuthProvider),
        config.chunking.clone(),
        config.prune.clone(),
        config.connection.max_retry_backoff,
    )
    .await?;

    match cli.command {
        Commands::InitLibrary { name, kind } => {
            let name = LibraryName::new(name)?;
            let kind = parse_kind(&kind)?;
            hub.initialize_library(name.clone(), kind).await?;
            info!(library = %name, "library initialized");
        }
        Commands::ListLibraries => {
            for descriptor in hub.list_libraries().await? {
                println!("{}\t{:?}", descriptor.name, descriptor.kind);
            }
        }
        Commands::PruneVersions { library, symbol } => {
            let name = LibraryName::new(library)?;
            let store = hub.version_store(name);
            let summary = store.prune_previous_version(&symbol).await?;
            info!(
                versions_removed = summary.versions_removed,
                segments_released = summary.segments_released,
                "prune complete"
            );
        }
        Commands::Fsck { library } => {
            let name = LibraryName::new(library)?;
            let store = hub.version_store(name);
            let report = store.fsck().await?;
            if report.is_clean() {
                info!("library is consistent");
            } else {
                for action in &report.actions {
                    println!("{action:?}");
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    arctic_rs::init().ok();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
