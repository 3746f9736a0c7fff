//! # brainstore CLI
//!
//! The `brainstore` binary initializes the database, manages brains, uploads
//! and removes files, runs the orphan sweep, and starts the HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! brainstore --config ./config/brainstore.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `brainstore init` | Create the SQLite database and run schema migrations |
//! | `brainstore brain create` | Create a brain owned by a user |
//! | `brainstore brain list` | List a user's brains |
//! | `brainstore upload <path>` | Upload a file into a brain |
//! | `brainstore files` | List the distinct files of a brain |
//! | `brainstore delete <file_name>` | Remove a file from a brain |
//! | `brainstore gc` | Delete vectors no brain links |
//! | `brainstore serve` | Start the HTTP server |

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use brainstore::config::{self, Config};
use brainstore::context::AppContext;
use brainstore::upload::{upload_file, UploadOptions, UploadedFile};
use brainstore::{brains, explore, logging, migrate, reaper, server};
use brainstore_core::models::NewBrain;
use brainstore_core::quota::format_bytes;
use clap::{Parser, Subcommand};
use uuid::Uuid;

/// brainstore: deduplicating document ingestion for brains.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file.
#[derive(Parser)]
#[command(
    name = "brainstore",
    about = "Deduplicating document ingestion backend for brains",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/brainstore.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Manage brains.
    Brain {
        #[command(subcommand)]
        action: BrainAction,
    },

    /// Upload a file into a brain.
    ///
    /// Prints the upload outcome. A duplicate, empty, unsupported, or
    /// over-quota file is reported, not treated as a failure.
    Upload {
        /// Path of the file to upload.
        path: PathBuf,

        /// Target brain UUID.
        #[arg(long)]
        brain: Uuid,

        /// Record that summarization was requested for the file.
        #[arg(long)]
        summarize: bool,

        /// Embedding API key to use instead of the server's; also raises
        /// the brain's size limit.
        #[arg(long)]
        api_key: Option<String>,
    },

    /// List the distinct files of a brain, largest first.
    Files {
        #[arg(long)]
        brain: Uuid,
    },

    /// Remove a file from a brain and delete vectors no brain still links.
    Delete {
        file_name: String,

        #[arg(long)]
        brain: Uuid,
    },

    /// Delete unlinked vectors older than the given age.
    Gc {
        /// Minimum age in seconds. Defaults to `[store].orphan_min_age_secs`.
        #[arg(long)]
        min_age_secs: Option<u64>,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[derive(Subcommand)]
enum BrainAction {
    /// Create a brain owned by `--user`.
    Create {
        #[arg(long)]
        user: Uuid,

        #[arg(long)]
        name: String,

        #[arg(long)]
        description: Option<String>,
    },

    /// List the brains `--user` belongs to.
    List {
        #[arg(long)]
        user: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cfg = config::load_config(&cli.config)?;
    logging::init_with_config(&cfg.logging);

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Brain { action } => run_brain(cfg, action).await?,
        Commands::Upload {
            path,
            brain,
            summarize,
            api_key,
        } => run_upload(cfg, &path, brain, summarize, api_key).await?,
        Commands::Files { brain } => {
            let ctx = AppContext::open(cfg).await?;
            let files = explore::brain_files(&ctx, brain).await?;
            if files.is_empty() {
                println!("No files in brain {}.", brain);
            }
            for file in files {
                println!("{:>10}  {}", format_bytes(file.size), file.name);
            }
        }
        Commands::Delete { file_name, brain } => {
            let ctx = AppContext::open(cfg).await?;
            let report = reaper::delete_file_from_brain(&ctx, brain, &file_name).await?;
            println!(
                "Removed {} from brain {}: {} links removed, {} vectors deleted.",
                file_name, brain, report.links_removed, report.vectors_deleted
            );
        }
        Commands::Gc { min_age_secs } => {
            let min_age = min_age_secs.unwrap_or(cfg.store.orphan_min_age_secs);
            let ctx = AppContext::open(cfg).await?;
            let deleted = reaper::sweep_orphans(&ctx, Duration::from_secs(min_age)).await?;
            println!("Deleted {} orphaned vectors.", deleted);
        }
        Commands::Serve => {
            let ctx = AppContext::open(cfg).await?;
            server::run_server(ctx).await?;
        }
    }

    Ok(())
}

async fn run_brain(cfg: Config, action: BrainAction) -> anyhow::Result<()> {
    let ctx = AppContext::open(cfg).await?;
    match action {
        BrainAction::Create {
            user,
            name,
            description,
        } => {
            let mut new = NewBrain {
                name,
                ..NewBrain::default()
            };
            if let Some(description) = description {
                new.description = description;
            }
            let brain = brains::create_brain_for_user(&ctx, user, &new).await?;
            println!("{}", brain.id);
        }
        BrainAction::List { user } => {
            for brain in brains::user_brains(&ctx, user).await? {
                println!("{}  {:<7}  {}", brain.id, brain.rights.as_str(), brain.name);
            }
        }
    }
    Ok(())
}

async fn run_upload(
    cfg: Config,
    path: &std::path::Path,
    brain_id: Uuid,
    summarize: bool,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("{} has no file name", path.display()))?;

    let ctx = AppContext::open(cfg).await?;
    brains::get_brain(&ctx, brain_id).await?;

    let file = UploadedFile::new(name, bytes);
    let options = UploadOptions {
        enable_summarization: summarize,
        credential: api_key,
    };
    let message = upload_file(&ctx, brain_id, &file, &options).await?;
    println!("[{:?}] {}", message.kind, message.message);
    Ok(())
}
