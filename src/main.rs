//! # Research Harness CLI (`rsh`)
//!
//! ## Usage
//!
//! ```bash
//! rsh --config ./config/research.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rsh init` | Create the SQLite database and run schema migrations |
//! | `rsh research "<query>"` | Run the full pipeline and store the report |
//! | `rsh ask "<query>"` | Answer from ingested documents only |
//! | `rsh ingest <sources...>` | Ingest files, directories or URLs |
//! | `rsh stats` | Retrieval engine and memory statistics |
//! | `rsh delete <source>` | Remove every chunk from one source |
//! | `rsh clear` | Remove every chunk |
//! | `rsh memory list\|get\|clear` | Browse past reports |

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use research_harness::harness::Harness;
use research_harness::{config, db, ingest, logging, memory, migrate, research, stats};

/// Research Harness CLI: a staged LLM research pipeline with a local
/// retrieval engine.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/research.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "rsh",
    about = "Research Harness — a staged LLM research pipeline with a local retrieval engine",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/research.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Safe to run repeatedly.
    Init,

    /// Run the full research pipeline for a query.
    ///
    /// The final report is printed and stored in memory, where the next
    /// run's Context-Analysis stage will see it.
    Research {
        query: String,

        /// Record each stage's input, prompt and output.
        #[arg(long)]
        debug: bool,

        /// Print the whole research state as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Answer a question from ingested documents only.
    Ask {
        query: String,

        /// Token budget for the assembled context.
        #[arg(long)]
        max_tokens: Option<usize>,

        #[arg(long)]
        debug: bool,

        #[arg(long)]
        json: bool,
    },

    /// Ingest files, directories or `http(s)://` URLs.
    Ingest {
        #[arg(required = true)]
        sources: Vec<String>,

        #[arg(long)]
        json: bool,
    },

    /// Show retrieval engine and memory statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Delete every chunk ingested from `source`.
    Delete { source: String },

    /// Delete every ingested chunk.
    Clear,

    /// Browse stored research reports.
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand)]
enum MemoryAction {
    /// List reports, newest first.
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,

        #[arg(long, default_value_t = 0)]
        offset: usize,

        #[arg(long)]
        json: bool,
    },
    /// Print one report by id.
    Get {
        id: String,

        #[arg(long)]
        json: bool,
    },
    /// Delete every stored report.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    logging::init_logging(&cfg.logging.level)?;

    if let Commands::Init = cli.command {
        let pool = db::connect(&cfg).await?;
        migrate::run_migrations(&pool).await?;
        println!("Database initialized successfully.");
        return Ok(());
    }

    let harness = Harness::open(cfg).await?;

    match cli.command {
        Commands::Init => {}
        Commands::Research { query, debug, json } => {
            research::run_research(&harness, &query, debug, json).await?;
        }
        Commands::Ask {
            query,
            max_tokens,
            debug,
            json,
        } => {
            research::run_ask(&harness, &query, max_tokens, debug, json).await?;
        }
        Commands::Ingest { sources, json } => {
            ingest::run_ingest(&harness, &sources, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&harness, json).await?;
        }
        Commands::Delete { source } => {
            ingest::run_delete(&harness, &source).await?;
        }
        Commands::Clear => {
            ingest::run_clear(&harness).await?;
        }
        Commands::Memory { action } => match action {
            MemoryAction::List {
                limit,
                offset,
                json,
            } => {
                memory::run_memory_list(&harness, limit, offset, json).await?;
            }
            MemoryAction::Get { id, json } => {
                memory::run_memory_get(&harness, &id, json).await?;
            }
            MemoryAction::Clear => {
                memory::run_memory_clear(&harness).await?;
            }
        },
    }

    Ok(())
}
