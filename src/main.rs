//! # Concept Miner CLI (`cmine`)
//!
//! ## Usage
//!
//! ```bash
//! cmine --config ./config/cmine.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cmine init` | Create the SQLite database and run schema migrations |
//! | `cmine mine` | Extract, embed, store and weave concepts from the notes directory |
//! | `cmine query <file>` | Run one instruction over one file, chunk by chunk |
//! | `cmine embed "<text>"` | Print the embedding of a text |
//! | `cmine weave` | Rebuild the similarity network |
//! | `cmine concepts` | List stored concepts |
//! | `cmine show <id>` | Print one concept and its links |
//! | `cmine stats` | Database statistics |
//! | `cmine models` | List registered model back-ends |
//!
//! Logs go to stderr; set `RUST_LOG` (default `info`) to adjust.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use concept_miner::progress::ProgressMode;
use concept_miner::query::QueryArgs;
use concept_miner::{backends, concepts, config, migrate, mine, query, stats, weave};

/// Concept Miner: mine key concepts from your notes with a local LLM.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/cmine.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "cmine",
    about = "Concept Miner: mine key concepts from a notes directory with a local LLM",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/cmine.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the concepts and networks
    /// tables. Safe to run more than once.
    Init,

    /// Run the full pipeline over the notes directory.
    ///
    /// Scans `[notes].root`, extracts key concepts from each note, embeds
    /// and stores them, then weaves the similarity network.
    Mine {
        /// Maximum number of notes to process.
        #[arg(long)]
        limit: Option<usize>,

        /// Progress output on stderr. Defaults to `human` on a TTY, `off` otherwise.
        #[arg(long, value_enum)]
        progress: Option<ProgressMode>,
    },

    /// Dispatch an instruction over every chunk of one file.
    Query {
        /// File whose content is the context.
        file: PathBuf,

        /// Instruction sent with every chunk.
        #[arg(long)]
        instruction: String,

        /// `generate` or `chat` (overrides `[dispatch].api_type`).
        #[arg(long)]
        api_type: Option<String>,

        /// `json` or `none` (overrides `[dispatch].format`).
        #[arg(long)]
        format: Option<String>,

        /// Window size in characters (overrides `[dispatch].chunk_size`).
        #[arg(long)]
        chunk_size: Option<usize>,
    },

    /// Print the embedding of a text.
    Embed {
        text: String,
    },

    /// Rebuild the similarity network from stored embeddings.
    Weave {
        /// `<feature>,<metric>,<selection>`, e.g. `vector,similarity,topk`.
        #[arg(long)]
        strategy: Option<String>,
    },

    /// List stored concepts, newest first.
    Concepts {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Show one concept with its summary and links.
    Show {
        /// Concept UUID.
        id: String,
    },

    /// Show database statistics.
    Stats,

    /// List registered model back-ends.
    Models {
        /// Also ask the local server which models it serves.
        #[arg(long)]
        discover: bool,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Mine { limit, progress } => {
            let mode = progress.unwrap_or_else(ProgressMode::default_for_tty);
            mine::run_mine(&cfg, limit, mode).await?;
        }
        Commands::Query {
            file,
            instruction,
            api_type,
            format,
            chunk_size,
        } => {
            let args = QueryArgs {
                api_type,
                format,
                chunk_size,
            };
            query::run_query(&cfg, &file, &instruction, &args).await?;
        }
        Commands::Embed { text } => {
            query::run_embed(&cfg, &text).await?;
        }
        Commands::Weave { strategy } => {
            weave::run_weave(&cfg, strategy.as_deref()).await?;
        }
        Commands::Concepts { limit } => {
            concepts::run_concepts(&cfg, limit).await?;
        }
        Commands::Show { id } => {
            concepts::run_show(&cfg, &id).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Models { discover } => {
            backends::run_models(&cfg, discover).await?;
        }
    }

    Ok(())
}
