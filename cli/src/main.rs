//! vchainindex CLI — run a virtual-chain indexer and manage its checkpoint.
//!
//! # Commands
//! ```text
//! vchainindex run    --url <node> [--db <file>] [--id <name>] [--from <hash>]
//! vchainindex status --db <file> [--id <name>]
//! vchainindex reset  --db <file> [--id <name>]
//! vchainindex info
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cmd_run;
mod cmd_state;

#[derive(Parser)]
#[command(
    name = "vchainindex",
    about = "Resumable virtual-chain transaction indexer",
    long_about = "
vchainindex follows a BlockDAG node's virtual chain and delivers each
accepted transaction to its handlers, checkpointing after every step so a
restart resumes where it stopped.

ENVIRONMENT VARIABLES:
  RUST_LOG    Log filter when --log-level is not given (default: info)
",
    version
)]
struct Cli {
    /// Log level or filter directive, e.g. "debug" or "info,vchainindex_core=trace"
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON structured logs
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a node and index until Ctrl-C
    Run {
        /// Node wRPC endpoint (JSON encoding)
        #[arg(long, default_value = vchainindex_rpc::builder::DEFAULT_NODE_URL)]
        url: String,
        /// SQLite database file (in-memory when omitted)
        #[arg(long)]
        db: Option<PathBuf>,
        /// JSON file with an indexer configuration; flags override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Indexer id (namespaces the checkpoint)
        #[arg(long)]
        id: Option<String>,
        /// First block hash to index (default: the node's pruning point)
        #[arg(long)]
        from: Option<String>,
        /// Retries per bootstrap and loop iteration
        #[arg(long)]
        retry: Option<u32>,
        /// Tip polling interval in milliseconds
        #[arg(long)]
        poll_interval_ms: Option<u64>,
        /// Per-request timeout in milliseconds
        #[arg(long, default_value_t = 30_000)]
        timeout_ms: u64,
    },

    /// Show the stored checkpoint of an indexer
    Status {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,
        /// Indexer id
        #[arg(long, default_value = "default")]
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop the stored checkpoint so the next run starts over
    Reset {
        /// SQLite database file
        #[arg(long)]
        db: PathBuf,
        /// Indexer id
        #[arg(long, default_value = "default")]
        id: String,
    },

    /// Show defaults and build info
    Info,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref(), cli.log_json);

    match cli.command {
        Commands::Run {
            url,
            db,
            config,
            id,
            from,
            retry,
            poll_interval_ms,
            timeout_ms,
        } => {
            let options = cmd_run::RunOptions {
                url,
                db,
                config,
                id,
                from,
                retry,
                poll_interval_ms,
                timeout_ms,
            };
            cmd_run::run(options).await
        }

        Commands::Status { db, id, json } => cmd_state::status(&db, &id, json).await,

        Commands::Reset { db, id } => cmd_state::reset(&db, &id).await,

        Commands::Info => {
            cmd_info();
            Ok(())
        }
    }
}

/// Install the global subscriber. An explicit level wins over `RUST_LOG`.
fn init_tracing(level: Option<&str>, json: bool) {
    let filter = match level {
        Some(directives) => EnvFilter::try_new(directives).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer())
            .init();
    }
}

fn cmd_info() {
    let defaults = vchainindex_core::IndexerConfig::default();
    println!("vchainindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Default indexer id: {}", defaults.id);
    println!("  Default start block: node pruning point");
    println!("  Default retries: {}", defaults.retry);
    println!("  Default poll interval: {} ms", defaults.poll_interval_ms);
    println!("  Default node URL: {}", vchainindex_rpc::builder::DEFAULT_NODE_URL);
    println!("  Storage backends: memory, SQLite");
    println!(
        "  Checkpoint namespace: vchainindex:<id> (empty-batch sentinel \"{}\")",
        vchainindex_core::checkpoint::TIP_SENTINEL
    );
}
