//! docqa CLI — question answering over your own documents.
//!
//! Ingests plain-text files into the configured vector store and answers
//! questions against them, one-shot (`ask`) or interactively (`chat`).

mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// Ask questions of your own documents
#[derive(Parser, Debug)]
#[command(name = "docqa", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Ingest files and answer a single question
    Ask {
        /// The question to answer
        question: String,

        /// Text file(s) to ingest before answering
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,
    },
    /// Ingest files, then answer questions interactively
    Chat {
        /// Text file(s) to ingest
        #[arg(short, long = "file", required = true)]
        files: Vec<PathBuf>,
    },
    /// Show how a file would be chunked, without indexing anything
    Chunks {
        /// Text file to inspect
        file: PathBuf,
    },
    /// Remove a document's vectors from the vector store
    Delete {
        /// Document id
        document_id: Uuid,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = docqa_core::load_config(cli.config.as_deref())
        .map_err(|e| anyhow::anyhow!("Configuration error: {e}"))?;

    match cli.command {
        Commands::Ask { question, files } => commands::ask(&config, &files, &question).await,
        Commands::Chat { files } => commands::chat(&config, &files).await,
        Commands::Chunks { file } => commands::chunks(&config, &file),
        Commands::Delete { document_id } => commands::delete(&config, document_id).await,
    }
}
