//! OmniRAG CLI: classify queries and retrieve fused RAG context from the terminal.

mod bootstrap;
mod commands;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// OmniRAG: retrieval strategy selection and multi-source context fusion
#[derive(Parser, Debug)]
#[command(name = "omnirag", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
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
pub enum Commands {
    /// Decide which source should answer a query
    Classify {
        /// The user query
        text: String,
    },
    /// Retrieve context for a query
    Query {
        /// The user query
        text: String,
        /// Maximum number of documents (defaults to retrieval.default_max_docs)
        #[arg(long)]
        max_docs: Option<usize>,
        /// Force a strategy: db, vector, or graph
        #[arg(long)]
        strategy: Option<String>,
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Summary)]
        format: OutputFormat,
    },
    /// Inspect the known-entity index
    Entities {
        /// Report whether NAME is a known entity
        #[arg(long)]
        check: Option<String>,
        /// Count known-entity mentions in TEXT
        #[arg(long)]
        mention: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(clap::Subcommand, Debug)]
pub enum ConfigAction {
    /// Write a default configuration to the workspace
    Init,
    /// Print the effective configuration
    Show,
    /// Check the effective configuration for problems
    Validate,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// The full result as JSON
    Json,
    /// The system-prompt context block
    Prompt,
    /// A short human-readable report
    Summary,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up tracing: human-readable stderr + JSON file logging
    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    // RUST_LOG, when set, overrides the verbosity flags on stderr
    let stderr_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let log_dir = directories::ProjectDirs::from("dev", "omnirag", "omnirag")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "omnirag.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let output = commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
