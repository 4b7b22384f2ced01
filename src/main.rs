//! # docqa CLI
//!
//! ```bash
//! docqa --config ./config/docqa.toml init
//! docqa serve
//! docqa ask --source 3f2a... --source 9c1e... "What is the capital of France?"
//! docqa summarize --model llama4 paper.pdf appendix.pdf
//! ```
//!
//! Logging goes to stderr and is filtered by `RUST_LOG`
//! (default `docqa=info,tower_http=info`).

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use docqa::config::load_config;
use docqa::migrate::run_migrations;
use docqa::rag::QaRequest;
use docqa::server::{run_server, AppState};

/// Ask questions about your PDFs, grounded in their text.
#[derive(Parser)]
#[command(name = "docqa", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/docqa.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the SQLite database and tables. Safe to run repeatedly.
    Init,

    /// Start the HTTP server on `[server].bind`.
    Serve,

    /// Answer a question from uploaded sources.
    Ask {
        /// Source id to search (repeatable, order preserved).
        #[arg(long = "source", required = true)]
        sources: Vec<String>,

        /// Chat model name; unknown names fall back to the default.
        #[arg(long, default_value = "")]
        model: String,

        question: String,
    },

    /// Summarize files into markdown notes.
    Summarize {
        #[arg(long, default_value = "")]
        model: String,

        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("docqa=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            run_migrations(&config).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            run_server(&config).await?;
        }
        Commands::Ask {
            sources,
            model,
            question,
        } => {
            let state = AppState::from_config(&config).await?;
            let request = QaRequest {
                question,
                source_ids: sources,
                llm_model: model,
                persisted_index: None,
            };
            let result = state.pipeline.answer(&request).await?;

            println!("{}", result.answer);
            println!();
            println!("References:");
            for reference in &result.references {
                println!("  - {}", reference);
            }
            println!();
            println!("Contexts:");
            for (i, context) in result.contexts.iter().enumerate() {
                println!("--- [{}] ---", i + 1);
                println!("{}", context);
            }
        }
        Commands::Summarize { model, paths } => {
            let state = AppState::from_config(&config).await?;
            let output = state.pipeline.summarize(&paths, &model).await?;
            println!("{}", output.markdown);
            if let Some(path) = output.index_path {
                eprintln!("index persisted to {}", path.display());
            }
        }
    }

    Ok(())
}
