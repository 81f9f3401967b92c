//! Thin CLI: initialize configuration, index a workspace, run one-off
//! searches, or serve the MCP tool surface on stdio.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use codescout::engine::Engine;
use codescout::{Settings, logging};

#[derive(Parser)]
#[command(name = "codescout")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Workspace code-intelligence engine for AI coding agents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a configuration file in the current directory
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Index a workspace directory
    Index {
        /// Workspace root
        path: PathBuf,

        /// Re-index even when the index looks fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Full-text search an indexed workspace
    Search {
        /// Workspace root
        path: PathBuf,

        /// Query string (append ~ for fuzzy)
        query: String,

        /// Maximum results
        #[arg(short, long, default_value_t = 10)]
        limit: usize,
    },

    /// Start the MCP server on stdio
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load().unwrap_or_else(|e| {
        eprintln!("warning: could not load settings ({e}); using defaults");
        Settings::default()
    });
    logging::init_with_config(&settings.logging);

    match cli.command {
        Commands::Init { force } => {
            let path = Settings::init_config_file(force)?;
            eprintln!("created configuration at {}", path.display());
        }

        Commands::Index { path, force } => {
            let engine = Engine::new(settings).await?;
            let (hash, stats) = engine.index_workspace(&path, force).await?;
            eprintln!(
                "indexed {} as {hash}: {} files, {} symbols in {} ms",
                path.display(),
                stats.files_indexed,
                stats.symbols,
                stats.duration_ms
            );
            engine.shutdown().await;
        }

        Commands::Search { path, query, limit } => {
            let engine = Engine::new(settings).await?;
            let hits = engine.text_search(&path, &query, limit).await?;
            for hit in &hits {
                for (line, text) in &hit.lines {
                    println!("{}:{line}: {text}", hit.path);
                }
            }
            eprintln!("{} file(s) matched", hits.len());
            engine.shutdown().await;
        }

        Commands::Serve => {
            let engine = Engine::new(settings).await?;
            let server = codescout::mcp::CodeSearchServer::new(Arc::clone(&engine));

            eprintln!("starting MCP server on stdio transport");
            use rmcp::{ServiceExt, transport::stdio};
            let service = server.serve(stdio()).await.map_err(|e| {
                anyhow::anyhow!("failed to start MCP server: {e}")
            })?;
            if let Err(e) = service.waiting().await {
                eprintln!("MCP server error: {e}");
            }
            engine.shutdown().await;
        }
    }

    Ok(())
}
