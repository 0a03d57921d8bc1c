// Simone MCP Server - Main Entry Point
//
// CLI and MCP stdio server.
// Usage:
//   simone-mcp --project <dir> serve          # Run MCP server (stdio)
//   simone-mcp --project <dir> status         # Show store location and counts
//   simone-mcp --project <dir> recent         # Show recent activity records
//
// The project directory is required (flag or PROJECT_PATH env); without it
// there is no defined location for the store, so startup fails non-zero.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use simone_mcp::{diag, mcp, paths, storage::ActivityStore};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "simone-mcp")]
#[command(version)]
#[command(about = "Simone MCP server - structured activity logging over stdio JSON-RPC")]
struct Cli {
    /// Project directory; the activity database lives at <project>/.simone/simone.db
    #[arg(short, long, env = "PROJECT_PATH")]
    project: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run MCP server (stdio JSON-RPC)
    Serve,

    /// Show store location and row counts
    Status,

    /// Show the most recent activity records
    Recent {
        /// Maximum number of records to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn main() -> Result<()> {
    // stdout carries JSON-RPC frames in serve mode; logging stays on stderr.
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .try_init();

    let cli = Cli::parse();

    diag::init(&paths::logs_dir(&cli.project));

    let db_path = paths::db_path(&cli.project);
    let store = ActivityStore::open(&db_path)
        .with_context(|| format!("failed to open activity store at {}", db_path.display()))?;
    store.ensure_schema().context("failed to initialize activity schema")?;

    match cli.command {
        Commands::Serve => {
            mcp::run(&store);
        }

        Commands::Status => {
            println!("{} v{}", mcp::SERVER_NAME, mcp::SERVER_VERSION);
            println!("Store: {}", db_path.display());
            println!("Activities:   {}", store.activity_count()?);
            println!("Tags:         {}", store.tag_count()?);
            println!("File touches: {}", store.file_touch_count()?);
        }

        Commands::Recent { limit } => {
            let rows = store.recent(limit)?;
            if rows.is_empty() {
                println!("No activities logged yet.");
            }
            for row in rows {
                let status = if row.success { "ok" } else { "FAILED" };
                println!(
                    "[{}] #{} {} [{}] {} ({})",
                    row.timestamp, row.id, status, row.tool_name, row.activity, row.activity_type
                );
                if let Some(err) = row.error {
                    println!("    error: {}", err);
                }
            }
        }
    }

    store.close().context("failed to close activity store")?;
    Ok(())
}
