//! collab-server: Coordination endpoint for collaborative documents.
//!
//! Serves the document protocol over WebSocket and persists saved documents
//! as JSON files in a data directory.

use anyhow::Result;
use clap::Parser;
use collab_server::{CollabServer, FileStore};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "collab-server")]
#[command(about = "Coordination server for collaborative rich-text documents")]
struct Args {
    /// Address to listen on for incoming connections
    #[arg(short, long, env = "COLLAB_LISTEN", default_value = "127.0.0.1:5174")]
    listen: String,

    /// Directory holding saved documents
    #[arg(short, long, env = "COLLAB_DATA_DIR", default_value = "./documents")]
    data_dir: PathBuf,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,collab_server=debug,collab_core=debug"
    } else {
        "info,collab_server=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting collab-server");
    info!("Data directory: {:?}", args.data_dir);

    let store = FileStore::open(&args.data_dir)?;
    let listener = CollabServer::<FileStore>::bind(&args.listen).await?;
    let server = CollabServer::new(store);

    info!("Server running. Press Ctrl+C to stop.");
    server
        .run(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    info!("Shutting down");
    Ok(())
}
