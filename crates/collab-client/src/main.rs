//! collab-client: Edit a shared document from the terminal.

use anyhow::Result;
use clap::Parser;
use collab_client::{run_session, ClientConfig};
use collab_core::DocumentId;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "collab-client")]
#[command(about = "Collaborative rich-text editing from the terminal")]
struct Args {
    /// WebSocket URL of the coordination server
    #[arg(short, long, env = "COLLAB_SERVER", default_value = "ws://localhost:5174")]
    server: String,

    /// Document to open (a new one is created if omitted)
    #[arg(short, long, env = "COLLAB_DOCUMENT")]
    document: Option<DocumentId>,

    /// Summary service endpoint
    #[arg(long, env = "COLLAB_SUMMARY_URL")]
    summary_url: Option<String>,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to warn (or debug with --verbose).
    // Logs go to stderr so they don't interleave with the document view.
    let default_filter = if args.verbose {
        "debug,collab_client=debug,collab_core=debug"
    } else {
        "warn,collab_client=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let document_id = args.document.unwrap_or_else(|| {
        let id = DocumentId::generate();
        info!("Generated document ID: {}", id);
        id
    });
    println!("Document: {}", document_id);

    let config = ClientConfig {
        server_url: args.server,
        document_id,
        summary_url: args.summary_url,
    };
    run_session(config, BufReader::new(tokio::io::stdin())).await
}
