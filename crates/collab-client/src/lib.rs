//! collab-client: Terminal client for collaborative documents.
//!
//! Connects one session to the coordination server over WebSocket and
//! drives it from typed commands.

pub mod app;
pub mod command;
pub mod summarizer;
pub mod transport;

pub use app::{run_session, ClientApp, ClientConfig, Reply};
pub use command::{Command, CommandError};
pub use summarizer::HttpSummarizer;
pub use transport::{Inbound, WsTransport};
