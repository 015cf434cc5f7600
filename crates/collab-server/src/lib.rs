//! collab-server library: Exposes internal modules for testing.
//!
//! This is a thin library layer over the server components,
//! allowing integration tests to access internal types.

pub mod connection;
pub mod server;
pub mod store;

pub use connection::{ClientConnection, ConnectionEvent};
pub use server::CollabServer;
pub use store::FileStore;
