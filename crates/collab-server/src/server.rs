//! WebSocket server hosting the coordination hub.
//!
//! Accepts connections, assigns `conn-N` ids, and routes every decoded
//! client message through a [`DocumentHub`], sending the resulting
//! deliveries back out in order.
//!
//! WebSocket upgrades run in their own tasks under a timeout and hand the
//! finished stream back to the routing loop, which never awaits a peer.

use crate::connection::{ClientConnection, ConnectionEvent};
use anyhow::Result;
use collab_core::hub::{ConnectionId, Delivery, DocumentHub, DocumentStore};
use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, WebSocketStream};
use tracing::{debug, error, info, warn};

/// How long a client gets to complete the WebSocket upgrade.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

type Upgraded = (WebSocketStream<TcpStream>, SocketAddr);

pub struct CollabServer<S: DocumentStore> {
    hub: DocumentHub<S>,
    connections: HashMap<ConnectionId, ClientConnection>,
    next_conn_id: u64,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
    upgraded_tx: mpsc::UnboundedSender<Upgraded>,
    upgraded_rx: mpsc::UnboundedReceiver<Upgraded>,
}

impl<S: DocumentStore> CollabServer<S> {
    pub fn new(store: S) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (upgraded_tx, upgraded_rx) = mpsc::unbounded_channel();

        Self {
            hub: DocumentHub::new(store),
            connections: HashMap::new(),
            next_conn_id: 1,
            event_tx,
            event_rx,
            upgraded_tx,
            upgraded_rx,
        }
    }

    /// Bind to an address and return the TCP listener.
    pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!("WebSocket server listening on {}", listen_addr);
        Ok(listener)
    }

    pub fn hub(&self) -> &DocumentHub<S> {
        &self.hub
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Start upgrading a TCP connection to WebSocket in the background.
    ///
    /// The finished stream is registered by the routing loop in [`CollabServer::run`].
    pub fn accept_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let upgraded = self.upgraded_tx.clone();
        tokio::spawn(async move {
            match timeout(HANDSHAKE_TIMEOUT, accept_async(stream)).await {
                Ok(Ok(ws)) => {
                    let _ = upgraded.send((ws, addr));
                }
                Ok(Err(e)) => {
                    // Health checks (like `nc -z`) connect and close without upgrading.
                    let err_str = e.to_string();
                    if err_str.contains("Handshake not finished")
                        || err_str.contains("Connection reset")
                        || err_str.contains("unexpected EOF")
                    {
                        debug!("Connection closed before upgrade from {}", addr);
                    } else {
                        error!("WebSocket upgrade failed for {}: {}", addr, e);
                    }
                }
                Err(_) => warn!("WebSocket upgrade from {} timed out", addr),
            }
        });
    }

    /// Register an upgraded connection and start reading from it.
    pub fn register(
        &mut self,
        ws_stream: WebSocketStream<TcpStream>,
        addr: SocketAddr,
    ) -> ConnectionId {
        let conn = ConnectionId(self.next_conn_id);
        self.next_conn_id += 1;

        info!("New connection from {} ({})", addr, conn);

        let connection = ClientConnection::new(conn, ws_stream, self.event_tx.clone());
        self.connections.insert(conn, connection);
        conn
    }

    /// Apply one connection event to the hub and send what it produces.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Message { conn, message } => {
                let deliveries = self.hub.handle(conn, message);
                self.deliver(deliveries);
            }
            ConnectionEvent::Closed { conn } => {
                info!("Connection closed: {}", conn);
                self.hub.disconnect(conn);
                self.connections.remove(&conn);
            }
        }
    }

    fn deliver(&self, deliveries: Vec<Delivery>) {
        for (conn, message) in deliveries {
            let Some(connection) = self.connections.get(&conn) else {
                debug!("Dropping {} for departed {}", message.name(), conn);
                continue;
            };
            if let Err(e) = connection.send(&message) {
                warn!("Failed to send {} to {}: {}", message.name(), conn, e);
            }
        }
    }

    /// Serve until `shutdown` resolves.
    pub async fn run(mut self, listener: TcpListener, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept_connection(stream, addr),
                        Err(e) => error!("Failed to accept connection: {}", e),
                    }
                }

                Some((ws_stream, addr)) = self.upgraded_rx.recv() => {
                    self.register(ws_stream, addr);
                }

                Some(event) = self.event_rx.recv() => {
                    self.handle_event(event);
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        for (_, mut connection) in self.connections.drain() {
            connection.close().await;
        }
        info!("Server stopped");
    }
}
