//! Individual client connection management.
//!
//! Each connection wraps a WebSocket stream split into halves: a spawned
//! read task decodes client messages into `ConnectionEvent`s, and a spawned
//! write task drains an outbound queue. Sending never waits on the peer's
//! socket, so one slow reader cannot hold up the routing loop.

use anyhow::{anyhow, Result};
use collab_core::hub::ConnectionId;
use collab_core::protocol::{ClientMessage, MAX_MESSAGE_SIZE};
use collab_core::ServerMessage;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{
    tungstenite::{Error as WsError, Message},
    WebSocketStream,
};
use tracing::{debug, error, warn};

/// Event emitted by a connection's read task.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A decoded message from the client
    Message {
        conn: ConnectionId,
        message: ClientMessage,
    },
    /// Connection was closed
    Closed { conn: ConnectionId },
}

type WsWriter = futures::stream::SplitSink<WebSocketStream<TcpStream>, Message>;

/// How long `close` waits for queued frames to go out.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

enum Outgoing {
    Frame(String),
    Close,
}

/// A single WebSocket connection to a client.
pub struct ClientConnection {
    pub conn: ConnectionId,
    outgoing: mpsc::UnboundedSender<Outgoing>,
    read_task: Option<JoinHandle<()>>,
    write_task: Option<JoinHandle<()>>,
}

impl ClientConnection {
    /// Wrap an accepted WebSocket stream and spawn its read task.
    pub fn new(
        conn: ConnectionId,
        ws_stream: WebSocketStream<TcpStream>,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) -> Self {
        let (write, read) = ws_stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let read_task = tokio::spawn(async move {
            Self::read_loop(conn, read, event_tx).await;
        });
        let write_task = tokio::spawn(Self::write_loop(conn, write, outgoing_rx));

        Self {
            conn,
            outgoing,
            read_task: Some(read_task),
            write_task: Some(write_task),
        }
    }

    async fn write_loop(
        conn: ConnectionId,
        mut write: WsWriter,
        mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    ) {
        while let Some(item) = outgoing.recv().await {
            let frame = match item {
                Outgoing::Frame(json) => Message::text(json),
                Outgoing::Close => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            };
            if let Err(e) = write.send(frame).await {
                warn!("Failed to write to {}: {}", conn, e);
                break;
            }
        }
        debug!("Writer for {} stopped", conn);
    }

    async fn read_loop(
        conn: ConnectionId,
        mut read: futures::stream::SplitStream<WebSocketStream<TcpStream>>,
        event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    ) {
        loop {
            match read.next().await {
                Some(Ok(msg)) => {
                    let data = match msg {
                        Message::Text(text) => text.into_bytes(),
                        Message::Binary(data) => data,
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                        Message::Close(_) => {
                            debug!("Received close frame from {}", conn);
                            break;
                        }
                    };

                    if data.len() > MAX_MESSAGE_SIZE {
                        warn!(
                            "Message from {} exceeds max size ({} > {}), dropping",
                            conn,
                            data.len(),
                            MAX_MESSAGE_SIZE
                        );
                        continue;
                    }

                    match ClientMessage::from_json(&data) {
                        Ok(message) => {
                            debug!("{} from {} ({} bytes)", message.name(), conn, data.len());
                            let _ = event_tx.send(ConnectionEvent::Message { conn, message });
                        }
                        Err(e) => {
                            warn!("Dropping malformed message from {}: {}", conn, e);
                        }
                    }
                }
                Some(Err(e)) => {
                    match e {
                        WsError::ConnectionClosed | WsError::AlreadyClosed => {
                            debug!("Connection {} closed", conn);
                        }
                        _ => {
                            error!("WebSocket error on {}: {}", conn, e);
                        }
                    }
                    break;
                }
                None => {
                    debug!("Connection {} stream ended", conn);
                    break;
                }
            }
        }

        let _ = event_tx.send(ConnectionEvent::Closed { conn });
    }

    /// Queue a server message as a JSON text frame.
    pub fn send(&self, message: &ServerMessage) -> Result<()> {
        let json = message.to_json()?;
        self.outgoing
            .send(Outgoing::Frame(json))
            .map_err(|_| anyhow!("Writer for {} has stopped", self.conn))
    }

    /// Close the connection gracefully, flushing what is already queued.
    pub async fn close(&mut self) {
        let _ = self.outgoing.send(Outgoing::Close);
        if let Some(task) = self.write_task.take() {
            if timeout(CLOSE_TIMEOUT, task).await.is_err() {
                debug!("Timed out closing {}", self.conn);
            }
        }
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
    }
}

impl Drop for ClientConnection {
    fn drop(&mut self) {
        if let Some(task) = self.read_task.take() {
            task.abort();
        }
        if let Some(task) = self.write_task.take() {
            task.abort();
        }
    }
}
