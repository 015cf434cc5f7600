//! WebSocket transport for a document channel.
//!
//! The socket is split into two tasks. The writer drains an unbounded queue
//! so `Transport::send` never blocks; the reader decodes server frames into
//! an inbound queue and finishes with [`Inbound::Closed`].

use anyhow::{Context, Result};
use collab_core::channel::{self, ChannelError, Transport};
use collab_core::protocol::MAX_MESSAGE_SIZE;
use collab_core::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Traffic from the server, in arrival order.
#[derive(Debug)]
pub enum Inbound {
    Message(ServerMessage),
    /// The connection ended; nothing follows
    Closed,
}

enum Outgoing {
    Message(ClientMessage),
    Close,
}

pub struct WsTransport {
    outgoing: mpsc::UnboundedSender<Outgoing>,
    writer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl WsTransport {
    /// Connect to the coordination endpoint.
    pub async fn connect(url: &str) -> Result<(Self, mpsc::UnboundedReceiver<Inbound>)> {
        let (ws, _) = connect_async(url)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;
        info!("Connected to {}", url);

        let (write, read) = ws.split();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(Self::write_loop(write, outgoing_rx));
        let reader = tokio::spawn(Self::read_loop(read, inbound_tx));

        Ok((
            Self {
                outgoing: outgoing_tx,
                writer,
                reader,
            },
            inbound_rx,
        ))
    }

    async fn write_loop(
        mut write: futures::stream::SplitSink<WsStream, Message>,
        mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    ) {
        while let Some(item) = outgoing.recv().await {
            let message = match item {
                Outgoing::Message(message) => message,
                Outgoing::Close => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
            };

            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to encode {}: {}", message.name(), e);
                    continue;
                }
            };
            debug!("Sending {} ({} bytes)", message.name(), json.len());
            if let Err(e) = write.send(Message::text(json)).await {
                warn!("Failed to send {}: {}", message.name(), e);
                break;
            }
        }
        debug!("Writer stopped");
    }

    async fn read_loop(
        mut read: futures::stream::SplitStream<WsStream>,
        inbound: mpsc::UnboundedSender<Inbound>,
    ) {
        loop {
            match read.next().await {
                Some(Ok(msg)) => {
                    let data = match msg {
                        Message::Text(text) => text.into_bytes(),
                        Message::Binary(data) => data,
                        Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                        Message::Close(_) => {
                            debug!("Received close frame");
                            break;
                        }
                    };

                    if data.len() > MAX_MESSAGE_SIZE {
                        warn!("Message exceeds max size ({} bytes), dropping", data.len());
                        continue;
                    }

                    match ServerMessage::from_json(&data) {
                        Ok(message) => {
                            debug!("Received {}", message.name());
                            if inbound.send(Inbound::Message(message)).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("Dropping malformed server message: {}", e),
                    }
                }
                Some(Err(e)) => {
                    match e {
                        WsError::ConnectionClosed | WsError::AlreadyClosed => {
                            debug!("Connection closed");
                        }
                        _ => error!("WebSocket error: {}", e),
                    }
                    break;
                }
                None => {
                    debug!("Stream ended");
                    break;
                }
            }
        }

        let _ = inbound.send(Inbound::Closed);
    }
}

impl Transport for WsTransport {
    fn send(&self, message: ClientMessage) -> channel::Result<()> {
        self.outgoing
            .send(Outgoing::Message(message))
            .map_err(|_| ChannelError::Unavailable("writer stopped".into()))
    }

    fn close(&self) {
        if self.outgoing.send(Outgoing::Close).is_err() {
            self.reader.abort();
        }
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.reader.abort();
        if self.writer.is_finished() {
            return;
        }
        // close() may never have been called
        let _ = self.outgoing.send(Outgoing::Close);
    }
}
