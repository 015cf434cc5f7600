//! Coordination hub: the authoritative side of the document protocol.
//!
//! A pure state machine. Callers feed it `(connection, ClientMessage)` pairs
//! and send out whatever deliveries it returns, in order. The WebSocket
//! server drives it over the network; [`crate::local::LocalHub`] drives it
//! in-process.
//!
//! Each open document lives in a room holding the live authoritative copy
//! and the connections that joined it. Changes are applied to the live
//! copy in arrival order and fanned out to every other member. Only
//! `save-document` touches the store.

use crate::content::DocumentContent;
use crate::document_id::DocumentId;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::rich_text::RichText;
use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt document data: {0}")]
    Corrupt(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Durable storage for document snapshots.
pub trait DocumentStore {
    /// Load a document, or `None` if it has never been saved.
    fn load(&self, id: &DocumentId) -> Result<Option<DocumentContent>>;

    fn save(&mut self, id: &DocumentId, content: &DocumentContent) -> Result<()>;
}

/// Store that keeps snapshots in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    documents: HashMap<DocumentId, DocumentContent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document.
    pub fn with_document(mut self, id: DocumentId, content: DocumentContent) -> Self {
        self.documents.insert(id, content);
        self
    }

    pub fn get(&self, id: &DocumentId) -> Option<&DocumentContent> {
        self.documents.get(id)
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, id: &DocumentId) -> Result<Option<DocumentContent>> {
        Ok(self.documents.get(id).cloned())
    }

    fn save(&mut self, id: &DocumentId, content: &DocumentContent) -> Result<()> {
        self.documents.insert(id.clone(), content.clone());
        Ok(())
    }
}

/// Identifies one client connection to the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A message to send to one connection.
pub type Delivery = (ConnectionId, ServerMessage);

struct Room {
    content: RichText,
    /// Join order; fan-out follows it
    members: Vec<ConnectionId>,
}

/// Rooms, membership and the live copy of every open document.
pub struct DocumentHub<S: DocumentStore> {
    store: S,
    rooms: HashMap<DocumentId, Room>,
    joined: HashMap<ConnectionId, DocumentId>,
}

impl<S: DocumentStore> DocumentHub<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            rooms: HashMap::new(),
            joined: HashMap::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Number of documents currently open.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Connections in a document's room, in join order.
    pub fn members(&self, id: &DocumentId) -> Vec<ConnectionId> {
        self.rooms
            .get(id)
            .map(|room| room.members.clone())
            .unwrap_or_default()
    }

    /// Live copy of an open document.
    pub fn document(&self, id: &DocumentId) -> Option<DocumentContent> {
        self.rooms.get(id).map(|room| room.content.to_content())
    }

    /// Process one message from a connection.
    pub fn handle(&mut self, conn: ConnectionId, message: ClientMessage) -> Vec<Delivery> {
        debug!("{} from {} for {}", message.name(), conn, message.document_id());
        match message {
            ClientMessage::GetDocument { document_id } => self.join(conn, document_id),
            ClientMessage::SendChanges {
                document_id,
                changes,
            } => {
                if !self.is_member(conn, &document_id) {
                    warn!("Dropping send-changes from {} for unjoined {}", conn, document_id);
                    return Vec::new();
                }
                let Some(room) = self.rooms.get_mut(&document_id) else {
                    return Vec::new();
                };
                if let Err(e) = room.content.apply(&changes) {
                    warn!("Rejecting change from {} on {}: {}", conn, document_id, e);
                    return Vec::new();
                }
                room.members
                    .iter()
                    .filter(|member| **member != conn)
                    .map(|member| {
                        (
                            *member,
                            ServerMessage::ReceiveChanges {
                                changes: changes.clone(),
                            },
                        )
                    })
                    .collect()
            }
            ClientMessage::SaveDocument {
                document_id,
                content,
            } => {
                if !self.is_member(conn, &document_id) {
                    warn!("Dropping save-document from {} for unjoined {}", conn, document_id);
                    return Vec::new();
                }
                let live = match RichText::from_content(&content) {
                    Ok(live) => live,
                    Err(e) => {
                        warn!("Rejecting save from {} on {}: {}", conn, document_id, e);
                        return Vec::new();
                    }
                };
                if let Some(room) = self.rooms.get_mut(&document_id) {
                    room.content = live;
                }
                match self.store.save(&document_id, &content) {
                    Ok(()) => info!("Saved {} ({} chars)", document_id, content.len()),
                    Err(e) => error!("Failed to save {}: {}", document_id, e),
                }
                Vec::new()
            }
        }
    }

    /// Remove a connection from its room. Rooms left empty are unloaded.
    pub fn disconnect(&mut self, conn: ConnectionId) {
        let Some(document_id) = self.joined.remove(&conn) else {
            return;
        };
        if let Some(room) = self.rooms.get_mut(&document_id) {
            room.members.retain(|member| *member != conn);
            if room.members.is_empty() {
                self.rooms.remove(&document_id);
                debug!("Unloaded {}", document_id);
            }
        }
    }

    fn is_member(&self, conn: ConnectionId, id: &DocumentId) -> bool {
        self.joined.get(&conn) == Some(id)
    }

    fn join(&mut self, conn: ConnectionId, document_id: DocumentId) -> Vec<Delivery> {
        if self.joined.get(&conn).is_some_and(|current| *current != document_id) {
            self.disconnect(conn);
        }

        if !self.rooms.contains_key(&document_id) {
            let content = match self.store.load(&document_id) {
                Ok(Some(content)) => content,
                Ok(None) => DocumentContent::new(),
                Err(e) => {
                    // Never open empty over an unreadable stored copy.
                    error!("Failed to load {}: {}", document_id, e);
                    return Vec::new();
                }
            };
            let content = match RichText::from_content(&content) {
                Ok(content) => content,
                Err(e) => {
                    error!("Stored copy of {} does not load: {}", document_id, e);
                    return Vec::new();
                }
            };
            info!("Opened {} ({} chars)", document_id, content.len());
            self.rooms.insert(
                document_id.clone(),
                Room {
                    content,
                    members: Vec::new(),
                },
            );
        }

        let Some(room) = self.rooms.get_mut(&document_id) else {
            return Vec::new();
        };
        if !room.members.contains(&conn) {
            room.members.push(conn);
        }
        let document = room.content.to_content();
        self.joined.insert(conn, document_id);

        vec![(conn, ServerMessage::LoadDocument { document })]
    }
}
