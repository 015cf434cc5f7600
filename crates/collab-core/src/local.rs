//! In-process coordination endpoint.
//!
//! Routes client messages through a [`DocumentHub`] and parks the resulting
//! deliveries in per-connection inboxes. The owner drains an inbox and feeds
//! each message to its session, which keeps delivery out of the sending
//! session's call stack.

use crate::channel::{Result, Transport};
use crate::hub::{ConnectionId, DocumentHub, DocumentStore, MemoryStore};
use crate::protocol::{ClientMessage, ServerMessage};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use tracing::debug;

pub struct LocalHub<S: DocumentStore = MemoryStore> {
    hub: RefCell<DocumentHub<S>>,
    inboxes: RefCell<HashMap<ConnectionId, VecDeque<ServerMessage>>>,
    received: RefCell<Vec<(ConnectionId, ClientMessage)>>,
    next_conn: Cell<u64>,
}

impl<S: DocumentStore + 'static> LocalHub<S> {
    pub fn new(store: S) -> Rc<Self> {
        Rc::new(Self {
            hub: RefCell::new(DocumentHub::new(store)),
            inboxes: RefCell::new(HashMap::new()),
            received: RefCell::new(Vec::new()),
            next_conn: Cell::new(1),
        })
    }

    /// Open a connection.
    pub fn connect(self: &Rc<Self>) -> LocalTransport<S> {
        let conn = ConnectionId(self.next_conn.get());
        self.next_conn.set(conn.0 + 1);
        self.inboxes.borrow_mut().insert(conn, VecDeque::new());
        debug!("Local connection {} opened", conn);
        LocalTransport {
            hub: Rc::clone(self),
            conn,
        }
    }

    /// Take everything waiting for a connection, oldest first.
    pub fn drain(&self, conn: ConnectionId) -> Vec<ServerMessage> {
        self.inboxes
            .borrow_mut()
            .get_mut(&conn)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    /// How many `send-changes` a connection has sent.
    pub fn sent_changes_from(&self, conn: ConnectionId) -> usize {
        self.received
            .borrow()
            .iter()
            .filter(|(from, msg)| *from == conn && matches!(msg, ClientMessage::SendChanges { .. }))
            .count()
    }

    /// Inspect the hub.
    pub fn with_hub<R>(&self, f: impl FnOnce(&DocumentHub<S>) -> R) -> R {
        f(&self.hub.borrow())
    }

    fn route(&self, conn: ConnectionId, message: ClientMessage) {
        self.received.borrow_mut().push((conn, message.clone()));
        let deliveries = self.hub.borrow_mut().handle(conn, message);
        let mut inboxes = self.inboxes.borrow_mut();
        for (to, message) in deliveries {
            if let Some(inbox) = inboxes.get_mut(&to) {
                inbox.push_back(message);
            }
        }
    }

    fn disconnect(&self, conn: ConnectionId) {
        self.hub.borrow_mut().disconnect(conn);
        self.inboxes.borrow_mut().remove(&conn);
        debug!("Local connection {} closed", conn);
    }
}

/// One connection to a [`LocalHub`].
pub struct LocalTransport<S: DocumentStore + 'static = MemoryStore> {
    hub: Rc<LocalHub<S>>,
    conn: ConnectionId,
}

impl<S: DocumentStore + 'static> LocalTransport<S> {
    pub fn connection_id(&self) -> ConnectionId {
        self.conn
    }
}

impl<S: DocumentStore + 'static> Transport for LocalTransport<S> {
    fn send(&self, message: ClientMessage) -> Result<()> {
        self.hub.route(self.conn, message);
        Ok(())
    }

    fn close(&self) {
        self.hub.disconnect(self.conn);
    }
}
