//! Document channel: one session's link to the coordination endpoint.
//!
//! The channel owns a [`Transport`] (the network seam) and exposes the
//! document-level contract on top of it:
//!
//! - outbound: `request_document` (once), `emit_change`, `emit_save`
//! - inbound: `on_load` (one-shot) and `on_remote_change` (repeating)
//! - lifecycle: `mark_lost` (connection dropped, channel goes inert) and
//!   `close` (idempotent)
//!
//! Inbound traffic is pushed in by whoever drives the connection through
//! [`Channel::deliver`]. Nothing is buffered or reordered.

use crate::content::DocumentContent;
use crate::delta::Delta;
use crate::document_id::DocumentId;
use crate::events::{EventBus, Subscription};
use crate::protocol::{ClientMessage, ServerMessage};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Channel is closed")]
    Closed,

    #[error("Channel unavailable: {0}")]
    Unavailable(String),

    #[error("Document already requested on this channel")]
    AlreadyRequested,
}

pub type Result<T> = std::result::Result<T, ChannelError>;

/// Outbound half of a connection to the coordination endpoint.
///
/// Implementations queue the message and return immediately; delivery is
/// fire-and-forget.
pub trait Transport {
    /// Queue a message for sending.
    fn send(&self, message: ClientMessage) -> Result<()>;

    /// Release the connection. Called at most once per channel.
    fn close(&self);
}

impl<T: Transport + ?Sized> Transport for Rc<T> {
    fn send(&self, message: ClientMessage) -> Result<()> {
        (**self).send(message)
    }

    fn close(&self) {
        (**self).close()
    }
}

/// Lifecycle of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    /// Connected; traffic flows both ways
    Open,
    /// Connection dropped; inert until closed
    Lost,
    /// Closed by the owner
    Closed,
}

type LoadHandler = Box<dyn FnOnce(DocumentContent)>;

#[derive(Default)]
struct LoadSlot {
    handler: RefCell<Option<LoadHandler>>,
    delivered: Cell<bool>,
}

/// Registration for the one-shot load notification.
///
/// Dropping it before the load arrives unregisters the handler.
#[must_use = "dropping a LoadSubscription unregisters the load handler"]
pub struct LoadSubscription {
    slot: Weak<LoadSlot>,
}

impl Drop for LoadSubscription {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.upgrade() {
            slot.handler.borrow_mut().take();
        }
    }
}

/// Registration for the repeating remote-change notification.
#[must_use = "dropping a ChangeSubscription unregisters the change handler"]
pub struct ChangeSubscription {
    _inner: Subscription,
}

/// A document channel over a transport.
pub struct Channel<T: Transport> {
    transport: T,
    status: Cell<ChannelStatus>,
    requested: Cell<bool>,
    load: Rc<LoadSlot>,
    remote_changes: Rc<EventBus<Delta>>,
}

impl<T: Transport> Channel<T> {
    /// Wrap an established transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            status: Cell::new(ChannelStatus::Open),
            requested: Cell::new(false),
            load: Rc::new(LoadSlot::default()),
            remote_changes: Rc::new(EventBus::new()),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.status.get()
    }

    pub fn is_open(&self) -> bool {
        self.status.get() == ChannelStatus::Open
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn ensure_open(&self) -> Result<()> {
        match self.status.get() {
            ChannelStatus::Open => Ok(()),
            ChannelStatus::Lost => Err(ChannelError::Unavailable("connection lost".into())),
            ChannelStatus::Closed => Err(ChannelError::Closed),
        }
    }

    /// Ask for the document. Allowed once per channel.
    pub fn request_document(&self, document_id: &DocumentId) -> Result<()> {
        self.ensure_open()?;
        if self.requested.replace(true) {
            return Err(ChannelError::AlreadyRequested);
        }
        self.transport.send(ClientMessage::GetDocument {
            document_id: document_id.clone(),
        })
    }

    /// Transmit a locally produced change.
    pub fn emit_change(&self, document_id: &DocumentId, changes: &Delta) -> Result<()> {
        self.ensure_open()?;
        self.transport.send(ClientMessage::SendChanges {
            document_id: document_id.clone(),
            changes: changes.clone(),
        })
    }

    /// Transmit the full content for persistence.
    pub fn emit_save(&self, document_id: &DocumentId, content: &DocumentContent) -> Result<()> {
        self.ensure_open()?;
        self.transport.send(ClientMessage::SaveDocument {
            document_id: document_id.clone(),
            content: content.clone(),
        })
    }

    /// Register the handler for the initial document content.
    ///
    /// Fires at most once over the channel's lifetime. Registering again
    /// replaces a handler that has not fired yet.
    pub fn on_load(&self, handler: impl FnOnce(DocumentContent) + 'static) -> LoadSubscription {
        if self.load.delivered.get() {
            debug!("Load already delivered, handler will never fire");
        }
        *self.load.handler.borrow_mut() = Some(Box::new(handler));
        LoadSubscription {
            slot: Rc::downgrade(&self.load),
        }
    }

    /// Register a handler for changes made by other sessions.
    pub fn on_remote_change(&self, handler: impl Fn(&Delta) + 'static) -> ChangeSubscription {
        ChangeSubscription {
            _inner: self.remote_changes.subscribe(handler),
        }
    }

    /// Dispatch an inbound message to the registered handlers.
    ///
    /// Dropped silently once the channel is lost or closed.
    pub fn deliver(&self, message: ServerMessage) {
        if !self.is_open() {
            debug!("Dropping {} on inert channel", message.name());
            return;
        }

        match message {
            ServerMessage::LoadDocument { document } => {
                if self.load.delivered.replace(true) {
                    warn!("Ignoring repeated load-document");
                    return;
                }
                let handler = self.load.handler.borrow_mut().take();
                match handler {
                    Some(handler) => handler(document),
                    None => warn!("load-document arrived with no load handler registered"),
                }
            }
            ServerMessage::ReceiveChanges { changes } => {
                self.remote_changes.emit(&changes);
            }
        }
    }

    /// Record that the connection dropped. No further notifications fire.
    pub fn mark_lost(&self) {
        if self.status.get() == ChannelStatus::Open {
            self.status.set(ChannelStatus::Lost);
            self.clear_handlers();
        }
    }

    /// Close the channel. Safe to call repeatedly; only the first call has
    /// any effect.
    pub fn close(&self) {
        if self.status.replace(ChannelStatus::Closed) == ChannelStatus::Closed {
            return;
        }
        self.clear_handlers();
        self.transport.close();
    }

    fn clear_handlers(&self) {
        self.load.handler.borrow_mut().take();
        self.remote_changes.clear();
    }
}

/// Transport that records what was sent instead of sending it.
///
/// Clones share the same log, so a test can keep one handle while the
/// channel owns another.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    sent: Rc<RefCell<Vec<ClientMessage>>>,
    close_calls: Rc<Cell<usize>>,
    fail_sends: Rc<Cell<bool>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages sent so far, oldest first.
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.borrow().clone()
    }

    /// Only the `send-changes` payloads, oldest first.
    pub fn sent_changes(&self) -> Vec<Delta> {
        self.sent
            .borrow()
            .iter()
            .filter_map(|msg| match msg {
                ClientMessage::SendChanges { changes, .. } => Some(changes.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.get()
    }

    /// Make subsequent sends fail, as if the writer had gone away.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.set(fail);
    }
}

impl Transport for RecordingTransport {
    fn send(&self, message: ClientMessage) -> Result<()> {
        if self.fail_sends.get() {
            return Err(ChannelError::Unavailable("writer gone".into()));
        }
        self.sent.borrow_mut().push(message);
        Ok(())
    }

    fn close(&self) {
        self.close_calls.set(self.close_calls.get() + 1);
    }
}
