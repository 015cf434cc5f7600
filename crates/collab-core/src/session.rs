//! Synchronization state machine for one client on one document.
//!
//! ```text
//! Connecting ──attach──▶ AwaitingLoad ──load-document──▶ Live ──close──▶ Closed
//!                                                        │  ▲
//!                                                        └──┘ user edit / remote change
//! ```
//!
//! The session owns every handler it registers. Handlers hold a weak
//! reference back to the session, so dropping the session tears everything
//! down. All work happens on one logical thread; no locking.

use crate::channel::{ChangeSubscription, Channel, ChannelError, LoadSubscription, Transport};
use crate::content::DocumentContent;
use crate::delta::Delta;
use crate::document_id::DocumentId;
use crate::editor::{ChangeOrigin, EditorAdapter, EditorChange};
use crate::events::{now_ms, EventBus, SessionEvent, Subscription};
use crate::protocol::ServerMessage;
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session is already attached to a channel")]
    AlreadyAttached,

    #[error("Session is closed")]
    Closed,

    #[error("Operation requires a live session (currently {0})")]
    NotLive(SessionState),

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Where a session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    /// No channel yet
    Connecting,
    /// Document requested, editing disabled
    AwaitingLoad,
    /// Replica seeded, edits flow both ways
    Live,
    /// Torn down; terminal
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::AwaitingLoad => "awaiting-load",
            SessionState::Live => "live",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Handlers {
    _load: LoadSubscription,
    _remote: ChangeSubscription,
    _editor: Subscription,
}

struct Inner<E: EditorAdapter + 'static, T: Transport + 'static> {
    document_id: DocumentId,
    state: Cell<SessionState>,
    editor: RefCell<E>,
    channel: RefCell<Option<Rc<Channel<T>>>>,
    handlers: RefCell<Option<Handlers>>,
    events: Rc<EventBus<SessionEvent>>,
}

impl<E: EditorAdapter + 'static, T: Transport + 'static> Inner<E, T> {
    fn transition(&self, to: SessionState) {
        let from = self.state.replace(to);
        if from == to {
            return;
        }
        info!(document_id = %self.document_id, %from, %to, "Session state changed");
        self.events.emit(&SessionEvent::StateChanged {
            document_id: self.document_id.to_string(),
            from,
            to,
            timestamp: now_ms(),
        });
    }

    fn channel(&self) -> Option<Rc<Channel<T>>> {
        self.channel.borrow().clone()
    }

    fn on_load(&self, content: DocumentContent) {
        if self.state.get() != SessionState::AwaitingLoad {
            warn!(document_id = %self.document_id, state = %self.state.get(), "Ignoring load outside AwaitingLoad");
            return;
        }
        debug!(document_id = %self.document_id, len = content.len(), "Document loaded");
        {
            let mut editor = self.editor.borrow_mut();
            editor.set_contents(content);
            editor.set_editable(true);
        }
        self.transition(SessionState::Live);
    }

    fn on_remote_change(&self, delta: &Delta) {
        if self.state.get() != SessionState::Live {
            warn!(
                document_id = %self.document_id,
                state = %self.state.get(),
                "Dropping remote change received before load"
            );
            return;
        }

        let result = self.editor.borrow_mut().apply_delta(delta);
        match result {
            Ok(()) => {
                debug!(document_id = %self.document_id, ops = delta.ops.len(), "Applied remote change");
                self.events.emit(&SessionEvent::ChangeApplied {
                    document_id: self.document_id.to_string(),
                    ops: delta.ops.len(),
                    timestamp: now_ms(),
                });
            }
            Err(e) => {
                warn!(document_id = %self.document_id, "Failed to apply remote change: {}", e);
                self.events.emit(&SessionEvent::ChangeRejected {
                    document_id: self.document_id.to_string(),
                    reason: e.to_string(),
                    timestamp: now_ms(),
                });
            }
        }
    }

    fn on_editor_change(&self, change: &EditorChange) {
        if change.origin != ChangeOrigin::UserOriginated {
            return;
        }
        if self.state.get() != SessionState::Live {
            debug!(document_id = %self.document_id, "Not transmitting edit outside Live");
            return;
        }
        let Some(channel) = self.channel() else {
            return;
        };

        match channel.emit_change(&self.document_id, &change.delta) {
            Ok(()) => {
                self.events.emit(&SessionEvent::ChangeSent {
                    document_id: self.document_id.to_string(),
                    ops: change.delta.ops.len(),
                    timestamp: now_ms(),
                });
            }
            Err(e) => {
                warn!(document_id = %self.document_id, "Failed to transmit change: {}", e);
            }
        }
    }
}

/// One client's connection and replica state for one document.
pub struct Session<E: EditorAdapter + 'static, T: Transport + 'static> {
    inner: Rc<Inner<E, T>>,
}

impl<E: EditorAdapter + 'static, T: Transport + 'static> Session<E, T> {
    /// Create a session in `Connecting`.
    ///
    /// The editor is given placeholder content and made read-only until the
    /// document loads.
    pub fn new(document_id: DocumentId, mut editor: E) -> Self {
        editor.set_contents(DocumentContent::placeholder());
        editor.set_editable(false);

        Self {
            inner: Rc::new(Inner {
                document_id,
                state: Cell::new(SessionState::Connecting),
                editor: RefCell::new(editor),
                channel: RefCell::new(None),
                handlers: RefCell::new(None),
                events: Rc::new(EventBus::new()),
            }),
        }
    }

    pub fn document_id(&self) -> &DocumentId {
        &self.inner.document_id
    }

    pub fn state(&self) -> SessionState {
        self.inner.state.get()
    }

    /// Monitoring events.
    ///
    /// Subscribers run synchronously inside session handlers and must not
    /// call back into the session.
    pub fn events(&self) -> &Rc<EventBus<SessionEvent>> {
        &self.inner.events
    }

    /// Bind the session to an established connection and request the
    /// document. Moves to `AwaitingLoad`.
    pub fn attach(&self, transport: T) -> Result<()> {
        match self.state() {
            SessionState::Connecting => {}
            SessionState::Closed => return Err(SessionError::Closed),
            _ => return Err(SessionError::AlreadyAttached),
        }

        let channel = Rc::new(Channel::new(transport));

        let weak = Rc::downgrade(&self.inner);
        let load = channel.on_load(move |content| {
            if let Some(inner) = weak.upgrade() {
                inner.on_load(content);
            }
        });

        let weak = Rc::downgrade(&self.inner);
        let remote = channel.on_remote_change(move |delta| {
            if let Some(inner) = weak.upgrade() {
                inner.on_remote_change(delta);
            }
        });

        let weak: Weak<Inner<E, T>> = Rc::downgrade(&self.inner);
        let editor = self.inner.editor.borrow().on_change(move |change| {
            if let Some(inner) = weak.upgrade() {
                inner.on_editor_change(change);
            }
        });

        *self.inner.handlers.borrow_mut() = Some(Handlers {
            _load: load,
            _remote: remote,
            _editor: editor,
        });
        *self.inner.channel.borrow_mut() = Some(Rc::clone(&channel));
        self.inner.transition(SessionState::AwaitingLoad);

        if let Err(e) = channel.request_document(&self.inner.document_id) {
            warn!(document_id = %self.inner.document_id, "Failed to request document: {}", e);
            self.connection_lost();
            return Err(e.into());
        }
        Ok(())
    }

    /// Feed an inbound message from the driver.
    pub fn handle_message(&self, message: ServerMessage) {
        match self.inner.channel() {
            Some(channel) => channel.deliver(message),
            None => debug!(
                document_id = %self.inner.document_id,
                "Dropping {} with no channel attached",
                message.name()
            ),
        }
    }

    /// The connection dropped. The session stays in its current state but
    /// goes inert: no further notifications, no transmissions, editing
    /// disabled.
    pub fn connection_lost(&self) {
        if self.state() == SessionState::Closed {
            return;
        }
        let Some(channel) = self.inner.channel() else {
            return;
        };
        if !channel.is_open() {
            return;
        }

        warn!(document_id = %self.inner.document_id, state = %self.state(), "Connection lost");
        channel.mark_lost();
        self.inner.handlers.borrow_mut().take();
        self.inner.editor.borrow_mut().set_editable(false);
        self.inner.events.emit(&SessionEvent::ChannelLost {
            document_id: self.inner.document_id.to_string(),
            timestamp: now_ms(),
        });
    }

    /// Run user input against the editing surface.
    ///
    /// Edits made here notify as user-originated and are transmitted while
    /// the session is live.
    pub fn edit<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.inner.editor.borrow_mut())
    }

    /// Send the full replica for persistence. Only valid while live; does
    /// not change state.
    pub fn save(&self) -> Result<()> {
        let state = self.state();
        if state != SessionState::Live {
            return Err(SessionError::NotLive(state));
        }
        let Some(channel) = self.inner.channel() else {
            return Err(SessionError::NotLive(state));
        };

        let content = self.inner.editor.borrow().contents();
        channel.emit_save(&self.inner.document_id, &content)?;
        info!(document_id = %self.inner.document_id, len = content.len(), "Save requested");
        self.inner.events.emit(&SessionEvent::SaveRequested {
            document_id: self.inner.document_id.to_string(),
            length: content.len(),
            timestamp: now_ms(),
        });
        Ok(())
    }

    /// Current replica content.
    pub fn contents(&self) -> DocumentContent {
        self.inner.editor.borrow().contents()
    }

    /// Replica as plain text, for the summary pane.
    pub fn plain_text(&self) -> String {
        self.contents().to_plain_text()
    }

    /// Tear down. Handlers are unregistered before the channel closes.
    /// Repeated calls do nothing.
    pub fn close(&self) {
        if self.state() == SessionState::Closed {
            return;
        }

        self.inner.handlers.borrow_mut().take();
        let channel = self.inner.channel.borrow_mut().take();
        if let Some(channel) = channel {
            channel.close();
        }
        {
            let mut editor = self.inner.editor.borrow_mut();
            editor.set_editable(false);
            editor.set_contents(DocumentContent::new());
        }
        self.inner.transition(SessionState::Closed);
    }
}

impl<E: EditorAdapter + 'static, T: Transport + 'static> Drop for Session<E, T> {
    fn drop(&mut self) {
        self.close();
    }
}
