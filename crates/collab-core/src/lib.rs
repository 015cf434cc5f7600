//! collab-core: Sync core for real-time collaborative rich-text editing.
//!
//! This crate provides:
//! - The Quill-compatible delta model and document snapshots, backed by Loro
//!   rich text
//! - The document channel and its wire protocol
//! - The per-document session state machine and editor adapter seam
//! - An in-process coordination hub for tests and demos

pub mod channel;
pub mod content;
pub mod delta;
pub mod document_id;
pub mod editor;
pub mod events;
pub mod hub;
pub mod local;
pub mod protocol;
pub mod rich_text;
pub mod session;
pub mod summary;

pub use channel::{Channel, ChannelError, ChannelStatus, RecordingTransport, Transport};
pub use content::DocumentContent;
pub use delta::{Attributes, Delta, DeltaError, Insertable, Op};
pub use document_id::{DocumentId, DocumentIdError};
pub use editor::{ChangeOrigin, EditorAdapter, EditorChange, EditorError, TextSurface};
pub use events::{EventBus, SessionEvent, Subscription};
pub use hub::{ConnectionId, DocumentHub, DocumentStore, MemoryStore, StoreError};
pub use local::{LocalHub, LocalTransport};
pub use protocol::{ClientMessage, ProtocolError, ServerMessage};
pub use rich_text::RichText;
pub use session::{Session, SessionError, SessionState};
pub use summary::{Summarizer, SummaryError, SummaryPane};
