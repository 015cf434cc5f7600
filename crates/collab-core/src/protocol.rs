//! Wire protocol between a session and the coordination endpoint.
//!
//! Every frame is a JSON object tagged by its `event` name, with camelCase
//! payload fields:
//!
//! | Direction | Event | Payload |
//! |---|---|---|
//! | client → server | `get-document` | `documentId` |
//! | client → server | `send-changes` | `documentId`, `changes` |
//! | client → server | `save-document` | `documentId`, `content` |
//! | server → client | `load-document` | `document` |
//! | server → client | `receive-changes` | `changes` |

use crate::content::DocumentContent;
use crate::delta::Delta;
use crate::document_id::DocumentId;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum message size (50MB) to prevent memory exhaustion from a misbehaving peer.
pub const MAX_MESSAGE_SIZE: usize = 50 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Message too large: {size} bytes (max 50MB)")]
    TooLarge { size: usize },

    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Messages a session sends to the coordination endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ClientMessage {
    /// Join a document; answered by exactly one `load-document`.
    #[serde(rename_all = "camelCase")]
    GetDocument { document_id: DocumentId },

    /// A locally produced change, fanned out to the other sessions.
    #[serde(rename_all = "camelCase")]
    SendChanges {
        document_id: DocumentId,
        changes: Delta,
    },

    /// Full content to persist.
    #[serde(rename_all = "camelCase")]
    SaveDocument {
        document_id: DocumentId,
        content: DocumentContent,
    },
}

impl ClientMessage {
    pub fn document_id(&self) -> &DocumentId {
        match self {
            ClientMessage::GetDocument { document_id }
            | ClientMessage::SendChanges { document_id, .. }
            | ClientMessage::SaveDocument { document_id, .. } => document_id,
        }
    }

    /// Event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ClientMessage::GetDocument { .. } => "get-document",
            ClientMessage::SendChanges { .. } => "send-changes",
            ClientMessage::SaveDocument { .. } => "save-document",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        decode(data)
    }
}

/// Messages the coordination endpoint sends to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum ServerMessage {
    /// The authoritative content, in response to `get-document`.
    LoadDocument { document: DocumentContent },

    /// A change made by another session on the same document.
    ReceiveChanges { changes: Delta },
}

impl ServerMessage {
    /// Event name, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            ServerMessage::LoadDocument { .. } => "load-document",
            ServerMessage::ReceiveChanges { .. } => "receive-changes",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        decode(data)
    }
}

fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    if data.len() > MAX_MESSAGE_SIZE {
        return Err(ProtocolError::TooLarge { size: data.len() });
    }
    Ok(serde_json::from_slice(data)?)
}
