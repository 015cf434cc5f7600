//! DocumentId: the opaque identifier a session joins a document by.
//!
//! New documents get a random UUID; existing ones are reopened by whatever id
//! the route carried. The core never interprets the id beyond validating it.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// Longest accepted id, in bytes.
pub const MAX_DOCUMENT_ID_LEN: usize = 256;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentIdError {
    #[error("Document ID cannot be empty")]
    Empty,
    #[error("Document ID exceeds 256 bytes")]
    TooLong,
    #[error("Document ID cannot contain whitespace or control characters")]
    InvalidCharacter,
}

/// Identifier of a collaboratively edited document.
///
/// # Examples
/// ```
/// use collab_core::DocumentId;
///
/// let id: DocumentId = "doc-42".parse().unwrap();
/// assert_eq!(id.as_str(), "doc-42");
/// assert!("".parse::<DocumentId>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(String);

impl DocumentId {
    /// Generate an id for a brand new document.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DocumentId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DocumentId {
    type Err = DocumentIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(DocumentIdError::Empty);
        }
        if s.len() > MAX_DOCUMENT_ID_LEN {
            return Err(DocumentIdError::TooLong);
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(DocumentIdError::InvalidCharacter);
        }
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for DocumentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for DocumentId {
    fn serialize<S: serde::Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for DocumentId {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
