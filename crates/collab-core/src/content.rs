//! DocumentContent: a full snapshot of a document's text and formatting.
//!
//! This is the wire and storage form. Live editing happens on
//! [`RichText`], which produces these snapshots.

use crate::delta::{Attributes, Delta, DeltaError, Op, Result};
use crate::rich_text::RichText;
use serde::{Deserialize, Serialize};

/// Text shown in the editing surface until the real document arrives.
pub const PLACEHOLDER_TEXT: &str = "Loading...";

/// A document-shaped delta: a sequence of inserts with their attributes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Delta", into = "Delta")]
pub struct DocumentContent(Delta);

impl DocumentContent {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self(Delta::new().insert(text))
    }

    pub fn from_text_with(text: impl Into<String>, attributes: Option<Attributes>) -> Self {
        Self(Delta::new().insert_with(text, attributes))
    }

    /// Content shown while a session waits for the load notification.
    pub fn placeholder() -> Self {
        Self::from_text(PLACEHOLDER_TEXT)
    }

    /// Wrap a delta, rejecting anything other than inserts.
    pub fn try_from_delta(delta: Delta) -> Result<Self> {
        if !delta.is_document() {
            return Err(DeltaError::NotADocument);
        }
        // Re-push to merge runs the sender may have left split.
        Ok(Self(Delta::from_ops(delta.ops)))
    }

    /// Wrap a delta already known to be insert-only and canonical.
    pub(crate) fn from_document_delta(delta: Delta) -> Self {
        debug_assert!(delta.is_document());
        Self(delta)
    }

    pub fn as_delta(&self) -> &Delta {
        &self.0
    }

    pub fn into_delta(self) -> Delta {
        self.0
    }

    /// Length in characters (embeds count as one).
    pub fn len(&self) -> usize {
        self.0.length()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_plain_text(&self) -> String {
        self.0.to_plain_text()
    }

    /// Apply a change, returning the resulting content.
    ///
    /// Fails without producing anything if the change reaches past the end of
    /// the document.
    pub fn apply(&self, change: &Delta) -> Result<DocumentContent> {
        let mut rich = RichText::from_content(self)?;
        rich.apply(change)?;
        Ok(rich.to_content())
    }

    /// The runs overlapping `length` characters from `index`, or `None` if
    /// the range reaches past the end.
    pub fn runs_in(&self, index: usize, length: usize) -> Option<Vec<&Op>> {
        let end = index.checked_add(length)?;
        if end > self.len() {
            return None;
        }
        let mut position = 0usize;
        let mut runs = Vec::new();
        for op in &self.0.ops {
            let next = position.saturating_add(op.len());
            if position < end && next > index {
                runs.push(op);
            }
            position = next;
        }
        Some(runs)
    }
}

impl TryFrom<Delta> for DocumentContent {
    type Error = DeltaError;

    fn try_from(delta: Delta) -> Result<Self> {
        Self::try_from_delta(delta)
    }
}

impl From<DocumentContent> for Delta {
    fn from(content: DocumentContent) -> Self {
        content.0
    }
}
