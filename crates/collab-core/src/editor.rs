//! Editor adapter: the capability surface a session needs from a
//! text-rendering surface.
//!
//! Every change notification carries a [`ChangeOrigin`] so the session can
//! tell user input apart from its own programmatic mutations. Only
//! `UserOriginated` changes are ever transmitted.

use crate::content::DocumentContent;
use crate::delta::{Attributes, Delta, DeltaError};
use crate::events::{EventBus, Subscription};
use crate::rich_text::RichText;
use serde_json::{Map, Value};
use std::rc::Rc;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditorError {
    #[error("Editing is disabled")]
    ReadOnly,

    #[error(transparent)]
    Delta(#[from] DeltaError),
}

pub type Result<T> = std::result::Result<T, EditorError>;

/// Who caused a change to the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Typing, formatting or any other direct user action
    UserOriginated,
    /// Content set or applied programmatically by the session
    ReplicaApplied,
}

/// A change notification from the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorChange {
    pub delta: Delta,
    pub origin: ChangeOrigin,
}

/// What a session requires of an editing surface.
pub trait EditorAdapter {
    /// Full current content.
    fn contents(&self) -> DocumentContent;

    /// Replace everything. Notifies with `ReplicaApplied`.
    fn set_contents(&mut self, content: DocumentContent);

    /// Apply an incremental change. Notifies with `ReplicaApplied`.
    ///
    /// A delta that does not fit the current content is rejected and the
    /// content is left untouched.
    fn apply_delta(&mut self, delta: &Delta) -> Result<()>;

    /// Register for change notifications.
    ///
    /// Handlers run while the surface is mutably borrowed and must not call
    /// back into it.
    fn on_change(&self, handler: impl Fn(&EditorChange) + 'static) -> Subscription;

    /// Gate user edits.
    fn set_editable(&mut self, editable: bool);

    fn is_editable(&self) -> bool;
}

/// In-memory editing surface.
///
/// Used headless by the terminal client and by tests. User operations build a
/// delta, apply it to the [`RichText`], and notify with `UserOriginated`.
pub struct TextSurface {
    text: RichText,
    editable: bool,
    changes: Rc<EventBus<EditorChange>>,
}

impl Default for TextSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl TextSurface {
    /// An empty, editable surface.
    pub fn new() -> Self {
        Self::with_content(DocumentContent::new())
    }

    pub fn with_content(content: DocumentContent) -> Self {
        let mut surface = Self {
            text: RichText::new(),
            editable: true,
            changes: Rc::new(EventBus::new()),
        };
        surface.set_contents(content);
        surface
    }

    /// Length in characters.
    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn insert_text(
        &mut self,
        index: usize,
        text: &str,
        attributes: Option<Attributes>,
    ) -> Result<()> {
        self.user_edit(Delta::new().retain(index).insert_with(text, attributes))
    }

    /// Insert at the end of the document.
    pub fn append_text(&mut self, text: &str) -> Result<()> {
        self.insert_text(self.len(), text, None)
    }

    pub fn insert_embed(
        &mut self,
        index: usize,
        embed: Map<String, Value>,
        attributes: Option<Attributes>,
    ) -> Result<()> {
        self.user_edit(Delta::new().retain(index).insert_embed(embed, attributes))
    }

    pub fn delete_text(&mut self, index: usize, length: usize) -> Result<()> {
        self.user_edit(Delta::new().retain(index).delete(length))
    }

    /// Apply formatting to a range. A `null` attribute value removes that format.
    pub fn format_text(&mut self, index: usize, length: usize, attributes: Attributes) -> Result<()> {
        self.user_edit(
            Delta::new()
                .retain(index)
                .retain_with(length, Some(attributes)),
        )
    }

    fn user_edit(&mut self, delta: Delta) -> Result<()> {
        if !self.editable {
            return Err(EditorError::ReadOnly);
        }
        self.commit(delta, ChangeOrigin::UserOriginated)
    }

    fn commit(&mut self, delta: Delta, origin: ChangeOrigin) -> Result<()> {
        self.text.apply(&delta)?;
        let delta = delta.chop();
        if delta.is_empty() {
            return Ok(());
        }
        self.changes.emit(&EditorChange { delta, origin });
        Ok(())
    }
}

impl EditorAdapter for TextSurface {
    fn contents(&self) -> DocumentContent {
        self.text.to_content()
    }

    fn set_contents(&mut self, content: DocumentContent) {
        let text = match RichText::from_content(&content) {
            Ok(text) => text,
            Err(e) => {
                warn!("Keeping current content, replacement rejected: {}", e);
                return;
            }
        };
        let delta = content.into_delta().delete(self.len());
        self.text = text;
        if !delta.is_empty() {
            self.changes.emit(&EditorChange {
                delta,
                origin: ChangeOrigin::ReplicaApplied,
            });
        }
    }

    fn apply_delta(&mut self, delta: &Delta) -> Result<()> {
        self.commit(delta.clone(), ChangeOrigin::ReplicaApplied)
    }

    fn on_change(&self, handler: impl Fn(&EditorChange) + 'static) -> Subscription {
        self.changes.subscribe(handler)
    }

    fn set_editable(&mut self, editable: bool) {
        self.editable = editable;
    }

    fn is_editable(&self) -> bool {
        self.editable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn recorded(surface: &TextSurface) -> (Rc<RefCell<Vec<EditorChange>>>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let log_clone = Rc::clone(&log);
        let sub = surface.on_change(move |change| log_clone.borrow_mut().push(change.clone()));
        (log, sub)
    }

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_user_insert_notifies_user_originated() {
        let mut surface = TextSurface::with_content(DocumentContent::from_text("hi"));
        let (log, _sub) = recorded(&surface);

        surface.insert_text(2, "!", None).unwrap();

        assert_eq!(surface.contents().to_plain_text(), "hi!");
        assert_eq!(
            *log.borrow(),
            vec![EditorChange {
                delta: Delta::new().retain(2).insert("!"),
                origin: ChangeOrigin::UserOriginated,
            }]
        );
    }

    #[test]
    fn test_read_only_rejects_user_edits() {
        let mut surface = TextSurface::new();
        surface.set_editable(false);
        let (log, _sub) = recorded(&surface);

        assert_eq!(surface.append_text("x"), Err(EditorError::ReadOnly));
        assert!(surface.is_empty());
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_programmatic_changes_allowed_while_read_only() {
        let mut surface = TextSurface::new();
        surface.set_editable(false);
        let (log, _sub) = recorded(&surface);

        surface.set_contents(DocumentContent::from_text("ab"));
        surface.apply_delta(&Delta::new().retain(1).delete(1)).unwrap();

        assert_eq!(surface.contents().to_plain_text(), "a");
        let log = log.borrow();
        assert_eq!(log.len(), 2);
        assert!(log.iter().all(|c| c.origin == ChangeOrigin::ReplicaApplied));
    }

    #[test]
    fn test_set_contents_replaces_everything() {
        let mut surface = TextSurface::with_content(DocumentContent::placeholder());
        let (log, _sub) = recorded(&surface);

        surface.set_contents(DocumentContent::from_text("hi"));

        assert_eq!(surface.contents(), DocumentContent::from_text("hi"));
        assert_eq!(
            log.borrow()[0].delta,
            Delta::new().insert("hi").delete(10)
        );
    }

    #[test]
    fn test_apply_out_of_bounds_leaves_content() {
        let mut surface = TextSurface::with_content(DocumentContent::from_text("hi"));
        let (log, _sub) = recorded(&surface);

        let err = surface
            .apply_delta(&Delta::new().retain(5).insert("x"))
            .unwrap_err();

        assert!(matches!(err, EditorError::Delta(DeltaError::OutOfBounds { .. })));
        assert_eq!(surface.contents().to_plain_text(), "hi");
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_delete_and_format() {
        let mut surface = TextSurface::with_content(DocumentContent::from_text("hello world"));

        surface.delete_text(5, 6).unwrap();
        surface.format_text(0, 5, attrs(json!({"bold": true}))).unwrap();

        let expected = Delta::new().insert_with("hello", Some(attrs(json!({"bold": true}))));
        assert_eq!(surface.contents().as_delta(), &expected);

        surface.format_text(0, 5, attrs(json!({"bold": null}))).unwrap();
        assert_eq!(surface.contents(), DocumentContent::from_text("hello"));
    }

    #[test]
    fn test_insert_embed_counts_as_one() {
        let mut surface = TextSurface::with_content(DocumentContent::from_text("ab"));
        surface
            .insert_embed(1, attrs(json!({"image": "cat.png"})), None)
            .unwrap();

        assert_eq!(surface.len(), 3);
        assert_eq!(surface.contents().to_plain_text(), "ab");
    }

    #[test]
    fn test_insert_past_end_fails() {
        let mut surface = TextSurface::new();
        assert!(matches!(
            surface.insert_text(1, "x", None),
            Err(EditorError::Delta(_))
        ));
    }

    #[test]
    fn test_huge_positions_fail_without_panicking() {
        let mut surface = TextSurface::with_content(DocumentContent::from_text("hello"));
        let (log, _sub) = recorded(&surface);

        assert_eq!(
            surface.delete_text(usize::MAX, 1),
            Err(EditorError::Delta(DeltaError::Overflow))
        );
        assert_eq!(
            surface.format_text(usize::MAX, 2, attrs(json!({"bold": true}))),
            Err(EditorError::Delta(DeltaError::Overflow))
        );
        let hostile: Delta =
            serde_json::from_value(json!({"ops": [{"retain": usize::MAX}, {"delete": 1}]})).unwrap();
        assert!(surface.apply_delta(&hostile).is_err());

        assert_eq!(surface.contents(), DocumentContent::from_text("hello"));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_no_op_edit_is_silent() {
        let mut surface = TextSurface::with_content(DocumentContent::from_text("ab"));
        let (log, _sub) = recorded(&surface);

        surface.delete_text(1, 0).unwrap();

        assert!(log.borrow().is_empty());
    }
}
