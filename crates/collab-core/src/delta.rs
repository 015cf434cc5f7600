//! Delta: an ordered sequence of retain/insert/delete operations.
//!
//! The wire shape matches the rich-text editor's delta format:
//!
//! ```text
//! {"ops":[{"retain":2},{"insert":"!","attributes":{"bold":true}},{"delete":1}]}
//! ```
//!
//! A delta made only of inserts describes a whole document; any other delta
//! describes a change to apply to one. Applying is done by
//! [`crate::rich_text::RichText`]; this module only builds, measures and
//! validates. Lengths are counted in Unicode scalar values, and an embed
//! (e.g. an image) has length 1.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeltaError {
    #[error("Delta spans {required} characters but the document has {available}")]
    OutOfBounds { required: usize, available: usize },

    #[error("Delta lengths overflow")]
    Overflow,

    #[error("Expected a document delta (inserts only)")]
    NotADocument,

    #[error("Rich text rejected the delta: {0}")]
    Rejected(String),
}

pub type Result<T> = std::result::Result<T, DeltaError>;

/// Formatting attributes attached to an insert or retain.
///
/// A `null` value on a retain removes that format.
pub type Attributes = Map<String, Value>;

/// Content carried by an insert operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Insertable {
    /// Plain text run
    Text(String),
    /// Embedded object such as `{"image": "https://..."}`
    Embed(Map<String, Value>),
}

impl Insertable {
    fn len(&self) -> usize {
        match self {
            Insertable::Text(text) => text.chars().count(),
            Insertable::Embed(_) => 1,
        }
    }
}

/// A single delta operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Op {
    Insert {
        insert: Insertable,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    Retain {
        retain: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attributes: Option<Attributes>,
    },
    Delete {
        delete: usize,
    },
}

impl Op {
    /// Length of the operation in characters.
    pub fn len(&self) -> usize {
        match self {
            Op::Insert { insert, .. } => insert.len(),
            Op::Retain { retain, .. } => *retain,
            Op::Delete { delete } => *delete,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Op::Insert { attributes, .. } | Op::Retain { attributes, .. } => attributes.as_ref(),
            Op::Delete { .. } => None,
        }
    }
}

/// Drop empty attribute maps so `{}` and absent compare equal.
fn normalize(attributes: Option<Attributes>) -> Option<Attributes> {
    attributes.filter(|a| !a.is_empty())
}

/// An ordered sequence of operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub ops: Vec<Op>,
}

impl Delta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a delta from raw ops, canonicalizing them through [`Delta::push`].
    pub fn from_ops(ops: impl IntoIterator<Item = Op>) -> Self {
        let mut delta = Self::new();
        for op in ops {
            delta.push(op);
        }
        delta
    }

    pub fn insert(self, text: impl Into<String>) -> Self {
        self.insert_with(text, None)
    }

    pub fn insert_with(mut self, text: impl Into<String>, attributes: Option<Attributes>) -> Self {
        self.push(Op::Insert {
            insert: Insertable::Text(text.into()),
            attributes,
        });
        self
    }

    pub fn insert_embed(mut self, embed: Map<String, Value>, attributes: Option<Attributes>) -> Self {
        self.push(Op::Insert {
            insert: Insertable::Embed(embed),
            attributes,
        });
        self
    }

    pub fn retain(self, length: usize) -> Self {
        self.retain_with(length, None)
    }

    pub fn retain_with(mut self, length: usize, attributes: Option<Attributes>) -> Self {
        self.push(Op::Retain {
            retain: length,
            attributes,
        });
        self
    }

    pub fn delete(mut self, length: usize) -> Self {
        self.push(Op::Delete { delete: length });
        self
    }

    /// Append an op, merging it with the previous one where possible.
    ///
    /// Keeps the canonical form: no zero-length ops, adjacent ops with equal
    /// attributes merged, and an insert never directly after a delete.
    /// Merged lengths saturate; [`Delta::check_applicable`] rejects them.
    pub fn push(&mut self, op: Op) {
        if op.is_empty() {
            return;
        }
        let op = match op {
            Op::Insert { insert, attributes } => Op::Insert {
                insert,
                attributes: normalize(attributes),
            },
            Op::Retain { retain, attributes } => Op::Retain {
                retain,
                attributes: normalize(attributes),
            },
            other => other,
        };

        let mut index = self.ops.len();
        if let (Some(Op::Delete { delete: existing }), Op::Delete { delete }) =
            (self.ops.last_mut(), &op)
        {
            *existing = existing.saturating_add(*delete);
            return;
        }

        // Inserts go before a trailing delete; the result is the same document.
        if matches!(self.ops.last(), Some(Op::Delete { .. })) && matches!(op, Op::Insert { .. }) {
            index -= 1;
            if index == 0 {
                self.ops.insert(0, op);
                return;
            }
        }

        if index > 0 {
            let previous = &mut self.ops[index - 1];
            if previous.attributes() == op.attributes() {
                match (previous, &op) {
                    (
                        Op::Insert {
                            insert: Insertable::Text(existing),
                            ..
                        },
                        Op::Insert {
                            insert: Insertable::Text(text),
                            ..
                        },
                    ) => {
                        existing.push_str(text);
                        return;
                    }
                    (Op::Retain { retain: existing, .. }, Op::Retain { retain, .. }) => {
                        *existing = existing.saturating_add(*retain);
                        return;
                    }
                    _ => {}
                }
            }
        }

        self.ops.insert(index, op);
    }

    /// Remove a trailing plain retain, which carries no information.
    pub fn chop(mut self) -> Self {
        if let Some(Op::Retain {
            attributes: None, ..
        }) = self.ops.last()
        {
            self.ops.pop();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Total length of all operations, saturating at `usize::MAX`.
    pub fn length(&self) -> usize {
        self.ops
            .iter()
            .fold(0usize, |total, op| total.saturating_add(op.len()))
    }

    /// Net change in document length when this delta is applied, saturating
    /// at the bounds of `isize`.
    pub fn change_length(&self) -> isize {
        let signed = |len: usize| isize::try_from(len).unwrap_or(isize::MAX);
        self.ops.iter().fold(0isize, |total, op| match op {
            Op::Insert { .. } => total.saturating_add(signed(op.len())),
            Op::Delete { delete } => total.saturating_sub(signed(*delete)),
            Op::Retain { .. } => total,
        })
    }

    /// Number of characters of the base document this delta reads, or `None`
    /// if that count does not fit in a `usize`.
    pub fn base_length(&self) -> Option<usize> {
        self.ops.iter().try_fold(0usize, |total, op| match op {
            Op::Insert { .. } => Some(total),
            Op::Retain { retain, .. } => total.checked_add(*retain),
            Op::Delete { delete } => total.checked_add(*delete),
        })
    }

    /// True when the delta consists only of inserts.
    pub fn is_document(&self) -> bool {
        self.ops.iter().all(|op| matches!(op, Op::Insert { .. }))
    }

    /// Check that this delta can be applied to a document of `base_len` characters.
    pub fn check_applicable(&self, base_len: usize) -> Result<()> {
        let required = self.base_length().ok_or(DeltaError::Overflow)?;
        if required > base_len {
            return Err(DeltaError::OutOfBounds {
                required,
                available: base_len,
            });
        }
        Ok(())
    }

    /// Text of all string inserts, embeds skipped.
    pub fn to_plain_text(&self) -> String {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Insert {
                    insert: Insertable::Text(text),
                    ..
                } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Option<Attributes> {
        value.as_object().cloned()
    }

    #[test]
    fn test_wire_format_matches_editor_deltas() {
        let delta = Delta::new().retain(2).insert("!");
        let json = serde_json::to_value(&delta).unwrap();
        assert_eq!(json, json!({"ops": [{"retain": 2}, {"insert": "!"}]}));

        let parsed: Delta =
            serde_json::from_value(json!({"ops": [{"insert": "hi", "attributes": {"bold": true}}, {"delete": 3}]}))
                .unwrap();
        assert_eq!(
            parsed,
            Delta::new().insert_with("hi", attrs(json!({"bold": true}))).delete(3)
        );
    }

    #[test]
    fn test_embed_parses_and_has_length_one() {
        let parsed: Delta =
            serde_json::from_value(json!({"ops": [{"insert": {"image": "cat.png"}}, {"insert": "ab"}]}))
                .unwrap();
        assert_eq!(parsed.length(), 3);
        assert_eq!(parsed.to_plain_text(), "ab");
    }

    #[test]
    fn test_push_merges_adjacent_ops() {
        let delta = Delta::new()
            .insert("a")
            .insert("b")
            .retain(1)
            .retain(2)
            .delete(1)
            .delete(1);
        assert_eq!(
            delta.ops,
            vec![
                Op::Insert {
                    insert: Insertable::Text("ab".into()),
                    attributes: None
                },
                Op::Retain {
                    retain: 3,
                    attributes: None
                },
                Op::Delete { delete: 2 },
            ]
        );
    }

    #[test]
    fn test_push_keeps_different_attributes_apart() {
        let delta = Delta::new()
            .insert("a")
            .insert_with("b", attrs(json!({"bold": true})));
        assert_eq!(delta.ops.len(), 2);
    }

    #[test]
    fn test_push_treats_empty_attributes_as_none() {
        let delta = Delta::new().insert("a").insert_with("b", attrs(json!({})));
        assert_eq!(delta, Delta::new().insert("ab"));
    }

    #[test]
    fn test_push_places_insert_before_delete() {
        let delta = Delta::new().retain(1).delete(2).insert("x");
        assert_eq!(delta, Delta::new().retain(1).insert("x").delete(2));

        let leading = Delta::new().delete(1).insert("y");
        assert!(matches!(leading.ops[0], Op::Insert { .. }));
    }

    #[test]
    fn test_push_skips_empty_ops() {
        let delta = Delta::new().retain(0).insert("").delete(0);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_push_saturates_huge_merges() {
        let delta = Delta::new().retain(usize::MAX).retain(5).delete(usize::MAX).delete(1);
        assert_eq!(
            delta.ops,
            vec![
                Op::Retain {
                    retain: usize::MAX,
                    attributes: None
                },
                Op::Delete { delete: usize::MAX },
            ]
        );
    }

    #[test]
    fn test_chop_removes_trailing_plain_retain() {
        assert_eq!(Delta::new().insert("a").retain(4).chop(), Delta::new().insert("a"));
        let formatted = Delta::new().retain_with(4, attrs(json!({"bold": true})));
        assert_eq!(formatted.clone().chop(), formatted);
    }

    #[test]
    fn test_lengths() {
        let delta = Delta::new().retain(3).insert("héllo").delete(2);
        assert_eq!(delta.length(), 10);
        assert_eq!(delta.base_length(), Some(5));
        assert_eq!(delta.change_length(), 3);
    }

    #[test]
    fn test_lengths_of_hostile_delta_do_not_overflow() {
        let delta: Delta =
            serde_json::from_value(json!({"ops": [{"retain": usize::MAX}, {"delete": 1}]})).unwrap();

        assert_eq!(delta.base_length(), None);
        assert_eq!(delta.length(), usize::MAX);
        assert_eq!(delta.change_length(), -1);
        assert_eq!(delta.check_applicable(10), Err(DeltaError::Overflow));
    }

    #[test]
    fn test_change_length_saturates() {
        let delta = Delta::from_ops(vec![
            Op::Delete { delete: usize::MAX },
        ]);
        assert_eq!(delta.change_length(), -isize::MAX);
    }

    #[test]
    fn test_check_applicable() {
        let change = Delta::new().retain(2).delete(3);
        assert!(change.check_applicable(5).is_ok());
        assert_eq!(
            change.check_applicable(4),
            Err(DeltaError::OutOfBounds {
                required: 5,
                available: 4
            })
        );
    }

    #[test]
    fn test_is_document() {
        assert!(Delta::new().insert("a").is_document());
        assert!(Delta::new().is_document());
        assert!(!Delta::new().retain(1).insert("a").is_document());
    }
}
