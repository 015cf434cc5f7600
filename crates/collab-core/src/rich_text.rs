//! RichText: a Loro text container holding one document's text and marks.
//!
//! Deltas travel as the editor's wire shape ([`Delta`]) and are converted to
//! Loro's `TextDelta` at this boundary. Loro does the applying and the
//! merging of runs; bounds are checked here first so Loro only ever sees a
//! delta that fits.
//!
//! Loro text has no embeds. An embed is stored as a single U+FFFC character
//! carrying the embed object in a non-expanding `embed` mark, and turned
//! back into an embed on the way out.

use crate::content::DocumentContent;
use crate::delta::{Attributes, Delta, DeltaError, Insertable, Op, Result};
use loro::{ExpandType, LoroDoc, LoroText, LoroValue, StyleConfig, StyleConfigMap, TextDelta};
use serde_json::Value;

/// Stand-in character for an embed.
pub const EMBED_CHAR: char = '\u{FFFC}';

/// Mark holding an embed's object.
const EMBED_MARK: &str = "embed";

/// Name of the text container inside the Loro document.
const BODY: &str = "body";

/// One document's rich text.
pub struct RichText {
    doc: LoroDoc,
    text: LoroText,
}

impl Default for RichText {
    fn default() -> Self {
        Self::new()
    }
}

impl RichText {
    /// An empty document.
    pub fn new() -> Self {
        let doc = LoroDoc::new();

        let mut styles = StyleConfigMap::default_rich_text_config();
        styles.insert(
            EMBED_MARK.into(),
            StyleConfig {
                expand: ExpandType::None,
            },
        );
        doc.config_text_style(styles);
        // Formats not configured above expand like bold
        doc.config_default_text_style(Some(StyleConfig {
            expand: ExpandType::After,
        }));

        let text = doc.get_text(BODY);
        Self { doc, text }
    }

    /// Load a snapshot.
    pub fn from_content(content: &DocumentContent) -> Result<Self> {
        let mut rich = Self::new();
        rich.apply(content.as_delta())?;
        Ok(rich)
    }

    /// Length in characters (embeds count as one).
    pub fn len(&self) -> usize {
        self.text.len_unicode()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Apply a change. Nothing is touched if the change does not fit.
    pub fn apply(&mut self, change: &Delta) -> Result<()> {
        change.check_applicable(self.len())?;
        let ops = to_text_delta(change);
        if ops.is_empty() {
            return Ok(());
        }
        self.text
            .apply_delta(&ops)
            .map_err(|e| DeltaError::Rejected(e.to_string()))?;
        self.doc.commit();
        Ok(())
    }

    /// Snapshot of the current text and marks.
    pub fn to_content(&self) -> DocumentContent {
        let mut delta = Delta::new();
        for op in self.text.to_delta() {
            let TextDelta::Insert { insert, attributes } = op else {
                continue;
            };
            let mut attributes: Attributes = attributes
                .iter()
                .flatten()
                .filter(|(_, value)| !matches!(value, LoroValue::Null))
                .map(|(key, value)| (key.clone(), loro_value_to_json(value)))
                .collect();

            match attributes.remove(EMBED_MARK) {
                Some(Value::Object(embed)) => {
                    for _ in insert.chars() {
                        delta.push(Op::Insert {
                            insert: Insertable::Embed(embed.clone()),
                            attributes: Some(attributes.clone()),
                        });
                    }
                }
                _ => delta.push(Op::Insert {
                    insert: Insertable::Text(insert),
                    attributes: Some(attributes),
                }),
            }
        }
        DocumentContent::from_document_delta(delta)
    }
}

/// Attributes in Loro's form, minus any `embed` key the sender slipped in.
fn to_loro_attributes<T>(attributes: Option<&Attributes>) -> Option<T>
where
    T: FromIterator<(String, LoroValue)>,
{
    let attributes = attributes?;
    if attributes.keys().all(|key| key == EMBED_MARK) {
        return None;
    }
    Some(
        attributes
            .iter()
            .filter(|(key, _)| *key != EMBED_MARK)
            .map(|(key, value)| (key.clone(), LoroValue::from(value.clone())))
            .collect(),
    )
}

fn to_text_delta(delta: &Delta) -> Vec<TextDelta> {
    delta
        .ops
        .iter()
        .filter(|op| !op.is_empty())
        .map(|op| match op {
            Op::Insert {
                insert: Insertable::Text(text),
                attributes,
            } => TextDelta::Insert {
                insert: text.clone(),
                attributes: to_loro_attributes(attributes.as_ref()),
            },
            Op::Insert {
                insert: Insertable::Embed(embed),
                attributes,
            } => {
                let mut attributes = attributes.clone().unwrap_or_default();
                attributes.retain(|key, _| key != EMBED_MARK);
                let mut marks: Vec<(String, LoroValue)> = attributes
                    .into_iter()
                    .map(|(key, value)| (key, LoroValue::from(value)))
                    .collect();
                marks.push((EMBED_MARK.to_string(), LoroValue::from(Value::Object(embed.clone()))));
                TextDelta::Insert {
                    insert: EMBED_CHAR.to_string(),
                    attributes: Some(marks.into_iter().collect()),
                }
            }
            Op::Retain { retain, attributes } => TextDelta::Retain {
                retain: *retain,
                attributes: to_loro_attributes(attributes.as_ref()),
            },
            Op::Delete { delete } => TextDelta::Delete { delete: *delete },
        })
        .collect()
}

fn loro_value_to_json(value: &LoroValue) -> Value {
    match value {
        LoroValue::Null => Value::Null,
        LoroValue::Bool(b) => Value::Bool(*b),
        LoroValue::I64(n) => serde_json::json!(*n),
        LoroValue::Double(n) => serde_json::json!(*n),
        LoroValue::String(s) => Value::String(s.to_string()),
        LoroValue::List(list) => Value::Array(list.iter().map(loro_value_to_json).collect()),
        LoroValue::Map(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), loro_value_to_json(value)))
                .collect(),
        ),
        _ => Value::Null, // Binary and container values never appear in marks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn attrs(value: Value) -> Option<Attributes> {
        value.as_object().cloned()
    }

    fn rich(text: &str) -> RichText {
        RichText::from_content(&DocumentContent::from_text(text)).unwrap()
    }

    #[test]
    fn test_empty() {
        let rich = RichText::new();
        assert!(rich.is_empty());
        assert_eq!(rich.to_content(), DocumentContent::new());
    }

    #[test]
    fn test_insert_in_middle() {
        let mut rich = rich("held");
        rich.apply(&Delta::new().retain(2).insert("llo wor")).unwrap();
        assert_eq!(rich.to_content(), DocumentContent::from_text("hello world"));
    }

    #[test]
    fn test_delete() {
        let mut rich = rich("hello world");
        rich.apply(&Delta::new().retain(5).delete(6)).unwrap();
        assert_eq!(rich.to_content(), DocumentContent::from_text("hello"));
    }

    #[test]
    fn test_format_and_unformat() {
        let mut rich = rich("hello");
        rich.apply(&Delta::new().retain_with(2, attrs(json!({"bold": true}))))
            .unwrap();
        assert_eq!(
            rich.to_content().as_delta(),
            &Delta::new()
                .insert_with("he", attrs(json!({"bold": true})))
                .insert("llo")
        );

        rich.apply(&Delta::new().retain_with(2, attrs(json!({"bold": null}))))
            .unwrap();
        assert_eq!(rich.to_content(), DocumentContent::from_text("hello"));
    }

    #[test]
    fn test_unlisted_format_keeps_its_value() {
        let mut rich = rich("abc");
        rich.apply(&Delta::new().retain(1).retain_with(1, attrs(json!({"color": "#ff0000"}))))
            .unwrap();
        assert_eq!(
            rich.to_content().as_delta(),
            &Delta::new()
                .insert("a")
                .insert_with("b", attrs(json!({"color": "#ff0000"})))
                .insert("c")
        );
    }

    #[test]
    fn test_multibyte_positions() {
        let mut rich = rich("añb");
        rich.apply(&Delta::new().retain(2).insert("ü")).unwrap();
        assert_eq!(rich.len(), 4);
        assert_eq!(rich.to_content().to_plain_text(), "añüb");
    }

    #[test]
    fn test_embed_round_trips() {
        let embed = json!({"image": "cat.png"}).as_object().cloned().unwrap();
        let mut rich = rich("ab");
        rich.apply(&Delta::new().retain(1).insert_embed(embed.clone(), None))
            .unwrap();

        assert_eq!(rich.len(), 3);
        assert_eq!(
            rich.to_content().as_delta(),
            &Delta::new().insert("a").insert_embed(embed, None).insert("b")
        );
    }

    #[test]
    fn test_embed_mark_from_sender_is_ignored() {
        let mut rich = rich("ab");
        rich.apply(&Delta::new().retain_with(1, attrs(json!({"embed": {"image": "x"}}))))
            .unwrap();
        assert_eq!(rich.to_content(), DocumentContent::from_text("ab"));
    }

    #[test]
    fn test_out_of_bounds_leaves_text() {
        let mut rich = rich("hi");
        assert_eq!(
            rich.apply(&Delta::new().retain(3).insert("!")),
            Err(DeltaError::OutOfBounds {
                required: 3,
                available: 2
            })
        );
        assert_eq!(rich.to_content(), DocumentContent::from_text("hi"));
    }

    #[test]
    fn test_overflowing_change_rejected() {
        let mut rich = rich("hi");
        let hostile: Delta =
            serde_json::from_value(json!({"ops": [{"retain": usize::MAX}, {"delete": 1}]})).unwrap();

        assert_eq!(rich.apply(&hostile), Err(DeltaError::Overflow));
        assert_eq!(rich.to_content(), DocumentContent::from_text("hi"));
    }

    #[test]
    fn test_sequential_changes() {
        let mut rich = rich("abc");
        rich.apply(&Delta::new().retain(3).insert("d")).unwrap();
        rich.apply(&Delta::new().delete(1)).unwrap();
        rich.apply(&Delta::new().retain(1).insert("X")).unwrap();
        assert_eq!(rich.to_content().to_plain_text(), "bXcd");
    }
}
