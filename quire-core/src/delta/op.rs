use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attributes::Attributes;

/// Content carried by an insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insert {
    Text(String),
    /// Embedded object such as `{"image": "https://..."}`. Always one unit long.
    Embed(Map<String, Value>),
}

impl Insert {
    /// Length in document units (chars for text, 1 for an embed).
    pub fn len(&self) -> usize {
        match self {
            Insert::Text(text) => char_len(text),
            Insert::Embed(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Insert::Text(text) => Some(text),
            Insert::Embed(_) => None,
        }
    }
}

impl From<&str> for Insert {
    fn from(text: &str) -> Self {
        Insert::Text(text.to_string())
    }
}

impl From<String> for Insert {
    fn from(text: String) -> Self {
        Insert::Text(text)
    }
}

/// Discriminant of an [`Op`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpKind {
    Insert,
    Retain,
    Delete,
}

/// One element of a [`Delta`](super::Delta).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawOp", into = "RawOp")]
pub enum Op {
    Insert { content: Insert, attributes: Attributes },
    Retain { length: usize, attributes: Attributes },
    Delete { length: usize },
}

impl Op {
    pub fn kind(&self) -> OpKind {
        match self {
            Op::Insert { .. } => OpKind::Insert,
            Op::Retain { .. } => OpKind::Retain,
            Op::Delete { .. } => OpKind::Delete,
        }
    }

    /// Length in document units. Deletes report the span they remove.
    pub fn len(&self) -> usize {
        match self {
            Op::Insert { content, .. } => content.len(),
            Op::Retain { length, .. } | Op::Delete { length } => *length,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Op::Insert { .. })
    }

    pub fn attributes(&self) -> Option<&Attributes> {
        match self {
            Op::Insert { attributes, .. } | Op::Retain { attributes, .. } => Some(attributes),
            Op::Delete { .. } => None,
        }
    }

    /// Part of this op covering `[offset, offset + count)`.
    pub(crate) fn slice(&self, offset: usize, count: usize) -> Op {
        match self {
            Op::Insert { content: Insert::Text(text), attributes } => Op::Insert {
                content: Insert::Text(char_slice(text, offset, count).to_string()),
                attributes: attributes.clone(),
            },
            Op::Insert { .. } => self.clone(),
            Op::Retain { attributes, .. } => Op::Retain {
                length: count,
                attributes: attributes.clone(),
            },
            Op::Delete { .. } => Op::Delete { length: count },
        }
    }
}

pub(crate) fn char_len(text: &str) -> usize {
    if text.is_ascii() {
        text.len()
    } else {
        text.chars().count()
    }
}

/// Substring of `count` chars starting at char `offset`.
pub(crate) fn char_slice(text: &str, offset: usize, count: usize) -> &str {
    if text.is_ascii() {
        let start = offset.min(text.len());
        let end = start.saturating_add(count).min(text.len());
        return &text[start..end];
    }
    let start = text
        .char_indices()
        .nth(offset)
        .map_or(text.len(), |(i, _)| i);
    let rest = &text[start..];
    let end = rest.char_indices().nth(count).map_or(rest.len(), |(i, _)| i);
    &rest[..end]
}

/// JSON shape of an op: exactly one of `insert`, `retain`, `delete`.
#[derive(Serialize, Deserialize)]
struct RawOp {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    insert: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    retain: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    delete: Option<usize>,
    #[serde(default, skip_serializing_if = "Attributes::is_empty")]
    attributes: Attributes,
}

impl TryFrom<RawOp> for Op {
    type Error = String;

    fn try_from(raw: RawOp) -> Result<Self, Self::Error> {
        match (raw.insert, raw.retain, raw.delete) {
            (Some(Value::String(text)), None, None) if !text.is_empty() => Ok(Op::Insert {
                content: Insert::Text(text),
                attributes: raw.attributes,
            }),
            (Some(Value::Object(embed)), None, None) => Ok(Op::Insert {
                content: Insert::Embed(embed),
                attributes: raw.attributes,
            }),
            (Some(other), None, None) => Err(format!("invalid insert value: {other}")),
            (None, Some(length), None) if length > 0 => Ok(Op::Retain {
                length,
                attributes: raw.attributes,
            }),
            (None, None, Some(length)) if length > 0 => Ok(Op::Delete { length }),
            _ => Err("op must carry exactly one non-empty insert, retain or delete".to_string()),
        }
    }
}

impl From<Op> for RawOp {
    fn from(op: Op) -> Self {
        match op {
            Op::Insert { content, attributes } => RawOp {
                insert: Some(match content {
                    Insert::Text(text) => Value::String(text),
                    Insert::Embed(embed) => Value::Object(embed),
                }),
                retain: None,
                delete: None,
                attributes,
            },
            Op::Retain { length, attributes } => RawOp {
                insert: None,
                retain: Some(length),
                delete: None,
                attributes,
            },
            Op::Delete { length } => RawOp {
                insert: None,
                retain: None,
                delete: Some(length),
                attributes: Attributes::new(),
            },
        }
    }
}
