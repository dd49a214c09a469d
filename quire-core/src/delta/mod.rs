//! The rich-text delta and its algebra.
//!
//! A [`Delta`] is an ordered list of [`Op`]s. An insert-only delta is a
//! document; a delta with retains and deletes is a change to be composed
//! onto one. Deltas are values: every operation returns a new delta.
//!
//! Ops are kept normalized as they are pushed (adjacent text inserts and
//! retains with equal attributes merge, adjacent deletes merge, an insert
//! goes before a neighbouring delete), so structural equality is
//! meaningful.

mod compose;
mod diff;
mod iter;
mod myers;
mod op;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::attributes::Attributes;

pub use op::{Insert, Op, OpKind};

pub(crate) use iter::OpIter;

/// Character used for embeds in [`Delta::plain_text`].
pub const OBJECT_REPLACEMENT: char = '\u{FFFC}';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDelta")]
pub struct Delta {
    ops: Vec<Op>,
}

#[derive(Deserialize)]
struct RawDelta {
    #[serde(default)]
    ops: Vec<Op>,
}

impl From<RawDelta> for Delta {
    fn from(raw: RawDelta) -> Self {
        Delta::from_ops(raw.ops)
    }
}

impl Delta {
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Build from arbitrary ops, normalizing them.
    pub fn from_ops(ops: impl IntoIterator<Item = Op>) -> Self {
        let mut delta = Self::new();
        for op in ops {
            delta.push(op);
        }
        delta
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    // ---------------------------------------------------------------
    // Builders
    // ---------------------------------------------------------------

    pub fn insert(self, text: impl Into<String>) -> Self {
        self.insert_with(text, Attributes::new())
    }

    pub fn insert_with(mut self, text: impl Into<String>, attributes: Attributes) -> Self {
        self.push(Op::Insert {
            content: Insert::Text(text.into()),
            attributes,
        });
        self
    }

    pub fn insert_embed(mut self, embed: Map<String, Value>, attributes: Attributes) -> Self {
        self.push(Op::Insert {
            content: Insert::Embed(embed),
            attributes,
        });
        self
    }

    pub fn retain(self, length: usize) -> Self {
        self.retain_with(length, Attributes::new())
    }

    pub fn retain_with(mut self, length: usize, attributes: Attributes) -> Self {
        self.push(Op::Retain { length, attributes });
        self
    }

    pub fn delete(mut self, length: usize) -> Self {
        self.push(Op::Delete { length });
        self
    }

    /// Append one op, merging it into the tail where possible.
    pub fn push(&mut self, op: Op) -> &mut Self {
        if op.is_empty() {
            return self;
        }

        if let (Some(Op::Delete { length }), Op::Delete { length: more }) =
            (self.ops.last_mut(), &op)
        {
            *length += more;
            return self;
        }

        let mut index = self.ops.len();
        if op.is_insert() && matches!(self.ops.last(), Some(Op::Delete { .. })) {
            index -= 1;
        }

        if index > 0 && merge_into(&mut self.ops[index - 1], &op) {
            return self;
        }
        self.ops.insert(index, op);
        self
    }

    /// Drop a trailing retain that carries no attributes.
    pub fn chop(mut self) -> Self {
        if let Some(Op::Retain { attributes, .. }) = self.ops.last() {
            if attributes.is_empty() {
                self.ops.pop();
            }
        }
        self
    }

    // ---------------------------------------------------------------
    // Measures
    // ---------------------------------------------------------------

    /// Document-advancing length: inserts plus retains. Deletes do not count.
    pub fn len(&self) -> usize {
        self.ops
            .iter()
            .filter(|op| op.kind() != OpKind::Delete)
            .map(Op::len)
            .sum()
    }

    /// Whether this delta is a document (inserts only).
    pub fn is_document(&self) -> bool {
        self.ops.iter().all(Op::is_insert)
    }

    /// Text content, embeds shown as U+FFFC. Retains and deletes are skipped.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for op in &self.ops {
            match op {
                Op::Insert { content: Insert::Text(text), .. } => out.push_str(text),
                Op::Insert { content: Insert::Embed(_), .. } => out.push(OBJECT_REPLACEMENT),
                _ => {}
            }
        }
        out
    }

    // ---------------------------------------------------------------
    // Slicing
    // ---------------------------------------------------------------

    /// Ops covering positions `[start, end)`.
    ///
    /// Positions count the length of every op, deletes included, so that
    /// `slice(0, k).concat(&slice_from(k))` always rebuilds the delta.
    pub fn slice(&self, start: usize, end: usize) -> Delta {
        let mut out = Vec::new();
        let mut iter = OpIter::new(&self.ops);
        let mut index = 0;

        while index < end {
            let step = if index < start { start - index } else { end - index };
            let Some(op) = iter.next_op(step) else { break };
            let len = op.len();
            if index >= start {
                out.push(op);
            }
            index += len;
        }
        Delta { ops: out }
    }

    /// Ops from `start` to the end.
    pub fn slice_from(&self, start: usize) -> Delta {
        self.slice(start, usize::MAX)
    }

    /// `self` followed by `other`, merging across the seam.
    pub fn concat(&self, other: &Delta) -> Delta {
        let mut out = self.clone();
        for op in &other.ops {
            out.push(op.clone());
        }
        out
    }
}

/// Merge `op` into `last` when both are text inserts or both retains
/// with equal attributes.
fn merge_into(last: &mut Op, op: &Op) -> bool {
    match (last, op) {
        (
            Op::Insert { content: Insert::Text(text), attributes },
            Op::Insert { content: Insert::Text(more), attributes: other },
        ) if *attributes == *other => {
            text.push_str(more);
            true
        }
        (
            Op::Retain { length, attributes },
            Op::Retain { length: more, attributes: other },
        ) if *attributes == *other => {
            *length += more;
            true
        }
        _ => false,
    }
}
