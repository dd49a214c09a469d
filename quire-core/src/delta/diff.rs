use super::myers::{self, EditKind};
use super::{Delta, Insert, Op, OpIter};
use crate::attributes::diff_attributes;
use crate::error::DeltaError;

/// Stand-in for an embed when flattening a document to chars.
const EMBED_CHAR: char = '\0';

impl Delta {
    /// The change that turns document `self` into document `other`.
    ///
    /// Both sides must be insert-only. The result composed onto `self`
    /// yields `other`; identical inputs give an empty delta.
    pub fn diff(&self, other: &Delta) -> Result<Delta, DeltaError> {
        let old = self.flatten()?;
        let new = other.flatten()?;
        if self.ops == other.ops {
            return Ok(Delta::new());
        }

        let mut this = OpIter::new(&self.ops);
        let mut that = OpIter::new(&other.ops);
        let mut out = Delta::new();

        for edit in myers::diff(&old, &new) {
            let mut remaining = edit.len;
            while remaining > 0 {
                let step = match edit.kind {
                    EditKind::Insert => {
                        let step = that.peek_length().min(remaining);
                        let Some(op) = that.next_op(step) else { break };
                        out.push(op);
                        step
                    }
                    EditKind::Delete => {
                        let step = this.peek_length().min(remaining);
                        if this.next_op(step).is_none() {
                            break;
                        }
                        out.push(Op::Delete { length: step });
                        step
                    }
                    EditKind::Equal => {
                        let step = this.peek_length().min(that.peek_length()).min(remaining);
                        let (Some(this_op), Some(that_op)) = (this.next_op(step), that.next_op(step))
                        else {
                            break;
                        };
                        let retained = match (&this_op, &that_op) {
                            (
                                Op::Insert { content: a, attributes: a_attrs },
                                Op::Insert { content: b, attributes: b_attrs },
                            ) if a == b => Some(diff_attributes(a_attrs, b_attrs)),
                            _ => None,
                        };
                        match retained {
                            Some(attributes) => out.push(Op::Retain { length: step, attributes }),
                            // Two different embeds line up on the placeholder char.
                            None => out.push(that_op).push(Op::Delete { length: step }),
                        };
                        step
                    }
                };
                remaining -= step;
            }
        }

        Ok(out.chop())
    }

    /// One char per document unit, embeds as a placeholder.
    fn flatten(&self) -> Result<Vec<char>, DeltaError> {
        let mut out = Vec::with_capacity(self.len());
        for op in &self.ops {
            match op {
                Op::Insert { content: Insert::Text(text), .. } => out.extend(text.chars()),
                Op::Insert { content: Insert::Embed(_), .. } => out.push(EMBED_CHAR),
                _ => return Err(DeltaError::NotADocument),
            }
        }
        Ok(out)
    }
}
