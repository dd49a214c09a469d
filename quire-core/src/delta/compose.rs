use super::{Delta, Op, OpIter, OpKind};
use crate::attributes::compose_attributes;
use crate::error::DeltaError;

impl Delta {
    /// Apply `other` as a change on top of `self`.
    ///
    /// Fails with [`DeltaError::Malformed`] when `other` retains or deletes
    /// past the end of `self`.
    pub fn compose(&self, other: &Delta) -> Result<Delta, DeltaError> {
        if other.is_empty() {
            return Ok(self.clone());
        }

        let mut this = OpIter::new(&self.ops);
        let mut that = OpIter::new(&other.ops);
        let mut out = Delta::new();
        let mut position = 0;

        while this.has_next() || that.has_next() {
            if that.peek_kind() == Some(OpKind::Insert) {
                if let Some(op) = that.next_whole() {
                    out.push(op);
                }
                continue;
            }
            if this.peek_kind() == Some(OpKind::Delete) {
                if let Some(op) = this.next_whole() {
                    out.push(op);
                }
                continue;
            }
            if !that.has_next() {
                for op in this.rest() {
                    out.push(op);
                }
                break;
            }
            if !this.has_next() {
                return Err(DeltaError::Malformed {
                    position,
                    overrun: that.peek_length(),
                });
            }

            let length = this.peek_length().min(that.peek_length());
            let (Some(this_op), Some(that_op)) = (this.next_op(length), that.next_op(length)) else {
                break;
            };
            position += length;

            match (this_op, that_op) {
                (Op::Retain { attributes, .. }, Op::Retain { attributes: change, .. }) => {
                    out.push(Op::Retain {
                        length,
                        attributes: compose_attributes(&attributes, &change, true),
                    });
                }
                (Op::Insert { content, attributes }, Op::Retain { attributes: change, .. }) => {
                    out.push(Op::Insert {
                        content,
                        attributes: compose_attributes(&attributes, &change, false),
                    });
                }
                (Op::Retain { .. }, Op::Delete { .. }) => {
                    out.push(Op::Delete { length });
                }
                // An insert deleted by the change disappears.
                _ => {}
            }
        }

        Ok(out.chop())
    }
}
