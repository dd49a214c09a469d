use super::op::{Op, OpKind};

/// Cursor over a slice of ops that can hand out partial ops.
///
/// Once exhausted, `peek_length` reports `usize::MAX` and `peek_kind`
/// reports `None`.
pub(crate) struct OpIter<'a> {
    ops: &'a [Op],
    index: usize,
    offset: usize,
}

impl<'a> OpIter<'a> {
    pub fn new(ops: &'a [Op]) -> Self {
        Self { ops, index: 0, offset: 0 }
    }

    pub fn has_next(&self) -> bool {
        self.index < self.ops.len()
    }

    pub fn peek_kind(&self) -> Option<OpKind> {
        self.ops.get(self.index).map(Op::kind)
    }

    pub fn peek_length(&self) -> usize {
        self.ops
            .get(self.index)
            .map_or(usize::MAX, |op| op.len() - self.offset)
    }

    /// Take up to `length` units from the current op. `0` takes the rest of it.
    pub fn next_op(&mut self, length: usize) -> Option<Op> {
        let op = self.ops.get(self.index)?;
        let remaining = op.len() - self.offset;
        let take = if length == 0 { remaining } else { length.min(remaining) };
        let offset = self.offset;

        if take == remaining {
            self.index += 1;
            self.offset = 0;
        } else {
            self.offset += take;
        }

        if offset == 0 && take == op.len() {
            Some(op.clone())
        } else {
            Some(op.slice(offset, take))
        }
    }

    /// Take the whole current op (or what is left of it).
    pub fn next_whole(&mut self) -> Option<Op> {
        self.next_op(0)
    }

    /// Everything not consumed yet.
    pub fn rest(&mut self) -> Vec<Op> {
        let mut out = Vec::new();
        while let Some(op) = self.next_whole() {
            out.push(op);
        }
        out
    }
}
