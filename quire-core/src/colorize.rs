//! Insert/delete-highlighted rendering of the change between two versions.
//!
//! The diff between the older and newer document is rewritten so that
//! inserted text is tinted and deleted text is kept but struck through,
//! then composed onto the older document. The result never loses content
//! relative to the older version; it only adds and recolors.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::attributes::{compose_attributes, Attributes};
use crate::delta::{Delta, Op};
use crate::error::DeltaError;

/// Colors used to mark insertions and deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffPalette {
    pub insert_background: String,
    pub insert_color: String,
    pub delete_background: String,
    pub delete_color: String,
}

impl Default for DiffPalette {
    fn default() -> Self {
        Self {
            insert_background: "#cce8cc".to_string(),
            insert_color: "#003700".to_string(),
            delete_background: "#e8cccc".to_string(),
            delete_color: "#370000".to_string(),
        }
    }
}

impl DiffPalette {
    pub fn insert_attributes(&self) -> Attributes {
        Attributes::from([
            ("background".to_string(), Value::from(self.insert_background.as_str())),
            ("color".to_string(), Value::from(self.insert_color.as_str())),
        ])
    }

    pub fn delete_attributes(&self) -> Attributes {
        Attributes::from([
            ("background".to_string(), Value::from(self.delete_background.as_str())),
            ("color".to_string(), Value::from(self.delete_color.as_str())),
            ("strike".to_string(), Value::Bool(true)),
        ])
    }
}

/// Rewrite a diff so it marks changes instead of applying them.
///
/// Inserts get the insert highlight layered over their own formatting.
/// Deletes become retains carrying the delete highlight, so the deleted
/// span stays visible.
pub fn annotate(diff: &Delta, palette: &DiffPalette) -> Delta {
    let inserted = palette.insert_attributes();
    let deleted = palette.delete_attributes();

    let mut out = Delta::new();
    for op in diff.ops() {
        match op {
            Op::Insert { content, attributes } => out.push(Op::Insert {
                content: content.clone(),
                attributes: compose_attributes(attributes, &inserted, false),
            }),
            Op::Delete { length } => out.push(Op::Retain {
                length: *length,
                attributes: deleted.clone(),
            }),
            Op::Retain { .. } => out.push(op.clone()),
        };
    }
    out
}

/// Render the change from `older` to `newer` as a single annotated document.
pub fn colorize(older: &Delta, newer: &Delta, palette: &DiffPalette) -> Result<Delta, DeltaError> {
    let started = Instant::now();
    let diff = older.diff(newer)?;
    let rendered = older.compose(&annotate(&diff, palette))?;
    log::debug!(
        "Colorized diff: {} ops -> {} ops in {:?}",
        diff.ops().len(),
        rendered.ops().len(),
        started.elapsed()
    );
    Ok(rendered)
}
