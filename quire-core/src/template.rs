use crate::delta::Delta;

/// Splice `fragment` into `document` at `cursor`.
///
/// The cursor saturates to `[0, document.len()]`; an out-of-range cursor
/// appends rather than failing.
pub fn merge_at(document: &Delta, fragment: &Delta, cursor: usize) -> Delta {
    let cursor = cursor.min(document.len());
    document
        .slice(0, cursor)
        .concat(fragment)
        .concat(&document.slice_from(cursor))
}
