//! Shortest edit script between two sequences (Myers, 1986).
//!
//! Common prefix and suffix are stripped, then the remainder is split at
//! the middle snake of an optimal path and both halves are solved
//! recursively. Only two frontier vectors are live at a time, so memory
//! stays linear in the input length. Between two equal runs all deletions
//! are emitted before the insertions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EditKind {
    Equal,
    Insert,
    Delete,
}

/// A run of `len` elements of the same kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Edit {
    pub kind: EditKind,
    pub len: usize,
}

pub(crate) fn diff<T: PartialEq>(old: &[T], new: &[T]) -> Vec<Edit> {
    let mut edits = Vec::new();
    solve(old, new, &mut edits);
    edits
}

fn push(edits: &mut Vec<Edit>, kind: EditKind, len: usize) {
    if len == 0 {
        return;
    }
    let n = edits.len();
    let last = n.checked_sub(1).map(|i| edits[i].kind);
    let before_last = n.checked_sub(2).map(|i| edits[i].kind);
    if last == Some(kind) {
        edits[n - 1].len += len;
    } else if kind == EditKind::Delete && last == Some(EditKind::Insert) {
        if before_last == Some(EditKind::Delete) {
            edits[n - 2].len += len;
        } else {
            edits.insert(n - 1, Edit { kind, len });
        }
    } else {
        edits.push(Edit { kind, len });
    }
}

fn solve<T: PartialEq>(a: &[T], b: &[T], edits: &mut Vec<Edit>) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (a, b) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);

    push(edits, EditKind::Equal, prefix);
    if a.is_empty() {
        push(edits, EditKind::Insert, b.len());
    } else if b.is_empty() {
        push(edits, EditKind::Delete, a.len());
    } else {
        // Both sides start and end on a mismatch, so the edit distance is
        // at least two and each half below is strictly smaller.
        let (x, y) = split_point(a, b);
        solve(&a[..x], &b[..y], edits);
        solve(&a[x..], &b[y..], edits);
    }
    push(edits, EditKind::Equal, suffix);
}

/// A point on an optimal path roughly halfway through the edit distance.
///
/// Runs the forward search from the origin and the reverse search from the
/// far corner until their frontiers overlap. Frontier entries hold `x` (or
/// the distance from the end along `a` for the reverse pass), `-1` meaning
/// not yet reached.
fn split_point<T: PartialEq>(a: &[T], b: &[T]) -> (usize, usize) {
    let n = a.len() as isize;
    let m = b.len() as isize;
    let max_d = (n + m + 1) / 2;
    let offset = max_d;
    let width = 2 * max_d + 2;
    let mut forward = vec![-1isize; width as usize];
    let mut reverse = vec![-1isize; width as usize];
    forward[(offset + 1) as usize] = 0;
    reverse[(offset + 1) as usize] = 0;

    let delta = n - m;
    // With an odd delta the paths meet during a forward step.
    let meet_forward = delta % 2 != 0;
    let in_range = |i: isize| i >= 0 && i < width;

    // Diagonals that ran off the grid are skipped on later passes.
    let (mut f_start, mut f_end, mut r_start, mut r_end) = (0, 0, 0, 0);

    for d in 0..max_d {
        let mut k = -d + f_start;
        while k <= d - f_end {
            let at = (offset + k) as usize;
            let mut x = if k == -d || (k != d && forward[at - 1] < forward[at + 1]) {
                forward[at + 1]
            } else {
                forward[at - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[x as usize] == b[y as usize] {
                x += 1;
                y += 1;
            }
            forward[at] = x;
            if x > n {
                f_end += 2;
            } else if y > m {
                f_start += 2;
            } else if meet_forward {
                let r_at = offset + delta - k;
                if in_range(r_at) && reverse[r_at as usize] != -1 && x >= n - reverse[r_at as usize] {
                    return (x as usize, y as usize);
                }
            }
            k += 2;
        }

        let mut k = -d + r_start;
        while k <= d - r_end {
            let at = (offset + k) as usize;
            let mut x = if k == -d || (k != d && reverse[at - 1] < reverse[at + 1]) {
                reverse[at + 1]
            } else {
                reverse[at - 1] + 1
            };
            let mut y = x - k;
            while x < n && y < m && a[(n - x - 1) as usize] == b[(m - y - 1) as usize] {
                x += 1;
                y += 1;
            }
            reverse[at] = x;
            if x > n {
                r_end += 2;
            } else if y > m {
                r_start += 2;
            } else if !meet_forward {
                let f_at = offset + delta - k;
                if in_range(f_at) && forward[f_at as usize] != -1 {
                    let fx = forward[f_at as usize];
                    let fy = fx - (f_at - offset);
                    if fx >= n - x {
                        return (fx as usize, fy as usize);
                    }
                }
            }
            k += 2;
        }
    }

    // The frontiers only fail to meet when nothing is shared.
    (a.len(), 0)
}
