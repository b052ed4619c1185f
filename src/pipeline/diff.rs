//! Line diff between two snapshots.
//!
//! Lines are matched with a longest-common-subsequence table after the
//! common prefix and suffix are trimmed. Changed regions are grouped into
//! hunks padded with `context` unchanged lines and rendered in unified-diff
//! form (`--- old`, `+++ new`, `@@ -a,b +c,d @@`).
//!
//! The result is deterministic: ties always prefer removals before
//! additions, so a replaced line shows as `-old` followed by `+new`.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// Default number of context lines around a change.
pub const DEFAULT_CONTEXT: usize = 3;

/// One step of the edit script, holding indices into the inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    /// `old[i] == new[j]`
    Equal(usize, usize),
    /// `old[i]` removed
    Delete(usize),
    /// `new[j]` added
    Insert(usize),
}

/// Role of a line inside a hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Context,
    Removed,
    Added,
}

impl LineKind {
    fn prefix(&self) -> char {
        match self {
            LineKind::Context => ' ',
            LineKind::Removed => '-',
            LineKind::Added => '+',
        }
    }
}

/// A line of a hunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: LineKind,
    pub text: String,
}

/// A contiguous block of changes with surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hunk {
    /// Zero-based index of the first old line covered
    pub old_start: usize,
    pub old_len: usize,
    /// Zero-based index of the first new line covered
    pub new_start: usize,
    pub new_len: usize,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Unified-diff hunk header, e.g. `@@ -1,3 +1,3 @@`.
    pub fn header(&self) -> String {
        format!(
            "@@ -{} +{} @@",
            format_range(self.old_start, self.old_len),
            format_range(self.new_start, self.new_len)
        )
    }

    /// Lines of the given kind.
    pub fn lines_of(&self, kind: LineKind) -> impl Iterator<Item = &str> {
        self.lines
            .iter()
            .filter(move |line| line.kind == kind)
            .map(|line| line.text.as_str())
    }
}

/// `start,len` range in 1-based unified-diff convention.
fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{},0", start),
        1 => format!("{}", start + 1),
        _ => format!("{},{}", start + 1, len),
    }
}

/// Ordered hunks between two line sequences.
///
/// Empty if and only if the inputs are line-for-line identical.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub hunks: Vec<Hunk>,
}

impl DiffResult {
    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.hunks.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.hunks.is_empty()
    }

    /// Number of added lines.
    pub fn added_count(&self) -> usize {
        self.count(LineKind::Added)
    }

    /// Number of removed lines.
    pub fn removed_count(&self) -> usize {
        self.count(LineKind::Removed)
    }

    fn count(&self, kind: LineKind) -> usize {
        self.hunks.iter().map(|h| h.lines_of(kind).count()).sum()
    }

    /// Render as unified-diff text. Empty diffs render as an empty string.
    pub fn render(&self, from_label: &str, to_label: &str) -> String {
        if self.hunks.is_empty() {
            return String::new();
        }

        let mut out = String::new();
        let _ = writeln!(out, "--- {}", from_label);
        let _ = writeln!(out, "+++ {}", to_label);
        for hunk in &self.hunks {
            let _ = writeln!(out, "{}", hunk.header());
            for line in &hunk.lines {
                let _ = writeln!(out, "{}{}", line.kind.prefix(), line.text);
            }
        }
        out
    }
}

/// Calculator for line diffs with a fixed context size.
#[derive(Debug, Clone)]
pub struct DiffCalculator {
    context: usize,
}

impl Default for DiffCalculator {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffCalculator {
    /// Create a calculator with the default context of three lines.
    pub fn new() -> Self {
        Self::with_context(DEFAULT_CONTEXT)
    }

    /// Create a calculator with a custom context size.
    pub fn with_context(context: usize) -> Self {
        Self { context }
    }

    /// Calculate the hunks that turn `old` into `new`.
    pub fn calculate(&self, old: &[String], new: &[String]) -> DiffResult {
        let edits = line_edits(old, new);
        let positions = positions(&edits);
        let hunks = group_hunks(&edits, self.context)
            .into_iter()
            .map(|(start, end)| build_hunk(&edits[start..end], positions[start], old, new))
            .collect();
        DiffResult { hunks }
    }
}

/// Convenience function to calculate a diff with default context.
pub fn calculate_diff(old: &[String], new: &[String]) -> DiffResult {
    DiffCalculator::new().calculate(old, new)
}

/// Subproblems up to this many table cells are solved with a full LCS table;
/// larger ones are halved in linear space first.
const TABLE_CELLS: usize = 1 << 22;

/// Full edit script from `old` to `new` via longest common subsequence.
pub fn line_edits(old: &[String], new: &[String]) -> Vec<Edit> {
    edits_within(old, new, TABLE_CELLS)
}

fn edits_within(old: &[String], new: &[String], max_cells: usize) -> Vec<Edit> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let a = &old[prefix..old.len() - suffix];
    let b = &new[prefix..new.len() - suffix];

    let mut edits = Vec::with_capacity(prefix + suffix + a.len() + b.len());
    edits.extend((0..prefix).map(|i| Edit::Equal(i, i)));
    split_edits(a, b, (prefix, prefix), max_cells, &mut edits);

    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    edits.extend((0..suffix).map(|k| Edit::Equal(old_tail + k, new_tail + k)));
    edits
}

/// Hirschberg: split `a` in half, find where the LCS crosses `b`, recurse.
fn split_edits(
    a: &[String],
    b: &[String],
    offset: (usize, usize),
    max_cells: usize,
    edits: &mut Vec<Edit>,
) {
    let (n, m) = (a.len(), b.len());
    if n == 0 || m == 0 || n == 1 || (n + 1).saturating_mul(m + 1) <= max_cells {
        table_edits(a, b, offset, edits);
        return;
    }

    let mid = n / 2;
    let upper = prefix_lcs_row(&a[..mid], b);
    let lower = suffix_lcs_row(&a[mid..], b);

    let mut split = 0;
    for j in 1..=m {
        if upper[j] + lower[j] > upper[split] + lower[split] {
            split = j;
        }
    }

    split_edits(&a[..mid], &b[..split], offset, max_cells, edits);
    split_edits(
        &a[mid..],
        &b[split..],
        (offset.0 + mid, offset.1 + split),
        max_cells,
        edits,
    );
}

/// `row[j]` = LCS length of `a` and `b[..j]`.
fn prefix_lcs_row(a: &[String], b: &[String]) -> Vec<u32> {
    let mut row = vec![0u32; b.len() + 1];
    for x in a {
        let mut diag = 0;
        for j in 1..=b.len() {
            let up = row[j];
            row[j] = if *x == b[j - 1] {
                diag + 1
            } else {
                up.max(row[j - 1])
            };
            diag = up;
        }
    }
    row
}

/// `row[j]` = LCS length of `a` and `b[j..]`.
fn suffix_lcs_row(a: &[String], b: &[String]) -> Vec<u32> {
    let m = b.len();
    let mut row = vec![0u32; m + 1];
    for x in a.iter().rev() {
        let mut diag = 0;
        for j in (0..m).rev() {
            let down = row[j];
            row[j] = if *x == b[j] {
                diag + 1
            } else {
                down.max(row[j + 1])
            };
            diag = down;
        }
    }
    row
}

/// Quadratic-space LCS backtrack; deletions win ties.
fn table_edits(a: &[String], b: &[String], offset: (usize, usize), edits: &mut Vec<Edit>) {
    let (n, m) = (a.len(), b.len());
    let (oa, ob) = offset;

    // table[i * (m + 1) + j] = LCS length of a[i..] and b[j..]
    let width = m + 1;
    let mut table = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i * width + j] = if a[i] == b[j] {
                table[(i + 1) * width + j + 1] + 1
            } else {
                table[(i + 1) * width + j].max(table[i * width + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            edits.push(Edit::Equal(oa + i, ob + j));
            i += 1;
            j += 1;
        } else if table[(i + 1) * width + j] >= table[i * width + j + 1] {
            edits.push(Edit::Delete(oa + i));
            i += 1;
        } else {
            edits.push(Edit::Insert(ob + j));
            j += 1;
        }
    }
    edits.extend((i..n).map(|i| Edit::Delete(oa + i)));
    edits.extend((j..m).map(|j| Edit::Insert(ob + j)));
}

/// Edit-script ranges `[start, end)` that form hunks.
fn group_hunks(edits: &[Edit], context: usize) -> Vec<(usize, usize)> {
    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| !matches!(e, Edit::Equal(..)))
        .map(|(k, _)| k)
        .collect();

    let Some((&first, rest)) = changes.split_first() else {
        return Vec::new();
    };

    let close = |last: usize| last.saturating_add(context).saturating_add(1).min(edits.len());
    let max_gap = context.saturating_mul(2);

    let mut groups = Vec::new();
    let mut start = first.saturating_sub(context);
    let mut last = first;
    for &change in rest {
        if change - last - 1 > max_gap {
            groups.push((start, close(last)));
            start = change.saturating_sub(context);
        }
        last = change;
    }
    groups.push((start, close(last)));
    groups
}

/// Old/new line positions reached before each edit.
fn positions(edits: &[Edit]) -> Vec<(usize, usize)> {
    let (mut old_pos, mut new_pos) = (0, 0);
    edits
        .iter()
        .map(|edit| {
            let at = (old_pos, new_pos);
            match edit {
                Edit::Equal(..) => {
                    old_pos += 1;
                    new_pos += 1;
                }
                Edit::Delete(_) => old_pos += 1,
                Edit::Insert(_) => new_pos += 1,
            }
            at
        })
        .collect()
}

fn build_hunk(edits: &[Edit], start: (usize, usize), old: &[String], new: &[String]) -> Hunk {
    let mut old_len = 0;
    let mut new_len = 0;

    let lines = edits
        .iter()
        .map(|edit| match *edit {
            Edit::Equal(i, _) => {
                old_len += 1;
                new_len += 1;
                DiffLine {
                    kind: LineKind::Context,
                    text: old[i].clone(),
                }
            }
            Edit::Delete(i) => {
                old_len += 1;
                DiffLine {
                    kind: LineKind::Removed,
                    text: old[i].clone(),
                }
            }
            Edit::Insert(j) => {
                new_len += 1;
                DiffLine {
                    kind: LineKind::Added,
                    text: new[j].clone(),
                }
            }
        })
        .collect();

    Hunk {
        old_start: start.0,
        old_len,
        new_start: start.1,
        new_len,
        lines,
    }
}
