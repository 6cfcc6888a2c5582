//! Unified-format rendering of edit scripts.

use std::fmt::Write as _;
use std::ops::Range;

use serde::Serialize;
use similar::{group_diff_ops, DiffOp, DiffTag};

use crate::diff::Edit;

/// lines of unchanged context around each change
pub const DEFAULT_CONTEXT: usize = 3;

/// A contiguous region of changes plus surrounding context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hunk {
    pub old_start: usize,
    pub old_len: usize,
    pub new_start: usize,
    pub new_len: usize,
    pub edits: Vec<Edit>,
}

impl Hunk {
    /// the `@@ -a,b +c,d @@` header line
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_len, self.new_start, self.new_len
        )
    }
}

/// coalesce an edit script into `similar` ops over line indices
fn diff_ops(edits: &[Edit]) -> Vec<DiffOp> {
    let mut ops: Vec<DiffOp> = Vec::new();
    let (mut old, mut new) = (0, 0);
    for edit in edits {
        let extended = match (ops.last_mut(), edit) {
            (Some(DiffOp::Equal { len, .. }), Edit::Equal(_)) => {
                *len += 1;
                true
            }
            (Some(DiffOp::Delete { old_len, .. }), Edit::Delete(_)) => {
                *old_len += 1;
                true
            }
            (Some(DiffOp::Insert { new_len, .. }), Edit::Insert(_)) => {
                *new_len += 1;
                true
            }
            _ => false,
        };
        if !extended {
            ops.push(match edit {
                Edit::Equal(_) => DiffOp::Equal {
                    old_index: old,
                    new_index: new,
                    len: 1,
                },
                Edit::Delete(_) => DiffOp::Delete {
                    old_index: old,
                    old_len: 1,
                    new_index: new,
                },
                Edit::Insert(_) => DiffOp::Insert {
                    old_index: old,
                    new_index: new,
                    new_len: 1,
                },
            });
        }
        match edit {
            Edit::Equal(_) => {
                old += 1;
                new += 1;
            }
            Edit::Delete(_) => old += 1,
            Edit::Insert(_) => new += 1,
        }
    }
    ops
}

/// 1-based start of a hunk side; an empty side points at the line before it
fn start_of(range: &Range<usize>) -> usize {
    if range.is_empty() {
        range.start
    } else {
        range.start + 1
    }
}

/// group an edit script into hunks with `context` lines around changes
pub fn hunks(edits: &[Edit], context: usize) -> Vec<Hunk> {
    let old_lines: Vec<&str> = edits
        .iter()
        .filter(|e| !matches!(e, Edit::Insert(_)))
        .map(Edit::line)
        .collect();
    let new_lines: Vec<&str> = edits
        .iter()
        .filter(|e| !matches!(e, Edit::Delete(_)))
        .map(Edit::line)
        .collect();

    group_diff_ops(diff_ops(edits), context)
        .into_iter()
        .filter_map(|group| {
            let (first, last) = (group.first()?, group.last()?);
            let old = first.old_range().start..last.old_range().end;
            let new = first.new_range().start..last.new_range().end;

            let mut body = Vec::new();
            for op in &group {
                let (tag, old_range, new_range) = op.as_tag_tuple();
                let deleted = old_lines[old_range].iter().map(|l| l.to_string());
                let inserted = new_lines[new_range].iter().map(|l| l.to_string());
                match tag {
                    DiffTag::Equal => body.extend(deleted.map(Edit::Equal)),
                    DiffTag::Delete => body.extend(deleted.map(Edit::Delete)),
                    DiffTag::Insert => body.extend(inserted.map(Edit::Insert)),
                    DiffTag::Replace => {
                        body.extend(deleted.map(Edit::Delete));
                        body.extend(inserted.map(Edit::Insert));
                    }
                }
            }

            Some(Hunk {
                old_start: start_of(&old),
                old_len: old.len(),
                new_start: start_of(&new),
                new_len: new.len(),
                edits: body,
            })
        })
        .collect()
}

/// render a complete unified diff; empty when there are no changes
pub fn unified(old_name: &str, new_name: &str, edits: &[Edit], context: usize) -> String {
    let hunks = hunks(edits, context);
    if hunks.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let _ = writeln!(out, "--- {}", old_name);
    let _ = writeln!(out, "+++ {}", new_name);
    for hunk in hunks {
        let _ = writeln!(out, "{}", hunk.header());
        for edit in &hunk.edits {
            let marker = match edit {
                Edit::Equal(_) => ' ',
                Edit::Delete(_) => '-',
                Edit::Insert(_) => '+',
            };
            let _ = writeln!(out, "{}{}", marker, edit.line());
        }
    }
    out
}
