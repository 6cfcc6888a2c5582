//! Line-oriented diffing.
//!
//! The repository only needs an edit script between two sequences of
//! lines; anything implementing [`LineDiff`] can produce it. [`SimilarDiff`]
//! is the default and delegates to the `similar` crate. [`hunks`] and
//! [`unified`] turn a script into the familiar unified format for display.

mod engine;
mod render;

use serde::Serialize;

pub use engine::SimilarDiff;
pub use render::{hunks, unified, Hunk, DEFAULT_CONTEXT};

/// One step of an edit script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", content = "line", rename_all = "lowercase")]
pub enum Edit {
    /// line present on both sides
    Equal(String),
    /// line only in the old sequence
    Delete(String),
    /// line only in the new sequence
    Insert(String),
}

impl Edit {
    pub fn line(&self) -> &str {
        match self {
            Edit::Equal(line) | Edit::Delete(line) | Edit::Insert(line) => line,
        }
    }

    pub fn is_change(&self) -> bool {
        !matches!(self, Edit::Equal(_))
    }
}

/// Produces an edit script turning `old` into `new`.
pub trait LineDiff {
    fn diff(&self, old: &[&str], new: &[&str]) -> Vec<Edit>;
}

/// Insertion and deletion counts of an edit script.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffStat {
    pub insertions: usize,
    pub deletions: usize,
}

impl DiffStat {
    pub fn of(edits: &[Edit]) -> Self {
        edits.iter().fold(Self::default(), |mut stat, edit| {
            match edit {
                Edit::Insert(_) => stat.insertions += 1,
                Edit::Delete(_) => stat.deletions += 1,
                Edit::Equal(_) => {}
            }
            stat
        })
    }

    pub fn is_empty(&self) -> bool {
        self.insertions == 0 && self.deletions == 0
    }
}

/// diff two texts line by line
pub fn diff_text(differ: &dyn LineDiff, old: &str, new: &str) -> Vec<Edit> {
    let old: Vec<&str> = old.lines().collect();
    let new: Vec<&str> = new.lines().collect();
    differ.diff(&old, &new)
}
