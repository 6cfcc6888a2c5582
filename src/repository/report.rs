//! Values returned by repository operations.

use serde::Serialize;

use crate::diff::{unified, DiffStat, Edit};
use crate::storage::{Commit, Digest, RepoPath};

/// Working-tree state relative to the tracking table.
///
/// The three lists are sorted and pairwise disjoint. A staged file is only
/// ever listed as staged, even if it changed again after `add`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    /// tracked with `staged = true`
    pub staged: Vec<RepoPath>,
    /// tracked, not staged, present on disk with a different digest
    pub modified: Vec<RepoPath>,
    /// present on disk and never added
    pub untracked: Vec<RepoPath>,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.modified.is_empty() && self.untracked.is_empty()
    }
}

/// Line diff between a tracked file's last stored content and its current
/// content on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: RepoPath,
    /// digest recorded at the last `add` or checkout
    pub old_hash: Digest,
    /// digest of the file as it is now
    pub new_hash: Digest,
    pub stat: DiffStat,
    pub edits: Vec<Edit>,
}

impl FileDiff {
    pub(crate) fn new(path: RepoPath, old_hash: Digest, new_hash: Digest, edits: Vec<Edit>) -> Self {
        Self {
            stat: DiffStat::of(&edits),
            path,
            old_hash,
            new_hash,
            edits,
        }
    }

    pub fn has_changes(&self) -> bool {
        !self.stat.is_empty()
    }

    /// unified text with `a/` and `b/` headers
    pub fn render(&self, context: usize) -> String {
        unified(
            &format!("a/{}", self.path),
            &format!("b/{}", self.path),
            &self.edits,
            context,
        )
    }
}

/// Result of restoring a commit into the working tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutReport {
    pub commit: Commit,
    /// paths written, in path order
    pub restored: Vec<RepoPath>,
}
