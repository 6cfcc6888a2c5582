//! Line differ backed by the `similar` crate.

use std::time::Duration;

use similar::{Algorithm, ChangeTag, TextDiff};

use crate::diff::{Edit, LineDiff};

/// Line differ over `similar`'s linear-space algorithms.
#[derive(Debug, Clone, Copy)]
pub struct SimilarDiff {
    algorithm: Algorithm,
    timeout: Option<Duration>,
}

impl Default for SimilarDiff {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Myers,
            timeout: None,
        }
    }
}

impl SimilarDiff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// give up on a minimal script after `timeout`; the result stays valid
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl LineDiff for SimilarDiff {
    fn diff(&self, old: &[&str], new: &[&str]) -> Vec<Edit> {
        let mut config = TextDiff::configure();
        config.algorithm(self.algorithm);
        if let Some(timeout) = self.timeout {
            config.timeout(timeout);
        }

        let diff = config.diff_slices(old, new);
        diff.iter_all_changes()
            .map(|change| {
                let line = change.value().to_string();
                match change.tag() {
                    ChangeTag::Equal => Edit::Equal(line),
                    ChangeTag::Delete => Edit::Delete(line),
                    ChangeTag::Insert => Edit::Insert(line),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::DiffStat;

    fn diff(old: &[&str], new: &[&str]) -> Vec<Edit> {
        SimilarDiff::new().diff(old, new)
    }

    /// replaying the script must rebuild both sides
    fn check_script(old: &[&str], new: &[&str]) {
        let edits = diff(old, new);
        let rebuilt_old: Vec<&str> = edits
            .iter()
            .filter(|e| !matches!(e, Edit::Insert(_)))
            .map(Edit::line)
            .collect();
        let rebuilt_new: Vec<&str> = edits
            .iter()
            .filter(|e| !matches!(e, Edit::Delete(_)))
            .map(Edit::line)
            .collect();
        assert_eq!(rebuilt_old, old);
        assert_eq!(rebuilt_new, new);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(diff(&[], &[]).is_empty());
        assert_eq!(diff(&[], &["a"]), vec![Edit::Insert("a".into())]);
        assert_eq!(diff(&["a"], &[]), vec![Edit::Delete("a".into())]);
    }

    #[test]
    fn test_single_line_change() {
        assert_eq!(
            diff(&["hello"], &["hello world"]),
            vec![
                Edit::Delete("hello".into()),
                Edit::Insert("hello world".into())
            ]
        );
    }

    #[test]
    fn test_scripts_rebuild_inputs() {
        check_script(&["A", "B", "C", "A", "B", "B", "A"], &["C", "B", "A", "B", "A", "C"]);
        check_script(&["x", "a", "b", "c"], &["a", "b", "y", "c", "z"]);
        check_script(&["same", "same", "same"], &["same"]);
    }

    #[test]
    fn test_patience_algorithm() {
        let differ = SimilarDiff::new().algorithm(Algorithm::Patience);
        let edits = differ.diff(&["a", "b", "c"], &["a", "c"]);
        assert_eq!(DiffStat::of(&edits), DiffStat { insertions: 0, deletions: 1 });
    }

    #[test]
    fn test_full_rewrite_of_large_file() {
        let old: Vec<String> = (0..5000).map(|i| format!("old line {}", i)).collect();
        let new: Vec<String> = (0..5000).map(|i| format!("new line {}", i)).collect();
        let old: Vec<&str> = old.iter().map(String::as_str).collect();
        let new: Vec<&str> = new.iter().map(String::as_str).collect();

        let edits = SimilarDiff::new()
            .timeout(Duration::from_secs(1))
            .diff(&old, &new);
        assert_eq!(
            DiffStat::of(&edits),
            DiffStat { insertions: 5000, deletions: 5000 }
        );
    }
}
