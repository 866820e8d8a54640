//! Paths recently written by the store, so their echo is not re-applied.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::scanner::differ::ChangeEvent;
use crate::store::WriteObserver;

/// One-shot suppression entries keyed by relative path.
///
/// Writing the same path twice before the watcher notices leaves a single
/// entry, matching the single change the next scan will report.
#[derive(Debug, Default)]
pub struct SuppressionSet {
    paths: Mutex<HashSet<PathBuf>>,
}

impl SuppressionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &Path) {
        self.paths.lock().insert(key.to_path_buf());
    }

    /// Remove the entry for `key`, reporting whether there was one.
    pub fn consume(&self, key: &Path) -> bool {
        self.paths.lock().remove(key)
    }

    /// Whether `event` is the echo of one of our writes. Consumes the entry.
    ///
    /// Persisting only ever overwrites an existing file, so only
    /// modifications (and additions, for an atomic-replace write) can be
    /// echoes. A deletion or rename of a suppressed path still clears the
    /// entry but is never swallowed.
    pub fn filter(&self, event: &ChangeEvent) -> bool {
        match event {
            ChangeEvent::Modified(p) | ChangeEvent::Added(p) => self.consume(p),
            ChangeEvent::Deleted(p) => {
                self.consume(p);
                false
            }
            ChangeEvent::Renamed { old, .. } => {
                self.consume(old);
                false
            }
        }
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.paths.lock().contains(key)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }

    pub fn clear(&self) {
        self.paths.lock().clear();
    }
}

impl WriteObserver for SuppressionSet {
    fn before_write(&self, key: &Path) {
        self.insert(key);
    }

    fn write_failed(&self, key: &Path) {
        self.consume(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn suppresses_exactly_once() {
        let set = SuppressionSet::new();
        set.insert(Path::new("a.cus"));
        assert!(set.filter(&ChangeEvent::Modified(p("a.cus"))));
        assert!(!set.filter(&ChangeEvent::Modified(p("a.cus"))));
        assert!(set.is_empty());
    }

    #[test]
    fn repeated_writes_leave_one_entry() {
        let set = SuppressionSet::new();
        set.before_write(Path::new("a.cus"));
        set.before_write(Path::new("a.cus"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn failed_write_withdraws_entry() {
        let set = SuppressionSet::new();
        set.before_write(Path::new("a.cus"));
        set.write_failed(Path::new("a.cus"));
        assert!(!set.contains(Path::new("a.cus")));
    }

    #[test]
    fn deletions_are_never_swallowed() {
        let set = SuppressionSet::new();
        set.insert(Path::new("a.cus"));
        assert!(!set.filter(&ChangeEvent::Deleted(p("a.cus"))));
        assert!(set.is_empty());

        set.insert(Path::new("b.cus"));
        assert!(!set.filter(&ChangeEvent::Renamed {
            new: p("c.cus"),
            old: p("b.cus")
        }));
        assert!(set.is_empty());
    }

    #[test]
    fn unrelated_paths_pass_through() {
        let set = SuppressionSet::new();
        set.insert(Path::new("a.cus"));
        assert!(!set.filter(&ChangeEvent::Modified(p("b.cus"))));
        assert!(set.contains(Path::new("a.cus")));
    }
}
