//! Snapshot differ: turns consecutive scans into typed change events.
//!
//! Two matching strategies:
//! - **identifier-based** when every entry of both snapshots carries a unique
//!   [`FileId`]. A file keeps its id across a rename, so renames are exact.
//! - **content-based** otherwise. Unmatched deletions and additions whose
//!   fingerprints agree are paired into renames, each side used at most once.
//!   With several equal-content candidates the first in path order wins.
//!
//! When a file is renamed *and* modified within one cycle the two strategies
//! disagree: ids report a rename, content reports delete + add. Either way the
//! new path is reloaded from disk, so the index ends up the same.

#![allow(missing_docs)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::platform::file_id::{FileId, FileIdentity};
use crate::scanner::fingerprint::FingerprintedEntry;
use crate::scanner::snapshot::{ScanOptions, ScanOutcome, ScanWarning, Snapshot, scan};

/// One observed change between two scans. Paths are relative to the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChangeEvent {
    Added(PathBuf),
    Modified(PathBuf),
    Deleted(PathBuf),
    Renamed { new: PathBuf, old: PathBuf },
}

impl ChangeEvent {
    /// Path the event is reported under (the new path for renames).
    pub fn path(&self) -> &Path {
        match self {
            Self::Added(p) | Self::Modified(p) | Self::Deleted(p) => p,
            Self::Renamed { new, .. } => new,
        }
    }

    /// Path whose record must be dropped before anything is (re)loaded.
    pub fn removed_path(&self) -> Option<&Path> {
        match self {
            Self::Deleted(p) => Some(p),
            Self::Renamed { old, .. } => Some(old),
            Self::Added(_) | Self::Modified(_) => None,
        }
    }

    /// Path that must be (re)loaded from disk.
    pub fn loaded_path(&self) -> Option<&Path> {
        match self {
            Self::Added(p) | Self::Modified(p) => Some(p),
            Self::Renamed { new, .. } => Some(new),
            Self::Deleted(_) => None,
        }
    }

    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Added(_) => "added",
            Self::Modified(_) => "modified",
            Self::Deleted(_) => "deleted",
            Self::Renamed { .. } => "renamed",
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Deleted(_) => 0,
            Self::Renamed { .. } => 1,
            Self::Modified(_) => 2,
            Self::Added(_) => 3,
        }
    }
}

impl fmt::Display for ChangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(p) => write!(f, "[ADDED] {}", p.display()),
            Self::Modified(p) => write!(f, "[MODIFIED] {}", p.display()),
            Self::Deleted(p) => write!(f, "[DELETED] {}", p.display()),
            Self::Renamed { new, old } => {
                write!(f, "[RENAMED] {} -> {}", old.display(), new.display())
            }
        }
    }
}

/// Which strategy produced a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    Identifier,
    Content,
}

/// Compute the events that turn `previous` into `current`.
///
/// Events are ordered deletions, renames, modifications, additions; within a
/// kind by path.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<ChangeEvent> {
    diff_with_strategy(previous, current).0
}

/// Like [`diff_snapshots`], also reporting the strategy used.
pub fn diff_with_strategy(
    previous: &Snapshot,
    current: &Snapshot,
) -> (Vec<ChangeEvent>, MatchStrategy) {
    let (raw, strategy) = match (unique_ids(previous), unique_ids(current)) {
        (Some(prev_ids), Some(curr_ids)) => (
            diff_by_identifier(&prev_ids, &curr_ids),
            MatchStrategy::Identifier,
        ),
        _ => (diff_by_content(previous, current), MatchStrategy::Content),
    };
    (finish(raw), strategy)
}

/// Id → entry, or `None` if any entry lacks an id or ids collide.
fn unique_ids(snapshot: &Snapshot) -> Option<HashMap<FileId, &FingerprintedEntry>> {
    let mut ids = HashMap::with_capacity(snapshot.len());
    for entry in snapshot.iter() {
        let id = entry.file_id?;
        if ids.insert(id, entry).is_some() {
            return None;
        }
    }
    Some(ids)
}

fn diff_by_identifier(
    previous: &HashMap<FileId, &FingerprintedEntry>,
    current: &HashMap<FileId, &FingerprintedEntry>,
) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    for (id, now) in current {
        match previous.get(id) {
            None => events.push(ChangeEvent::Added(now.path.clone())),
            Some(before) if before.path != now.path => events.push(ChangeEvent::Renamed {
                new: now.path.clone(),
                old: before.path.clone(),
            }),
            Some(before) if before.metadata_differs(now) => {
                events.push(ChangeEvent::Modified(now.path.clone()));
            }
            Some(_) => {}
        }
    }
    for (id, before) in previous {
        if !current.contains_key(id) {
            events.push(ChangeEvent::Deleted(before.path.clone()));
        }
    }
    events
}

fn diff_by_content(previous: &Snapshot, current: &Snapshot) -> Vec<ChangeEvent> {
    let mut events = Vec::new();
    let mut added: Vec<&FingerprintedEntry> = Vec::new();
    let mut deleted: Vec<&FingerprintedEntry> = Vec::new();

    for now in current.iter() {
        match previous.get(&now.path) {
            None => added.push(now),
            Some(before) if before.metadata_differs(now) => {
                events.push(ChangeEvent::Modified(now.path.clone()));
            }
            Some(_) => {}
        }
    }
    for before in previous.iter() {
        if !current.contains(&before.path) {
            deleted.push(before);
        }
    }

    let mut consumed = vec![false; added.len()];
    for before in deleted {
        let partner = added
            .iter()
            .enumerate()
            .find(|(i, now)| !consumed[*i] && before.same_content(now))
            .map(|(i, _)| i);
        match partner {
            Some(i) => {
                consumed[i] = true;
                events.push(ChangeEvent::Renamed {
                    new: added[i].path.clone(),
                    old: before.path.clone(),
                });
            }
            None => events.push(ChangeEvent::Deleted(before.path.clone())),
        }
    }
    for (i, now) in added.into_iter().enumerate() {
        if !consumed[i] {
            events.push(ChangeEvent::Added(now.path.clone()));
        }
    }
    events
}

/// Collapse delete+add of one path into a modification, then sort.
fn finish(raw: Vec<ChangeEvent>) -> Vec<ChangeEvent> {
    let added: HashSet<PathBuf> = raw
        .iter()
        .filter_map(|e| match e {
            ChangeEvent::Added(p) => Some(p.clone()),
            _ => None,
        })
        .collect();
    let replaced: BTreeSet<PathBuf> = raw
        .iter()
        .filter_map(|e| match e {
            ChangeEvent::Deleted(p) if added.contains(p) => Some(p.clone()),
            _ => None,
        })
        .collect();

    let mut events: Vec<ChangeEvent> = raw
        .into_iter()
        .filter(|e| match e {
            ChangeEvent::Added(p) | ChangeEvent::Deleted(p) => !replaced.contains(p),
            _ => true,
        })
        .collect();
    events.extend(replaced.into_iter().map(ChangeEvent::Modified));
    events.sort_by(|a, b| a.rank().cmp(&b.rank()).then_with(|| a.path().cmp(b.path())));
    events
}

/// Result of one poll of a [`DirectoryDiffer`].
#[derive(Debug, Clone, Default)]
pub struct DiffOutcome {
    pub events: Vec<ChangeEvent>,
    pub warnings: Vec<ScanWarning>,
}

/// Stateful differ: remembers the previous scan of one root.
pub struct DirectoryDiffer {
    options: ScanOptions,
    identity: Arc<dyn FileIdentity>,
    previous: Snapshot,
}

impl DirectoryDiffer {
    /// A differ with an empty baseline; the first poll reports every file
    /// as added unless [`reset`](Self::reset) is called first.
    pub fn new(options: ScanOptions, identity: Arc<dyn FileIdentity>) -> Self {
        Self {
            options,
            identity,
            previous: Snapshot::new(),
        }
    }

    /// Scan, diff against the previous scan, and keep the new scan.
    pub fn poll(&mut self) -> DiffOutcome {
        let ScanOutcome { snapshot, warnings } = scan(&self.options, self.identity.as_ref());
        let events = self.diff_against(snapshot);
        DiffOutcome { events, warnings }
    }

    /// Diff an externally produced snapshot and adopt it as the baseline.
    pub fn diff_against(&mut self, current: Snapshot) -> Vec<ChangeEvent> {
        let events = diff_snapshots(&self.previous, &current);
        self.previous = current;
        events
    }

    /// Re-baseline from a fresh scan without producing events.
    ///
    /// The scan is returned so callers can bulk-load from the same view.
    pub fn reset(&mut self) -> ScanOutcome {
        let outcome = scan(&self.options, self.identity.as_ref());
        self.previous = outcome.snapshot.clone();
        outcome
    }

    /// Number of entries in the current baseline.
    pub fn tracked_count(&self) -> usize {
        self.previous.len()
    }
}

impl fmt::Debug for DirectoryDiffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectoryDiffer")
            .field("root", &self.options.root)
            .field("identity", &self.identity.name())
            .field("tracked", &self.previous.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::file_id::NoFileIdentity;
    use crate::scanner::fingerprint::{Fingerprint, FingerprintPolicy};
    use std::fs;
    use std::time::{Duration, SystemTime};

    fn entry(path: &str, content: u8, id: Option<u64>) -> FingerprintedEntry {
        FingerprintedEntry {
            path: PathBuf::from(path),
            modified: SystemTime::UNIX_EPOCH + Duration::from_secs(1_000),
            size: 12,
            is_dir: false,
            fingerprint: Some(Fingerprint([content; 32])),
            file_id: id.map(|inode| FileId { device: 1, inode }),
        }
    }

    fn snap(entries: Vec<FingerprintedEntry>) -> Snapshot {
        entries.into_iter().collect()
    }

    fn p(s: &str) -> PathBuf {
        PathBuf::from(s)
    }

    #[test]
    fn content_rename_is_detected() {
        let before = snap(vec![entry("A.cus", 7, None)]);
        let after = snap(vec![entry("B.cus", 7, None)]);
        let (events, strategy) = diff_with_strategy(&before, &after);
        assert_eq!(strategy, MatchStrategy::Content);
        assert_eq!(
            events,
            vec![ChangeEvent::Renamed {
                new: p("B.cus"),
                old: p("A.cus")
            }]
        );
    }

    #[test]
    fn identifier_rename_survives_content_change() {
        let before = snap(vec![entry("A.cus", 7, Some(10))]);
        let after = snap(vec![entry("B.cus", 8, Some(10))]);
        let (events, strategy) = diff_with_strategy(&before, &after);
        assert_eq!(strategy, MatchStrategy::Identifier);
        assert_eq!(
            events,
            vec![ChangeEvent::Renamed {
                new: p("B.cus"),
                old: p("A.cus")
            }]
        );
    }

    #[test]
    fn content_strategy_splits_modified_rename() {
        let before = snap(vec![entry("A.cus", 7, None)]);
        let after = snap(vec![entry("B.cus", 8, None)]);
        assert_eq!(
            diff_snapshots(&before, &after),
            vec![ChangeEvent::Deleted(p("A.cus")), ChangeEvent::Added(p("B.cus"))]
        );
    }

    #[test]
    fn missing_id_falls_back_to_content() {
        let before = snap(vec![entry("A.cus", 7, Some(1)), entry("C.cus", 9, None)]);
        let after = snap(vec![entry("B.cus", 7, Some(1)), entry("C.cus", 9, None)]);
        let (events, strategy) = diff_with_strategy(&before, &after);
        assert_eq!(strategy, MatchStrategy::Content);
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn duplicate_ids_fall_back_to_content() {
        let before = snap(vec![entry("A.cus", 1, Some(5)), entry("B.cus", 2, Some(5))]);
        let (_, strategy) = diff_with_strategy(&before, &before);
        assert_eq!(strategy, MatchStrategy::Content);
    }

    #[test]
    fn add_modify_delete_by_identifier() {
        let before = snap(vec![entry("keep.cus", 1, Some(1)), entry("gone.cus", 2, Some(2))]);
        let mut changed = entry("keep.cus", 3, Some(1));
        changed.modified += Duration::from_secs(5);
        let after = snap(vec![changed, entry("new.cus", 4, Some(3))]);
        assert_eq!(
            diff_snapshots(&before, &after),
            vec![
                ChangeEvent::Deleted(p("gone.cus")),
                ChangeEvent::Modified(p("keep.cus")),
                ChangeEvent::Added(p("new.cus")),
            ]
        );
    }

    #[test]
    fn replacement_with_new_identifier_is_a_modification() {
        let before = snap(vec![entry("a.cus", 1, Some(1))]);
        let after = snap(vec![entry("a.cus", 2, Some(2))]);
        assert_eq!(
            diff_snapshots(&before, &after),
            vec![ChangeEvent::Modified(p("a.cus"))]
        );
    }

    #[test]
    fn equal_content_candidates_each_pair_once() {
        let before = snap(vec![entry("a.cus", 7, None), entry("b.cus", 7, None)]);
        let after = snap(vec![entry("c.cus", 7, None), entry("d.cus", 7, None)]);
        let events = diff_snapshots(&before, &after);
        assert_eq!(events.len(), 2);
        let news: HashSet<_> = events
            .iter()
            .filter_map(|e| match e {
                ChangeEvent::Renamed { new, .. } => Some(new.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(news.len(), 2);
    }

    #[test]
    fn unhashed_entries_never_pair() {
        let mut a = entry("a.cus", 7, None);
        a.fingerprint = None;
        let mut b = entry("b.cus", 7, None);
        b.fingerprint = None;
        let events = diff_snapshots(&snap(vec![a]), &snap(vec![b]));
        assert_eq!(
            events,
            vec![ChangeEvent::Deleted(p("a.cus")), ChangeEvent::Added(p("b.cus"))]
        );
    }

    #[test]
    fn identical_snapshots_produce_nothing() {
        let s = snap(vec![entry("a.cus", 1, Some(1)), entry("b.cus", 2, Some(2))]);
        assert!(diff_snapshots(&s, &s).is_empty());
    }

    #[test]
    fn display_formats() {
        assert_eq!(ChangeEvent::Added(p("x.cus")).to_string(), "[ADDED] x.cus");
        assert_eq!(
            ChangeEvent::Renamed {
                new: p("b.cus"),
                old: p("a.cus")
            }
            .to_string(),
            "[RENAMED] a.cus -> b.cus"
        );
    }

    #[test]
    fn event_paths_for_application() {
        let rename = ChangeEvent::Renamed {
            new: p("b.cus"),
            old: p("a.cus"),
        };
        assert_eq!(rename.removed_path(), Some(Path::new("a.cus")));
        assert_eq!(rename.loaded_path(), Some(Path::new("b.cus")));
        assert_eq!(ChangeEvent::Deleted(p("a.cus")).loaded_path(), None);
        assert_eq!(ChangeEvent::Added(p("a.cus")).removed_path(), None);
    }

    #[test]
    fn stateful_differ_tracks_disk() {
        let dir = tempfile::tempdir().unwrap();
        let options = ScanOptions {
            root: dir.path().to_path_buf(),
            recursive: true,
            extension: "cus".to_string(),
            policy: FingerprintPolicy::default(),
        };
        let mut differ = DirectoryDiffer::new(options, Arc::new(NoFileIdentity));

        fs::write(dir.path().join("a.cus"), b"HEADER..USA-1").unwrap();
        let baseline = differ.reset();
        assert_eq!(baseline.snapshot.len(), 1);
        assert_eq!(differ.tracked_count(), 1);
        assert!(differ.poll().events.is_empty());

        fs::rename(dir.path().join("a.cus"), dir.path().join("b.cus")).unwrap();
        let outcome = differ.poll();
        assert_eq!(
            outcome.events,
            vec![ChangeEvent::Renamed {
                new: p("b.cus"),
                old: p("a.cus")
            }]
        );

        fs::remove_file(dir.path().join("b.cus")).unwrap();
        assert_eq!(differ.poll().events, vec![ChangeEvent::Deleted(p("b.cus"))]);
        assert_eq!(differ.tracked_count(), 0);
    }

    #[test]
    fn modification_detected_via_mtime_bump() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.cus");
        fs::write(&path, b"HEADER..USA-1").unwrap();
        let options = ScanOptions {
            root: dir.path().to_path_buf(),
            recursive: true,
            extension: "cus".to_string(),
            policy: FingerprintPolicy::default(),
        };
        let mut differ = DirectoryDiffer::new(options, crate::platform::file_id::detect_identity());
        differ.reset();

        fs::write(&path, b"HEADER..KOR-1").unwrap();
        filetime::set_file_mtime(&path, filetime::FileTime::from_unix_time(2_000_000_000, 0))
            .unwrap();
        assert_eq!(differ.poll().events, vec![ChangeEvent::Modified(p("a.cus"))]);
    }
}
