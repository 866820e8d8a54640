//! Directory scan into a path-keyed snapshot of fingerprinted entries.
//!
//! A scan never aborts on a single bad entry: per-entry failures become
//! warnings and the entry is left out. If the root itself cannot be listed the
//! (empty) partial snapshot is returned with a warning.

#![allow(missing_docs)]

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::paths::{has_extension, relative_key};
use crate::platform::file_id::FileIdentity;
use crate::scanner::fingerprint::{FingerprintPolicy, FingerprintedEntry};

/// What to scan.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    pub root: PathBuf,
    pub recursive: bool,
    /// Extension without the leading dot.
    pub extension: String,
    pub policy: FingerprintPolicy,
}

impl ScanOptions {
    /// Whether `path` names a candidate record file.
    pub fn matches(&self, path: &Path) -> bool {
        has_extension(path, &self.extension)
    }
}

/// A non-fatal problem encountered during a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanWarning {
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Mapping of relative path to entry. Ordered so diffs are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    entries: BTreeMap<PathBuf, FingerprintedEntry>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: FingerprintedEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn get(&self, path: &Path) -> Option<&FingerprintedEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FingerprintedEntry> {
        self.entries.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }
}

impl FromIterator<FingerprintedEntry> for Snapshot {
    fn from_iter<I: IntoIterator<Item = FingerprintedEntry>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for entry in iter {
            snapshot.insert(entry);
        }
        snapshot
    }
}

/// Result of one scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOutcome {
    pub snapshot: Snapshot,
    pub warnings: Vec<ScanWarning>,
}

/// Walk `options.root` and fingerprint every matching regular file.
///
/// Symlinked directories are not followed.
pub fn scan(options: &ScanOptions, identity: &dyn FileIdentity) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut pending = vec![options.root.clone()];

    while let Some(dir) = pending.pop() {
        let read_dir = match fs::read_dir(&dir) {
            Ok(rd) => rd,
            Err(err) => {
                outcome.warnings.push(ScanWarning {
                    path: dir,
                    message: format!("cannot list directory: {err}"),
                });
                continue;
            }
        };

        for item in read_dir {
            let item = match item {
                Ok(item) => item,
                Err(err) => {
                    outcome.warnings.push(ScanWarning {
                        path: dir.clone(),
                        message: format!("directory iteration failed: {err}"),
                    });
                    break;
                }
            };
            let path = item.path();
            let Ok(file_type) = item.file_type() else {
                outcome.warnings.push(ScanWarning {
                    path,
                    message: "cannot determine file type".to_string(),
                });
                continue;
            };

            if file_type.is_dir() {
                if options.recursive {
                    pending.push(path);
                }
                continue;
            }
            if !options.matches(&path) {
                continue;
            }

            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    outcome.warnings.push(ScanWarning {
                        path,
                        message: format!("cannot stat: {err}"),
                    });
                    continue;
                }
            };
            if !meta.is_file() {
                continue;
            }

            let fingerprint = match options.policy.hash_file(&path) {
                Ok(fp) => Some(fp),
                Err(err) => {
                    outcome.warnings.push(ScanWarning {
                        path: path.clone(),
                        message: format!("fingerprint unavailable: {err}"),
                    });
                    None
                }
            };
            let key = relative_key(&options.root, &path);
            outcome.snapshot.insert(FingerprintedEntry::from_metadata(
                key,
                &meta,
                fingerprint,
                identity.id_from_metadata(&meta),
            ));
        }
    }

    outcome
}
