//! The region-partitioned record index and its disk operations.
//!
//! Invariants kept by every mutation:
//! - a key lives in at most one place: one region bucket, or the rejected list;
//! - buckets hold only valid records at least
//!   [`MIN_RECORD_LEN`](crate::store::region::MIN_RECORD_LEN) bytes long;
//! - a bucket exists for every allowed region, in configured order.

#![allow(missing_docs)]

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::{Result, SyncError};
use crate::core::paths::{has_extension, relative_key};
use crate::store::record::{Record, RecordView};
use crate::store::region::{RegionCode, RegionSet};

/// Notified around every persist write so the synchronizer can recognise
/// its own writes when they come back as change events.
pub trait WriteObserver {
    fn before_write(&self, key: &Path);
    fn write_failed(&self, key: &Path);
}

/// Observer for one-shot use where nothing is watching.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWriteObserver;

impl WriteObserver for NoWriteObserver {
    fn before_write(&self, _key: &Path) {}
    fn write_failed(&self, _key: &Path) {}
}

/// Where records live on disk and which regions are legal.
#[derive(Debug, Clone)]
pub struct StoreLayout {
    root: PathBuf,
    extension: String,
    allowed: RegionSet,
}

impl StoreLayout {
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>, allowed: RegionSet) -> Self {
        Self {
            root: root.into(),
            extension: extension.into(),
            allowed,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub const fn allowed(&self) -> &RegionSet {
        &self.allowed
    }

    pub fn key(&self, absolute: &Path) -> PathBuf {
        relative_key(&self.root, absolute)
    }

    pub fn absolute(&self, key: &Path) -> PathBuf {
        self.root.join(key)
    }

    pub fn matches(&self, path: &Path) -> bool {
        has_extension(path, &self.extension)
    }
}

/// What applying a load did.
#[derive(Debug)]
pub enum LoadOutcome {
    Ignored,
    Indexed { key: PathBuf, region: RegionCode },
    Rejected { key: PathBuf, region: RegionCode },
    TooSmall { key: PathBuf, len: usize },
    Unreadable { key: PathBuf, error: SyncError },
}

/// Tally of a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub indexed: usize,
    pub rejected: usize,
    pub skipped: usize,
}

impl LoadSummary {
    pub fn record(&mut self, outcome: &LoadOutcome) {
        match outcome {
            LoadOutcome::Indexed { .. } => self.indexed += 1,
            LoadOutcome::Rejected { .. } => self.rejected += 1,
            LoadOutcome::TooSmall { .. } | LoadOutcome::Unreadable { .. } => self.skipped += 1,
            LoadOutcome::Ignored => {}
        }
    }
}

/// One failed persist write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PersistFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of a region conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionReport {
    pub target: String,
    /// Records moved into the target bucket by this call.
    pub converted: usize,
    /// Files written, including retries of earlier failed writes.
    pub persisted: usize,
    pub skipped_missing: usize,
    pub skipped_too_small: usize,
    pub failures: Vec<PersistFailure>,
}

impl ConversionReport {
    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }

    /// The aggregated failure, if any write failed.
    pub fn error(&self) -> Option<SyncError> {
        (!self.succeeded()).then(|| SyncError::PersistFailed {
            failed: self.failures.len(),
            attempted: self.persisted + self.failures.len(),
        })
    }
}

#[derive(Debug, Clone)]
struct Bucket {
    region: RegionCode,
    records: Vec<Record>,
}

/// Canonical region → records index.
#[derive(Debug, Clone)]
pub struct RegionStore {
    layout: StoreLayout,
    buckets: Vec<Bucket>,
    rejected: Vec<Record>,
}

impl RegionStore {
    pub fn new(layout: StoreLayout) -> Self {
        let buckets = layout
            .allowed
            .iter()
            .map(|region| Bucket {
                region: *region,
                records: Vec::new(),
            })
            .collect();
        Self {
            layout,
            buckets,
            rejected: Vec::new(),
        }
    }

    pub const fn layout(&self) -> &StoreLayout {
        &self.layout
    }

    /// Read one file and index it. Callers hold the store lock, so the read
    /// never overlaps a persist of the same file.
    ///
    /// Whatever the outcome, any previous record under the key is gone
    /// afterwards unless it was replaced.
    pub fn load(&mut self, absolute: &Path) -> LoadOutcome {
        if !self.layout.matches(absolute) {
            return LoadOutcome::Ignored;
        }
        let key = self.layout.key(absolute);
        let bytes = match fs::read(absolute) {
            Ok(bytes) => bytes,
            Err(source) => {
                self.remove_key(&key);
                return LoadOutcome::Unreadable {
                    key,
                    error: SyncError::io(absolute, source),
                };
            }
        };

        self.remove_key(&key);
        match Record::decode(key.clone(), bytes, &self.layout.allowed) {
            Err(SyncError::RecordTooSmall { len, .. }) => LoadOutcome::TooSmall { key, len },
            Err(error) => LoadOutcome::Unreadable { key, error },
            Ok(record) if record.invalid => {
                let region = record.region;
                self.rejected.push(record);
                LoadOutcome::Rejected { key, region }
            }
            Ok(record) => {
                let region = record.region;
                match self.bucket_mut(region) {
                    Some(bucket) => bucket.records.push(record),
                    None => self.rejected.push(record),
                }
                LoadOutcome::Indexed { key, region }
            }
        }
    }

    /// Drop whatever is indexed for `absolute`. Returns whether anything was.
    pub fn remove(&mut self, absolute: &Path) -> bool {
        let key = self.layout.key(absolute);
        self.remove_key(&key)
    }

    pub fn remove_key(&mut self, key: &Path) -> bool {
        let mut removed = false;
        for bucket in &mut self.buckets {
            let before = bucket.records.len();
            bucket.records.retain(|r| r.path != key);
            removed |= bucket.records.len() != before;
        }
        let before = self.rejected.len();
        self.rejected.retain(|r| r.path != key);
        removed | (self.rejected.len() != before)
    }

    pub fn clear(&mut self) {
        for bucket in &mut self.buckets {
            bucket.records.clear();
        }
        self.rejected.clear();
    }

    /// Move every eligible record into `target` and persist the changes.
    ///
    /// Fails without side effects only when `target` is not an allowed
    /// 3-character code. Write failures are collected in the report; the
    /// affected records keep their new region in memory and stay dirty, so
    /// the next conversion retries them.
    pub fn convert_files_to_region(
        &mut self,
        target: &str,
        observer: &dyn WriteObserver,
    ) -> Result<ConversionReport> {
        let target_code = self.layout.allowed.resolve(target)?;
        let mut report = ConversionReport {
            target: target_code.to_string(),
            ..ConversionReport::default()
        };

        // Pass 1: pick eligible records out of every other bucket.
        let mut moving: Vec<Record> = Vec::new();
        for bucket in self.buckets.iter_mut().filter(|b| b.region != target_code) {
            let (eligible, stay): (Vec<Record>, Vec<Record>) = bucket
                .records
                .drain(..)
                .partition(Record::is_convertible);
            for record in &stay {
                eprintln!(
                    "[CUS-STORE] skipping {}: {} bytes is below the region field",
                    record.path.display(),
                    record.len()
                );
            }
            report.skipped_too_small += stay.len();
            bucket.records = stay;
            moving.extend(eligible);
        }

        // Pass 2: rewrite and move.
        if let Some(dest) = self.bucket_mut(target_code) {
            for mut record in moving {
                record.rewrite_region(target_code);
                dest.records.push(record);
                report.converted += 1;
            }
        }

        self.persist_dirty(observer, &mut report);
        Ok(report)
    }

    fn persist_dirty(&mut self, observer: &dyn WriteObserver, report: &mut ConversionReport) {
        let root = self.layout.root.clone();
        for record in self.buckets.iter_mut().flat_map(|b| b.records.iter_mut()) {
            if !record.dirty {
                continue;
            }
            let absolute = root.join(&record.path);
            let permissions = match fs::metadata(&absolute) {
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    eprintln!(
                        "[CUS-STORE] {} vanished before persist, skipping",
                        record.path.display()
                    );
                    record.dirty = false;
                    report.skipped_missing += 1;
                    continue;
                }
                Err(_) => None,
                Ok(meta) => Some(meta.permissions()),
            };

            observer.before_write(&record.path);
            match replace_file(&absolute, &record.bytes, permissions) {
                Ok(()) => {
                    record.dirty = false;
                    report.persisted += 1;
                }
                Err(source) => {
                    observer.write_failed(&record.path);
                    let error = SyncError::io(&absolute, source);
                    eprintln!("[CUS-STORE] persist failed: {error}");
                    report.failures.push(PersistFailure {
                        path: record.path.clone(),
                        error: error.to_string(),
                    });
                }
            }
        }
    }

    /// Records not in `region`, in configured region order then insertion
    /// order, followed by rejected records.
    pub fn unconverted_view(&self, region: RegionCode) -> Vec<RecordView> {
        self.buckets
            .iter()
            .filter(|b| b.region != region)
            .flat_map(|b| b.records.iter())
            .chain(self.rejected.iter())
            .map(Record::view)
            .collect()
    }

    /// Every record, valid ones first.
    pub fn all_records(&self) -> impl Iterator<Item = &Record> {
        self.buckets
            .iter()
            .flat_map(|b| b.records.iter())
            .chain(self.rejected.iter())
    }

    pub fn bucket(&self, region: RegionCode) -> &[Record] {
        self.buckets
            .iter()
            .find(|b| b.region == region)
            .map(|b| b.records.as_slice())
            .unwrap_or_default()
    }

    pub fn rejected(&self) -> &[Record] {
        &self.rejected
    }

    pub fn get(&self, key: &Path) -> Option<&Record> {
        self.all_records().find(|r| r.path == key)
    }

    /// Region bucket holding `key`, if any.
    pub fn region_of(&self, key: &Path) -> Option<RegionCode> {
        self.buckets
            .iter()
            .find(|b| b.records.iter().any(|r| r.path == key))
            .map(|b| b.region)
    }

    /// Per-region record counts in configured order.
    pub fn counts(&self) -> Vec<(RegionCode, usize)> {
        self.buckets
            .iter()
            .map(|b| (b.region, b.records.len()))
            .collect()
    }

    /// Number of indexed (valid) records.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.records.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0 && self.rejected.is_empty()
    }

    fn bucket_mut(&mut self, region: RegionCode) -> Option<&mut Bucket> {
        self.buckets.iter_mut().find(|b| b.region == region)
    }
}

/// Sibling path a persist writes to before renaming over `absolute`. The
/// suffix keeps it from matching the record extension.
fn staging_path(absolute: &Path) -> PathBuf {
    let name = absolute
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    absolute.with_file_name(format!(".{name}.cusync-tmp"))
}

/// Replace `absolute` in one step so readers see either the old bytes or
/// the new ones, never a truncated file.
fn replace_file(
    absolute: &Path,
    bytes: &[u8],
    permissions: Option<fs::Permissions>,
) -> std::io::Result<()> {
    let staging = staging_path(absolute);
    let result = fs::write(&staging, bytes)
        .and_then(|()| match permissions {
            Some(perms) => fs::set_permissions(&staging, perms),
            None => Ok(()),
        })
        .and_then(|()| fs::rename(&staging, absolute));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}
