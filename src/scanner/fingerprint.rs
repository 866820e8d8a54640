//! Fingerprinted entries: the per-file metadata the differ compares.

#![allow(missing_docs)]

use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use sha2::{Digest, Sha256};

use crate::core::config::FingerprintConfig;
use crate::core::errors::{Result, SyncError};
use crate::platform::file_id::FileId;

/// SHA-256 content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub [u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// How much of a file feeds its fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FingerprintPolicy {
    pub full_hash_max_bytes: u64,
    pub sample_bytes: u64,
}

impl Default for FingerprintPolicy {
    fn default() -> Self {
        Self::from(&FingerprintConfig::default())
    }
}

impl From<&FingerprintConfig> for FingerprintPolicy {
    fn from(cfg: &FingerprintConfig) -> Self {
        Self {
            full_hash_max_bytes: cfg.full_hash_max_bytes,
            sample_bytes: cfg.sample_bytes,
        }
    }
}

impl FingerprintPolicy {
    /// Hash a file. Small files are hashed whole; large files hash their
    /// length, head and tail.
    pub fn hash_file(&self, path: &Path) -> Result<Fingerprint> {
        let mut file = File::open(path).map_err(|source| SyncError::io(path, source))?;
        let len = file
            .metadata()
            .map_err(|source| SyncError::io(path, source))?
            .len();

        let mut hasher = Sha256::new();
        if len <= self.full_hash_max_bytes {
            let mut buf = Vec::with_capacity(usize::try_from(len).unwrap_or(0));
            file.read_to_end(&mut buf)
                .map_err(|source| SyncError::io(path, source))?;
            hasher.update(&buf);
        } else {
            hasher.update(len.to_le_bytes());
            let sample = usize::try_from(self.sample_bytes).unwrap_or(usize::MAX);
            let mut head = vec![0u8; sample];
            file.read_exact(&mut head)
                .map_err(|source| SyncError::io(path, source))?;
            hasher.update(&head);

            file.seek(SeekFrom::End(-i64::try_from(self.sample_bytes).unwrap_or(i64::MAX)))
                .map_err(|source| SyncError::io(path, source))?;
            let mut tail = vec![0u8; sample];
            file.read_exact(&mut tail)
                .map_err(|source| SyncError::io(path, source))?;
            hasher.update(&tail);
        }
        Ok(Fingerprint(hasher.finalize().into()))
    }
}

/// Metadata snapshot of one file, keyed by its path relative to the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintedEntry {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub size: u64,
    pub is_dir: bool,
    /// `None` only for directories or when hashing failed.
    pub fingerprint: Option<Fingerprint>,
    pub file_id: Option<FileId>,
}

impl FingerprintedEntry {
    /// Build an entry from metadata already read by the walk.
    pub fn from_metadata(
        path: PathBuf,
        meta: &fs::Metadata,
        fingerprint: Option<Fingerprint>,
        file_id: Option<FileId>,
    ) -> Self {
        Self {
            path,
            modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            size: meta.len(),
            is_dir: meta.is_dir(),
            fingerprint,
            file_id,
        }
    }

    /// Whether the two entries differ in anything a diff cares about.
    pub fn metadata_differs(&self, other: &Self) -> bool {
        self.modified != other.modified
            || self.size != other.size
            || self.is_dir != other.is_dir
            || self.fingerprint != other.fingerprint
    }

    /// Whether both entries provably hold the same bytes.
    ///
    /// An entry without a fingerprint never matches anything.
    pub fn same_content(&self, other: &Self) -> bool {
        self.fingerprint.is_some()
            && self.fingerprint == other.fingerprint
            && self.size == other.size
            && self.is_dir == other.is_dir
    }
}
