//! Decoded customization records and their flattened view.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::errors::{Result, SyncError};
use crate::store::region::{MIN_RECORD_LEN, RegionCode, RegionSet};

/// One decoded record.
///
/// `bytes` is the full file content; only the region field is ever
/// interpreted. `dirty` marks in-memory changes that have not reached disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub path: PathBuf,
    pub bytes: Vec<u8>,
    pub region: RegionCode,
    pub invalid: bool,
    pub dirty: bool,
}

impl Record {
    /// Decode a buffer read from `path` (relative key).
    ///
    /// Buffers shorter than the region field are not records at all. A region
    /// outside `allowed` yields a record flagged `invalid`.
    pub fn decode(path: impl Into<PathBuf>, bytes: Vec<u8>, allowed: &RegionSet) -> Result<Self> {
        let path = path.into();
        let Some(region) = RegionCode::read_from(&bytes) else {
            return Err(SyncError::RecordTooSmall {
                len: bytes.len(),
                path,
            });
        };
        Ok(Self {
            invalid: !allowed.contains(&region),
            path,
            bytes,
            region,
            dirty: false,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Whether conversion may rewrite this record.
    pub fn is_convertible(&self) -> bool {
        !self.invalid && self.bytes.len() >= MIN_RECORD_LEN
    }

    /// Rewrite the region field in place and mark the record dirty.
    pub fn rewrite_region(&mut self, target: RegionCode) -> bool {
        if !target.write_into(&mut self.bytes) {
            return false;
        }
        self.region = target;
        self.dirty = true;
        true
    }

    pub fn key(&self) -> &Path {
        &self.path
    }

    pub fn view(&self) -> RecordView {
        RecordView {
            path: self.path.clone(),
            region: self.region.to_string(),
            size: self.bytes.len(),
            invalid: self.invalid,
        }
    }
}

/// What the presentation surface shows per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordView {
    pub path: PathBuf,
    pub region: String,
    pub size: usize,
    pub invalid: bool,
}
