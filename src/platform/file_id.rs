//! Stable file identity: the capability the differ uses to follow a file
//! across renames without relying on rename notifications.

#![allow(missing_docs)]

use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier that stays the same while the underlying file is renamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FileId {
    pub device: u64,
    pub inode: u64,
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.device, self.inode)
    }
}

/// Source of stable file identifiers.
pub trait FileIdentity: Send + Sync {
    /// Identifier from already-fetched metadata.
    fn id_from_metadata(&self, meta: &fs::Metadata) -> Option<FileId>;

    /// Identifier for `path`, or `None` if the platform has none or the
    /// path cannot be stat'ed.
    fn stable_id(&self, path: &Path) -> Option<FileId> {
        let meta = fs::metadata(path).ok()?;
        self.id_from_metadata(&meta)
    }

    fn name(&self) -> &'static str;
}

/// Device + inode identity.
#[cfg(unix)]
#[derive(Debug, Default, Clone, Copy)]
pub struct UnixFileIdentity;

#[cfg(unix)]
impl FileIdentity for UnixFileIdentity {
    fn id_from_metadata(&self, meta: &fs::Metadata) -> Option<FileId> {
        use std::os::unix::fs::MetadataExt;
        Some(FileId {
            device: meta.dev(),
            inode: meta.ino(),
        })
    }

    fn name(&self) -> &'static str {
        "unix-dev-ino"
    }
}

/// Never reports an identifier, which forces content-based rename matching.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFileIdentity;

impl FileIdentity for NoFileIdentity {
    fn id_from_metadata(&self, _meta: &fs::Metadata) -> Option<FileId> {
        None
    }

    fn stable_id(&self, _path: &Path) -> Option<FileId> {
        None
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

/// Detect the identity source for the current target.
pub fn detect_identity() -> Arc<dyn FileIdentity> {
    #[cfg(unix)]
    {
        Arc::new(UnixFileIdentity)
    }
    #[cfg(not(unix))]
    {
        Arc::new(NoFileIdentity)
    }
}
