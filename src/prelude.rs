//! Convenience re-exports for library consumers.
//!
//! ```rust,no_run
//! use cus_region_sync::prelude::*;
//! ```

// Core
pub use crate::core::config::Config;
pub use crate::core::errors::{Result, SyncError};

// Platform
pub use crate::platform::file_id::{FileId, FileIdentity, detect_identity};

// Scanner
pub use crate::scanner::differ::{ChangeEvent, DirectoryDiffer, MatchStrategy, diff_snapshots};
pub use crate::scanner::fingerprint::FingerprintPolicy;
pub use crate::scanner::snapshot::{ScanOptions, Snapshot, scan};

// Store
pub use crate::store::{ConversionReport, RecordView, RegionCode, RegionSet, RegionStore};

// Sync
pub use crate::bridge::{PresentationBridge, PresentationSurface, UiAction};
pub use crate::logger::activity::{ActivityLoggerHandle, spawn_logger};
pub use crate::sync::{SyncController, SyncOptions, ViewUpdate, WorkerState};
