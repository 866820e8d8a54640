#![forbid(unsafe_code)]

//! cus_region_sync (cusync) keeps a region-partitioned index of
//! customization files in step with a directory tree, and rewrites their
//! region code in place.
//!
//! Each record is an opaque blob whose bytes 8..11 hold a three-letter
//! region code. The crate provides:
//! 1. **Snapshot differ**: polling scans turned into added, modified,
//!    deleted and renamed events
//! 2. **Region store**: records bucketed by region, with two-pass
//!    conversion and persistence
//! 3. **Synchronizer**: a background worker applying changes, with echo
//!    suppression for the store's own writes
//!
//! # Library usage
//!
//! ```rust,no_run
//! use cus_region_sync::prelude::*;
//!
//! # fn main() -> cus_region_sync::core::errors::Result<()> {
//! let config = Config::load(None)?;
//! let options = SyncOptions::from_config(&config)?;
//! let controller = SyncController::start(options, ActivityLoggerHandle::detached())?;
//! let report = controller.convert_now()?;
//! println!("converted {}", report.converted);
//! # Ok(())
//! # }
//! ```

pub mod prelude;

pub mod bridge;
pub mod core;
pub mod daemon;
pub mod logger;
pub mod platform;
pub mod scanner;
pub mod store;
pub mod sync;
