//! State shared between the foreground controller and the background worker.
//!
//! Lock order is fixed: `ordering` before `store`. Operations that need both
//! take the ordering guard as a parameter so the order is visible in the
//! signature.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use serde::Serialize;

use crate::core::errors::Result;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::store::{ConversionReport, RegionCode, RegionStore};
use crate::sync::suppression::SuppressionSet;

/// Worker lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    Scanning = 1,
    Applying = 2,
    Terminating = 3,
    Stopped = 4,
}

impl WorkerState {
    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Scanning,
            2 => Self::Applying,
            3 => Self::Terminating,
            _ => Self::Stopped,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Applying => "applying",
            Self::Terminating => "terminating",
            Self::Stopped => "stopped",
        }
    }
}

pub(crate) struct SyncShared {
    /// Serializes "select region, maybe auto-convert" against "convert now".
    pub ordering: Mutex<()>,
    pub store: Mutex<RegionStore>,
    pub suppression: SuppressionSet,
    pub selected: RwLock<RegionCode>,
    pub auto_convert: AtomicBool,
    /// Guarded flag the worker waits on; cleared to stop it.
    pub active: Mutex<bool>,
    pub wake: Condvar,
    pub rescan_requested: AtomicBool,
    state: AtomicU8,
    pub logger: ActivityLoggerHandle,
}

impl SyncShared {
    pub fn new(
        store: RegionStore,
        selected: RegionCode,
        auto_convert: bool,
        logger: ActivityLoggerHandle,
    ) -> Self {
        Self {
            ordering: Mutex::new(()),
            store: Mutex::new(store),
            suppression: SuppressionSet::new(),
            selected: RwLock::new(selected),
            auto_convert: AtomicBool::new(auto_convert),
            active: Mutex::new(true),
            wake: Condvar::new(),
            rescan_requested: AtomicBool::new(false),
            state: AtomicU8::new(WorkerState::Idle as u8),
            logger,
        }
    }

    pub fn worker_state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Enter `state` unless a stop is already under way.
    pub fn advance(&self, state: WorkerState) {
        let _ = self
            .state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current < WorkerState::Terminating as u8).then_some(state as u8)
            });
    }

    pub fn selected_region(&self) -> RegionCode {
        *self.selected.read()
    }

    pub fn auto_convert_enabled(&self) -> bool {
        self.auto_convert.load(Ordering::Acquire)
    }

    /// Convert everything to `region` and log the outcome.
    pub fn convert_under(
        &self,
        _order: &MutexGuard<'_, ()>,
        region: RegionCode,
        automatic: bool,
    ) -> Result<ConversionReport> {
        let report = {
            let mut store = self.store.lock();
            store.convert_files_to_region(&region.to_string(), &self.suppression)?
        };

        self.logger.send(ActivityEvent::ConversionCompleted {
            region: report.target.clone(),
            converted: report.converted,
            persisted: report.persisted,
            skipped_missing: report.skipped_missing,
            skipped_too_small: report.skipped_too_small,
            automatic,
        });
        for failure in &report.failures {
            self.logger.send(ActivityEvent::PersistFailed {
                path: failure.path.display().to_string(),
                error_code: "CUS-3002".to_string(),
                error_message: failure.error.clone(),
            });
        }
        Ok(report)
    }
}
