//! Background synchronizer worker.
//!
//! Each cycle waits up to one poll interval (or for a stop/rescan wake-up),
//! scans and diffs without holding any foreground lock, then applies the
//! surviving events under the store lock in one batch. Removals are applied
//! before loads so chained renames (`a → b`, `b → c`) settle correctly.

#![allow(missing_docs)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::core::errors::{Result, SyncError};
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::scanner::differ::{ChangeEvent, DirectoryDiffer};
use crate::scanner::snapshot::ScanWarning;
use crate::store::{LoadOutcome, LoadSummary, RegionStore};
use crate::sync::shared::{SyncShared, WorkerState};

/// Work the worker hands to the presentation context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiTask {
    /// A non-empty batch reached the store.
    BatchApplied { applied: usize, rescan: bool },
}

/// Scan warnings seen on the previous cycle. A condition that persists
/// across polls is reported when it first appears, not on every poll.
#[derive(Debug, Default)]
pub(crate) struct WarningLog {
    previous: HashSet<(PathBuf, String)>,
}

impl WarningLog {
    pub(crate) fn seeded(warnings: &[ScanWarning]) -> Self {
        let mut log = Self::default();
        log.fresh(warnings);
        log
    }

    /// Warnings absent from the previous cycle. Forgets anything that did
    /// not recur, so it is reported again if it comes back.
    pub(crate) fn fresh<'a>(&mut self, warnings: &'a [ScanWarning]) -> Vec<&'a ScanWarning> {
        let current: HashSet<(PathBuf, String)> = warnings
            .iter()
            .map(|w| (w.path.clone(), w.message.clone()))
            .collect();
        let fresh = warnings
            .iter()
            .filter(|w| !self.previous.contains(&(w.path.clone(), w.message.clone())))
            .collect();
        self.previous = current;
        fresh
    }
}

pub(crate) fn spawn_worker(
    shared: Arc<SyncShared>,
    differ: DirectoryDiffer,
    warnings: WarningLog,
    poll_interval: Duration,
    ui_tx: Sender<UiTask>,
) -> Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("cusync-worker".to_string())
        .spawn(move || worker_main(&shared, differ, warnings, poll_interval, &ui_tx))
        .map_err(|e| SyncError::Runtime {
            details: format!("failed to spawn sync worker: {e}"),
        })
}

fn worker_main(
    shared: &SyncShared,
    mut differ: DirectoryDiffer,
    mut warnings: WarningLog,
    poll_interval: Duration,
    ui_tx: &Sender<UiTask>,
) {
    loop {
        {
            let mut active = shared.active.lock();
            if !*active {
                break;
            }
            shared.wake.wait_for(&mut active, poll_interval);
            if !*active {
                break;
            }
        }

        if let Some(task) = run_cycle(shared, &mut differ, &mut warnings) {
            // A full queue already holds a refresh that covers this batch.
            let _ = ui_tx.try_send(task);
        }
        shared.advance(WorkerState::Idle);
    }
    shared.set_state(WorkerState::Stopped);
}

/// One scan+apply cycle. Returns the task to schedule, if any.
pub(crate) fn run_cycle(
    shared: &SyncShared,
    differ: &mut DirectoryDiffer,
    warnings: &mut WarningLog,
) -> Option<UiTask> {
    if shared.rescan_requested.swap(false, Ordering::AcqRel) {
        return Some(full_rescan(shared, differ, warnings));
    }

    shared.advance(WorkerState::Scanning);
    let outcome = differ.poll();
    report_warnings(&shared.logger, warnings.fresh(&outcome.warnings));
    if outcome.events.is_empty() {
        return None;
    }

    shared.advance(WorkerState::Applying);
    let mut store = shared.store.lock();
    let (live, suppressed): (Vec<ChangeEvent>, Vec<ChangeEvent>) = outcome
        .events
        .into_iter()
        .partition(|event| !shared.suppression.filter(event));

    apply_events(&mut store, &live, &shared.logger);
    drop(store);

    shared.logger.send(ActivityEvent::BatchApplied {
        applied: live.len(),
        suppressed: suppressed.len(),
        rescan: false,
    });
    (!live.is_empty()).then_some(UiTask::BatchApplied {
        applied: live.len(),
        rescan: false,
    })
}

/// Apply a batch: every removal first, then every load.
pub(crate) fn apply_events(
    store: &mut RegionStore,
    events: &[ChangeEvent],
    logger: &ActivityLoggerHandle,
) {
    for path in events.iter().filter_map(ChangeEvent::removed_path) {
        store.remove_key(path);
    }
    for path in events.iter().filter_map(ChangeEvent::loaded_path) {
        let absolute = store.layout().absolute(path);
        let outcome = store.load(&absolute);
        report_load(logger, &outcome);
    }
}

fn full_rescan(
    shared: &SyncShared,
    differ: &mut DirectoryDiffer,
    warnings: &mut WarningLog,
) -> UiTask {
    shared.advance(WorkerState::Scanning);
    let outcome = differ.reset();
    // An explicit rescan reports everything it finds.
    *warnings = WarningLog::default();
    report_warnings(&shared.logger, warnings.fresh(&outcome.warnings));

    shared.advance(WorkerState::Applying);
    let summary = {
        let mut store = shared.store.lock();
        shared.suppression.clear();
        store.clear();
        bulk_load(&mut store, outcome.snapshot.paths().map(PathBuf::as_path), &shared.logger)
    };
    eprintln!(
        "[CUS-SYNC] rescan: {} indexed, {} rejected, {} skipped",
        summary.indexed, summary.rejected, summary.skipped
    );

    let applied = summary.indexed + summary.rejected;
    shared.logger.send(ActivityEvent::BatchApplied {
        applied,
        suppressed: 0,
        rescan: true,
    });
    UiTask::BatchApplied {
        applied,
        rescan: true,
    }
}

/// Load every key into `store`, tallying outcomes.
pub(crate) fn bulk_load<'a>(
    store: &mut RegionStore,
    keys: impl Iterator<Item = &'a Path>,
    logger: &ActivityLoggerHandle,
) -> LoadSummary {
    let mut summary = LoadSummary::default();
    for key in keys {
        let absolute = store.layout().absolute(key);
        let outcome = store.load(&absolute);
        report_load(logger, &outcome);
        summary.record(&outcome);
    }
    summary
}

fn report_load(logger: &ActivityLoggerHandle, outcome: &LoadOutcome) {
    match outcome {
        LoadOutcome::Rejected { key, region } => logger.send(ActivityEvent::RecordRejected {
            path: key.display().to_string(),
            region: region.to_string(),
        }),
        LoadOutcome::TooSmall { key, len } => logger.send(ActivityEvent::RecordSkipped {
            path: key.display().to_string(),
            reason: format!("{len} bytes is below the region field"),
        }),
        LoadOutcome::Unreadable { key, error } => {
            eprintln!("[CUS-SYNC] cannot load {}: {error}", key.display());
            logger.send(ActivityEvent::RecordSkipped {
                path: key.display().to_string(),
                reason: error.to_string(),
            });
        }
        LoadOutcome::Indexed { .. } | LoadOutcome::Ignored => {}
    }
}

fn report_warnings(logger: &ActivityLoggerHandle, warnings: Vec<&ScanWarning>) {
    for warning in warnings {
        eprintln!("[CUS-SCAN] {warning}");
        logger.send(ActivityEvent::ScanWarning {
            path: warning.path.display().to_string(),
            message: warning.message.clone(),
        });
    }
}
