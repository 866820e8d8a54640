//! Lifecycle owner of the synchronizer: bulk-loads the index, runs the
//! background worker, and implements the foreground actions.

#![allow(missing_docs)]

use std::fmt;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, bounded};
use parking_lot::Mutex;
use serde::Serialize;

use crate::core::config::Config;
use crate::core::errors::{Result, SyncError};
use crate::core::paths::resolve_absolute_path;
use crate::logger::activity::{ActivityEvent, ActivityLoggerHandle};
use crate::platform::file_id::{FileIdentity, detect_identity};
use crate::scanner::differ::DirectoryDiffer;
use crate::scanner::fingerprint::FingerprintPolicy;
use crate::scanner::snapshot::{ScanOptions, ScanWarning};
use crate::store::{
    ConversionReport, LoadSummary, RecordView, RegionCode, RegionSet, RegionStore, StoreLayout,
};
use crate::sync::shared::{SyncShared, WorkerState};
use crate::sync::worker::{UiTask, WarningLog, bulk_load, spawn_worker};

/// Everything needed to start a synchronizer.
#[derive(Clone)]
pub struct SyncOptions {
    pub root: PathBuf,
    pub recursive: bool,
    pub extension: String,
    pub poll_interval: Duration,
    pub allowed: RegionSet,
    pub initial_region: RegionCode,
    pub automatic_conversion: bool,
    pub fingerprint: FingerprintPolicy,
    pub identity: Arc<dyn FileIdentity>,
    /// Reported in the start event so log lines can be tied to a config.
    pub config_hash: String,
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Result<Self> {
        let allowed = config.regions.region_set()?;
        let initial_region = config.regions.default_code()?;
        Ok(Self {
            root: config.watch.root_dir.clone(),
            recursive: config.watch.recursive,
            extension: config.watch.extension.clone(),
            poll_interval: config.watch.poll_interval(),
            allowed,
            initial_region,
            automatic_conversion: config.regions.automatic_conversion,
            fingerprint: FingerprintPolicy::from(&config.fingerprint),
            identity: detect_identity(),
            config_hash: config.stable_hash()?,
        })
    }

    /// Defaults for `root`: allowed USA/KOR/RUS, selected USA, 100 ms poll.
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        let defaults = Config::default();
        Self {
            root: root.into(),
            recursive: defaults.watch.recursive,
            extension: defaults.watch.extension,
            poll_interval: Duration::from_millis(defaults.watch.poll_interval_ms),
            allowed: RegionSet::default(),
            initial_region: RegionCode::USA,
            automatic_conversion: false,
            fingerprint: FingerprintPolicy::default(),
            identity: detect_identity(),
            config_hash: String::new(),
        }
    }

    fn scan_options(&self, root: PathBuf) -> ScanOptions {
        ScanOptions {
            root,
            recursive: self.recursive,
            extension: self.extension.clone(),
            policy: self.fingerprint,
        }
    }
}

impl fmt::Debug for SyncOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncOptions")
            .field("root", &self.root)
            .field("recursive", &self.recursive)
            .field("extension", &self.extension)
            .field("poll_interval", &self.poll_interval)
            .field("allowed", &self.allowed)
            .field("initial_region", &self.initial_region)
            .field("automatic_conversion", &self.automatic_conversion)
            .field("identity", &self.identity.name())
            .finish_non_exhaustive()
    }
}

/// Index built by a one-off scan, plus the differ baselined on that scan.
pub struct InitialLoad {
    pub store: RegionStore,
    pub differ: DirectoryDiffer,
    pub summary: LoadSummary,
    pub warnings: Vec<ScanWarning>,
    pub root: PathBuf,
}

/// Check the root and load every matching file under it.
///
/// A missing root, or one that is not a directory, is fatal.
pub fn initial_load(options: &SyncOptions, logger: &ActivityLoggerHandle) -> Result<InitialLoad> {
    let started = Instant::now();
    let root = resolve_absolute_path(&options.root);
    let meta = fs::metadata(&root).map_err(|err| SyncError::RootDirectory {
        path: root.clone(),
        details: err.to_string(),
    })?;
    if !meta.is_dir() {
        return Err(SyncError::RootDirectory {
            path: root,
            details: "not a directory".to_string(),
        });
    }

    let scan_options = options.scan_options(root.clone());
    let mut differ = DirectoryDiffer::new(scan_options, Arc::clone(&options.identity));
    let outcome = differ.reset();
    for warning in &outcome.warnings {
        eprintln!("[CUS-SCAN] {warning}");
        logger.send(ActivityEvent::ScanWarning {
            path: warning.path.display().to_string(),
            message: warning.message.clone(),
        });
    }

    let layout = StoreLayout::new(root.clone(), options.extension.clone(), options.allowed.clone());
    let mut store = RegionStore::new(layout);
    let summary = bulk_load(&mut store, outcome.snapshot.paths().map(PathBuf::as_path), logger);
    if summary.indexed == 0 {
        eprintln!("[CUS-SYNC] no records found under {}", root.display());
    }

    logger.send(ActivityEvent::InitialLoad {
        indexed: summary.indexed,
        rejected: summary.rejected,
        skipped: summary.skipped,
        duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
    });

    Ok(InitialLoad {
        store,
        differ,
        summary,
        warnings: outcome.warnings,
        root,
    })
}

/// What the presentation surface should show after an action or batch.
#[derive(Debug, Clone, Serialize)]
pub struct ViewUpdate {
    pub selected: String,
    pub automatic_conversion: bool,
    pub unconverted: Vec<RecordView>,
    /// Present when the action or batch triggered a conversion.
    pub conversion: Option<ConversionReport>,
}

/// Owns the worker thread and the shared state.
///
/// Dropping the controller stops and joins the worker.
pub struct SyncController {
    shared: Arc<SyncShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
    ui_rx: Receiver<UiTask>,
    summary: LoadSummary,
    root: PathBuf,
    started: Instant,
}

impl SyncController {
    /// Bulk-load the index and start the background worker.
    pub fn start(options: SyncOptions, logger: ActivityLoggerHandle) -> Result<Self> {
        let InitialLoad {
            store,
            differ,
            summary,
            warnings,
            root,
        } = initial_load(&options, &logger)?;

        let shared = Arc::new(SyncShared::new(
            store,
            options.initial_region,
            options.automatic_conversion,
            logger,
        ));
        shared.logger.send(ActivityEvent::SyncStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: options.config_hash.clone(),
            root: root.clone(),
        });
        if options.automatic_conversion {
            let order = shared.ordering.lock();
            let report = shared.convert_under(&order, options.initial_region, true)?;
            if report.converted > 0 {
                eprintln!(
                    "[CUS-SYNC] converted {} records to {} at startup",
                    report.converted, report.target
                );
            }
        }

        // One pending task is enough: handling it refreshes the whole view.
        let (ui_tx, ui_rx) = bounded(1);
        let worker = spawn_worker(
            Arc::clone(&shared),
            differ,
            WarningLog::seeded(&warnings),
            options.poll_interval,
            ui_tx,
        )?;

        eprintln!(
            "[CUS-SYNC] watching {} ({} indexed, {} rejected, {} skipped)",
            root.display(),
            summary.indexed,
            summary.rejected,
            summary.skipped
        );

        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
            ui_rx,
            summary,
            root,
            started: Instant::now(),
        })
    }

    /// Stop the worker and wait for it. Safe to call more than once.
    pub fn stop(&self) {
        let Some(handle) = self.worker.lock().take() else {
            return;
        };
        {
            let mut active = self.shared.active.lock();
            *active = false;
            self.shared.set_state(WorkerState::Terminating);
        }
        self.shared.wake.notify_all();

        if handle.join().is_err() {
            eprintln!("[CUS-SYNC] worker thread panicked");
        }
        self.shared.set_state(WorkerState::Stopped);
        self.shared.logger.send(ActivityEvent::SyncStopped {
            reason: "stop requested".to_string(),
            uptime_secs: self.started.elapsed().as_secs(),
        });
    }

    // ──────────────────── foreground actions ────────────────────

    /// Change the selected region, auto-converting if enabled.
    pub fn select_region(&self, raw: &str) -> Result<ViewUpdate> {
        let region = self.allowed().resolve(raw)?;
        let order = self.shared.ordering.lock();
        *self.shared.selected.write() = region;
        self.shared.logger.send(ActivityEvent::RegionSelected {
            region: region.to_string(),
        });

        let conversion = if self.shared.auto_convert_enabled() {
            Some(self.shared.convert_under(&order, region, true)?)
        } else {
            None
        };
        Ok(self.view_update(region, conversion))
    }

    /// Convert every record to the selected region now.
    pub fn convert_now(&self) -> Result<ConversionReport> {
        let order = self.shared.ordering.lock();
        let region = self.shared.selected_region();
        self.shared.convert_under(&order, region, false)
    }

    /// Enable or disable automatic conversion. Enabling converts immediately.
    pub fn set_automatic_conversion(&self, enabled: bool) -> Result<ViewUpdate> {
        let order = self.shared.ordering.lock();
        let was = self.shared.auto_convert.swap(enabled, Ordering::AcqRel);
        if was != enabled {
            self.shared
                .logger
                .send(ActivityEvent::AutoConversionToggled { enabled });
        }

        let region = self.shared.selected_region();
        let conversion = if enabled && !was {
            Some(self.shared.convert_under(&order, region, true)?)
        } else {
            None
        };
        Ok(self.view_update(region, conversion))
    }

    pub fn toggle_automatic_conversion(&self) -> Result<ViewUpdate> {
        self.set_automatic_conversion(!self.automatic_conversion_enabled())
    }

    /// Current view of records not in the selected region.
    pub fn refresh(&self) -> ViewUpdate {
        self.view_update(self.shared.selected_region(), None)
    }

    /// Ask the worker to rebuild the index from a fresh scan.
    pub fn request_rescan(&self) {
        self.shared.rescan_requested.store(true, Ordering::Release);
        self.shared.wake.notify_all();
    }

    // ──────────────────── presentation hand-off ────────────────────

    /// Tasks scheduled by the worker for the presentation context.
    pub const fn ui_tasks(&self) -> &Receiver<UiTask> {
        &self.ui_rx
    }

    /// Run a worker-scheduled task: auto-convert if enabled, then refresh.
    pub fn handle_ui_task(&self, task: UiTask) -> Result<ViewUpdate> {
        let UiTask::BatchApplied { .. } = task;
        let order = self.shared.ordering.lock();
        let region = self.shared.selected_region();
        let conversion = if self.shared.auto_convert_enabled() {
            Some(self.shared.convert_under(&order, region, true)?)
        } else {
            None
        };
        Ok(self.view_update(region, conversion))
    }

    /// Wait up to `timeout` for one worker task and handle it.
    pub fn pump_ui(&self, timeout: Duration) -> Option<Result<ViewUpdate>> {
        match self.ui_rx.recv_timeout(timeout) {
            Ok(task) => Some(self.handle_ui_task(task)),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    // ──────────────────── observation ────────────────────

    pub fn selected_region(&self) -> RegionCode {
        self.shared.selected_region()
    }

    pub fn automatic_conversion_enabled(&self) -> bool {
        self.shared.auto_convert_enabled()
    }

    pub fn unconverted_view(&self) -> Vec<RecordView> {
        self.unconverted_view_for(self.shared.selected_region())
    }

    pub fn unconverted_view_for(&self, region: RegionCode) -> Vec<RecordView> {
        self.shared.store.lock().unconverted_view(region)
    }

    pub fn worker_state(&self) -> WorkerState {
        self.shared.worker_state()
    }

    pub const fn initial_summary(&self) -> LoadSummary {
        self.summary
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    pub fn allowed(&self) -> RegionSet {
        self.shared.store.lock().layout().allowed().clone()
    }

    /// Writes whose echo has not been seen yet.
    pub fn pending_suppressions(&self) -> usize {
        self.shared.suppression.len()
    }

    /// Run `f` against the index under the store lock.
    pub fn with_store<R>(&self, f: impl FnOnce(&RegionStore) -> R) -> R {
        f(&self.shared.store.lock())
    }

    fn view_update(&self, region: RegionCode, conversion: Option<ConversionReport>) -> ViewUpdate {
        ViewUpdate {
            selected: region.to_string(),
            automatic_conversion: self.shared.auto_convert_enabled(),
            unconverted: self.unconverted_view_for(region),
            conversion,
        }
    }
}

impl Drop for SyncController {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for SyncController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncController")
            .field("root", &self.root)
            .field("selected", &self.shared.selected_region())
            .field("automatic_conversion", &self.shared.auto_convert_enabled())
            .field("worker_state", &self.shared.worker_state())
            .finish_non_exhaustive()
    }
}
