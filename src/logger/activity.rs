//! Activity logger thread.
//!
//! A dedicated thread owns the [`JsonlWriter`]. Every other thread sends
//! [`ActivityEvent`]s through a cloneable [`ActivityLoggerHandle`] backed by a
//! bounded crossbeam channel; `try_send` means the synchronizer is never held
//! up by a slow disk, at the cost of dropping events under back-pressure.

#![allow(missing_docs)]

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::core::errors::{Result, SyncError};
use crate::logger::jsonl::{EventKind, JsonlConfig, JsonlWriter, LogEntry, Severity};

const CHANNEL_CAPACITY: usize = 1024;

// ──────────────────── events ────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivityEvent {
    SyncStarted {
        version: String,
        config_hash: String,
        root: PathBuf,
    },
    SyncStopped {
        reason: String,
        uptime_secs: u64,
    },
    InitialLoad {
        indexed: usize,
        rejected: usize,
        skipped: usize,
        duration_ms: u64,
    },
    BatchApplied {
        applied: usize,
        suppressed: usize,
        rescan: bool,
    },
    RecordRejected {
        path: String,
        region: String,
    },
    RecordSkipped {
        path: String,
        reason: String,
    },
    ConversionCompleted {
        region: String,
        converted: usize,
        persisted: usize,
        skipped_missing: usize,
        skipped_too_small: usize,
        automatic: bool,
    },
    PersistFailed {
        path: String,
        error_code: String,
        error_message: String,
    },
    ScanWarning {
        path: String,
        message: String,
    },
    RegionSelected {
        region: String,
    },
    AutoConversionToggled {
        enabled: bool,
    },
    Error {
        code: String,
        message: String,
    },
    /// Asks the logger thread to flush and exit.
    Shutdown,
}

impl ActivityEvent {
    /// Build an `Error` event from a crate error.
    pub fn from_error(err: &SyncError) -> Self {
        Self::Error {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

// ──────────────────── handle ────────────────────

/// Cheaply cloneable, non-blocking sender of activity events.
#[derive(Clone)]
pub struct ActivityLoggerHandle {
    tx: Sender<ActivityEvent>,
    dropped_events: Arc<AtomicU64>,
}

impl ActivityLoggerHandle {
    /// Handle with no logger thread behind it. Events go nowhere.
    pub fn detached() -> Self {
        let (tx, _rx) = bounded(1);
        Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue an event. Drops it (and counts the drop) when the channel is full.
    pub fn send(&self, event: ActivityEvent) {
        if let Err(TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    /// Ask the logger thread to flush and exit. Blocks until queued.
    pub fn shutdown(&self) {
        let _ = self.tx.send(ActivityEvent::Shutdown);
    }
}

impl std::fmt::Debug for ActivityLoggerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActivityLoggerHandle")
            .field("queued", &self.tx.len())
            .field("dropped_events", &self.dropped_events())
            .finish()
    }
}

// ──────────────────── spawn ────────────────────

pub struct ActivityLoggerConfig {
    pub jsonl: JsonlConfig,
    pub channel_capacity: usize,
}

impl ActivityLoggerConfig {
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            jsonl: JsonlConfig::for_path(path),
            channel_capacity: CHANNEL_CAPACITY,
        }
    }
}

/// Spawn the logger thread. It runs until [`ActivityLoggerHandle::shutdown`]
/// or until every handle is dropped.
pub fn spawn_logger(
    config: ActivityLoggerConfig,
) -> Result<(ActivityLoggerHandle, thread::JoinHandle<()>)> {
    let (tx, rx) = bounded::<ActivityEvent>(config.channel_capacity);
    let dropped = Arc::new(AtomicU64::new(0));
    let handle = ActivityLoggerHandle {
        tx,
        dropped_events: Arc::clone(&dropped),
    };

    let jsonl = config.jsonl;
    let join = thread::Builder::new()
        .name("cusync-logger".to_string())
        .spawn(move || logger_thread_main(&rx, jsonl, &dropped))
        .map_err(|e| SyncError::Runtime {
            details: format!("failed to spawn logger thread: {e}"),
        })?;

    Ok((handle, join))
}

fn logger_thread_main(rx: &Receiver<ActivityEvent>, config: JsonlConfig, dropped: &AtomicU64) {
    let mut jsonl = JsonlWriter::open(config);
    let mut writes_since_recover: u32 = 0;

    while let Ok(event) = rx.recv() {
        let lost = dropped.swap(0, Ordering::Relaxed);
        if lost > 0 {
            let mut warn = LogEntry::new(EventKind::Error, Severity::Warning);
            warn.details = Some(format!("{lost} activity events dropped under back-pressure"));
            jsonl.write_entry(&warn);
        }

        if event == ActivityEvent::Shutdown {
            break;
        }
        jsonl.write_entry(&to_log_entry(&event));

        writes_since_recover += 1;
        if writes_since_recover >= 256 {
            writes_since_recover = 0;
            jsonl.try_recover();
        }
    }

    jsonl.flush();
    jsonl.fsync();
}

// ──────────────────── event conversion ────────────────────

#[allow(clippy::too_many_lines)]
pub fn to_log_entry(event: &ActivityEvent) -> LogEntry {
    match event {
        ActivityEvent::SyncStarted {
            version,
            config_hash,
            root,
        } => {
            let mut e = LogEntry::new(EventKind::SyncStart, Severity::Info);
            e.path = Some(root.display().to_string());
            e.details = Some(format!("version={version} config_hash={config_hash}"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::SyncStopped {
            reason,
            uptime_secs,
        } => {
            let mut e = LogEntry::new(EventKind::SyncStop, Severity::Info);
            e.details = Some(format!("reason={reason} uptime={uptime_secs}s"));
            e.ok = Some(true);
            e
        }
        ActivityEvent::InitialLoad {
            indexed,
            rejected,
            skipped,
            duration_ms,
        } => {
            let mut e = LogEntry::new(EventKind::InitialLoad, Severity::Info)
                .with_count("indexed", *indexed)
                .with_count("rejected", *rejected)
                .with_count("skipped", *skipped);
            e.duration_ms = Some(*duration_ms);
            e.ok = Some(true);
            e
        }
        ActivityEvent::BatchApplied {
            applied,
            suppressed,
            rescan,
        } => {
            let mut e = LogEntry::new(EventKind::Batch, Severity::Info)
                .with_count("applied", *applied)
                .with_count("suppressed", *suppressed);
            if *rescan {
                e.details = Some("full rescan".to_string());
            }
            e
        }
        ActivityEvent::RecordRejected { path, region } => {
            let mut e = LogEntry::new(EventKind::RecordRejected, Severity::Warning);
            e.path = Some(path.clone());
            e.region = Some(region.clone());
            e
        }
        ActivityEvent::RecordSkipped { path, reason } => {
            let mut e = LogEntry::new(EventKind::RecordSkipped, Severity::Warning);
            e.path = Some(path.clone());
            e.details = Some(reason.clone());
            e
        }
        ActivityEvent::ConversionCompleted {
            region,
            converted,
            persisted,
            skipped_missing,
            skipped_too_small,
            automatic,
        } => {
            let mut e = LogEntry::new(EventKind::Conversion, Severity::Info)
                .with_count("converted", *converted)
                .with_count("persisted", *persisted)
                .with_count("skipped_missing", *skipped_missing)
                .with_count("skipped_too_small", *skipped_too_small);
            e.region = Some(region.clone());
            e.details = Some(if *automatic { "automatic" } else { "manual" }.to_string());
            e.ok = Some(true);
            e
        }
        ActivityEvent::PersistFailed {
            path,
            error_code,
            error_message,
        } => {
            let mut e = LogEntry::new(EventKind::PersistFailure, Severity::Error);
            e.path = Some(path.clone());
            e.ok = Some(false);
            e.error_code = Some(error_code.clone());
            e.error_message = Some(error_message.clone());
            e
        }
        ActivityEvent::ScanWarning { path, message } => {
            let mut e = LogEntry::new(EventKind::ScanWarning, Severity::Warning);
            e.path = Some(path.clone());
            e.details = Some(message.clone());
            e
        }
        ActivityEvent::RegionSelected { region } => {
            let mut e = LogEntry::new(EventKind::RegionSelected, Severity::Info);
            e.region = Some(region.clone());
            e
        }
        ActivityEvent::AutoConversionToggled { enabled } => {
            let mut e = LogEntry::new(EventKind::AutoConversion, Severity::Info);
            e.details = Some(format!("enabled={enabled}"));
            e
        }
        ActivityEvent::Error { code, message } => {
            let mut e = LogEntry::new(EventKind::Error, Severity::Error);
            e.error_code = Some(code.clone());
            e.error_message = Some(message.clone());
            e.ok = Some(false);
            e
        }
        ActivityEvent::Shutdown => LogEntry::new(EventKind::SyncStop, Severity::Info),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn read_lines(path: &std::path::Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn logger_thread_writes_and_exits_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("activity.jsonl");
        let mut config = ActivityLoggerConfig::for_path(&path);
        config.jsonl.fallback_path = None;
        let (handle, join) = spawn_logger(config).unwrap();

        handle.send(ActivityEvent::RegionSelected {
            region: "KOR".to_string(),
        });
        handle.send(ActivityEvent::ConversionCompleted {
            region: "KOR".to_string(),
            converted: 2,
            persisted: 2,
            skipped_missing: 0,
            skipped_too_small: 0,
            automatic: true,
        });
        handle.shutdown();
        join.join().unwrap();

        let lines = read_lines(&path);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["event"], "region_selected");
        assert_eq!(lines[1]["counts"]["converted"], 2);
        assert_eq!(lines[1]["details"], "automatic");
    }

    #[test]
    fn full_channel_counts_drops() {
        let (tx, _rx) = bounded(1);
        let handle = ActivityLoggerHandle {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
        };
        handle.send(ActivityEvent::AutoConversionToggled { enabled: true });
        handle.send(ActivityEvent::AutoConversionToggled { enabled: false });
        assert_eq!(handle.dropped_events(), 1);
    }

    #[test]
    fn detached_handle_swallows_events() {
        let handle = ActivityLoggerHandle::detached();
        for _ in 0..10 {
            handle.send(ActivityEvent::BatchApplied {
                applied: 1,
                suppressed: 0,
                rescan: false,
            });
        }
        assert_eq!(handle.dropped_events(), 0);
        handle.shutdown();
    }

    #[test]
    fn errors_carry_their_code() {
        let err = SyncError::PersistFailed {
            failed: 1,
            attempted: 3,
        };
        let entry = to_log_entry(&ActivityEvent::from_error(&err));
        assert_eq!(entry.error_code.as_deref(), Some("CUS-3003"));
        assert_eq!(entry.severity, Severity::Error);
    }
}
