//! JSONL activity log: one self-contained JSON object per line.
//!
//! Lines are assembled in memory and written with a single `write_all` so a
//! concurrent `tail -f` never sees half a record. When the log file cannot be
//! written the writer degrades: primary path, fallback path, stderr (with a
//! `[CUS-JSONL]` prefix), then silent discard. Logging never fails the caller.

#![allow(missing_docs)]

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SyncError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Kinds of activity recorded in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    SyncStart,
    SyncStop,
    InitialLoad,
    Batch,
    RecordRejected,
    RecordSkipped,
    Conversion,
    PersistFailure,
    ScanWarning,
    RegionSelected,
    AutoConversion,
    Error,
}

/// One log line. Only `ts`, `event` and `severity` are always present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 UTC timestamp with milliseconds.
    pub ts: String,
    pub event: EventKind,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Event-specific counters, e.g. `{"indexed": 12, "rejected": 1}`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counts: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ok: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl LogEntry {
    /// New entry stamped with the current UTC time.
    pub fn new(event: EventKind, severity: Severity) -> Self {
        Self {
            ts: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            event,
            severity,
            path: None,
            region: None,
            size: None,
            counts: None,
            duration_ms: None,
            ok: None,
            error_code: None,
            error_message: None,
            details: None,
        }
    }

    /// Add one named counter.
    #[must_use]
    pub fn with_count(mut self, name: &str, value: usize) -> Self {
        self.counts
            .get_or_insert_with(serde_json::Map::new)
            .insert(name.to_string(), serde_json::Value::from(value));
        self
    }
}

#[derive(Debug, Clone)]
pub struct JsonlConfig {
    pub path: PathBuf,
    pub fallback_path: Option<PathBuf>,
    /// Rotate once the current file would exceed this many bytes.
    pub max_size_bytes: u64,
    pub max_rotated_files: u32,
    pub fsync_interval_secs: u64,
}

impl JsonlConfig {
    /// Defaults for a primary path; the fallback lives in the temp dir.
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fallback_path: Some(std::env::temp_dir().join("cusync-activity.jsonl")),
            max_size_bytes: 16 * 1024 * 1024,
            max_rotated_files: 3,
            fsync_interval_secs: 10,
        }
    }
}

/// Where lines currently go.
enum Sink {
    File {
        writer: BufWriter<File>,
        on_fallback: bool,
    },
    Stderr,
    Discard,
}

/// Append-only writer with rotation and a degradation chain.
pub struct JsonlWriter {
    config: JsonlConfig,
    sink: Sink,
    bytes_written: u64,
    last_fsync: Instant,
}

impl JsonlWriter {
    pub fn open(config: JsonlConfig) -> Self {
        let mut writer = Self {
            config,
            sink: Sink::Discard,
            bytes_written: 0,
            last_fsync: Instant::now(),
        };
        writer.open_primary_or_degrade();
        writer
    }

    pub fn write_entry(&mut self, entry: &LogEntry) {
        match serde_json::to_string(entry) {
            Ok(json) => self.write_line(&format!("{json}\n")),
            Err(err) => {
                let _ = writeln!(io::stderr(), "[CUS-JSONL] serialize error: {err}");
            }
        }
    }

    pub fn flush(&mut self) {
        if let Sink::File { writer, .. } = &mut self.sink {
            let _ = writer.flush();
        }
    }

    pub fn fsync(&mut self) {
        if let Sink::File { writer, .. } = &mut self.sink {
            let _ = writer.flush();
            let _ = writer.get_ref().sync_data();
        }
        self.last_fsync = Instant::now();
    }

    /// `normal`, `fallback`, `stderr` or `discard`.
    pub const fn state(&self) -> &'static str {
        match self.sink {
            Sink::File {
                on_fallback: false, ..
            } => "normal",
            Sink::File {
                on_fallback: true, ..
            } => "fallback",
            Sink::Stderr => "stderr",
            Sink::Discard => "discard",
        }
    }

    pub const fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Try to move back onto the primary path after a degradation.
    pub fn try_recover(&mut self) {
        if self.state() == "normal" {
            return;
        }
        if let Ok((file, size)) = open_append(&self.config.path) {
            self.sink = Sink::File {
                writer: BufWriter::new(file),
                on_fallback: false,
            };
            self.bytes_written = size;
            let _ = writeln!(
                io::stderr(),
                "[CUS-JSONL] recovered to primary path: {}",
                self.config.path.display()
            );
        }
    }

    // ──────────────────────── internals ────────────────────────

    fn write_line(&mut self, line: &str) {
        let len = line.len() as u64;
        if matches!(self.sink, Sink::File { .. }) && self.bytes_written + len > self.config.max_size_bytes {
            self.rotate();
        }

        let failed = match &mut self.sink {
            Sink::File { writer, .. } => writer.write_all(line.as_bytes()).is_err(),
            Sink::Stderr => {
                let _ = write!(io::stderr(), "[CUS-JSONL] {line}");
                false
            }
            Sink::Discard => false,
        };

        if failed {
            self.degrade();
            self.write_line(line);
            return;
        }
        if matches!(self.sink, Sink::File { .. }) {
            self.bytes_written += len;
            if self.last_fsync.elapsed().as_secs() >= self.config.fsync_interval_secs {
                self.fsync();
            }
        }
    }

    fn open_primary_or_degrade(&mut self) {
        match open_append(&self.config.path) {
            Ok((file, size)) => {
                self.sink = Sink::File {
                    writer: BufWriter::new(file),
                    on_fallback: false,
                };
                self.bytes_written = size;
            }
            Err(_) => self.open_fallback_or_degrade(),
        }
    }

    fn open_fallback_or_degrade(&mut self) {
        let opened = self
            .config
            .fallback_path
            .as_deref()
            .and_then(|fb| open_append(fb).ok().map(|ok| (fb.to_path_buf(), ok)));
        match opened {
            Some((fb, (file, size))) => {
                let _ = writeln!(
                    io::stderr(),
                    "[CUS-JSONL] primary log path unusable, writing to {}",
                    fb.display()
                );
                self.sink = Sink::File {
                    writer: BufWriter::new(file),
                    on_fallback: true,
                };
                self.bytes_written = size;
            }
            None => {
                let _ = writeln!(io::stderr(), "[CUS-JSONL] no writable log path, using stderr");
                self.sink = Sink::Stderr;
            }
        }
    }

    fn degrade(&mut self) {
        let next = std::mem::replace(&mut self.sink, Sink::Discard);
        match next {
            Sink::File {
                on_fallback: false, ..
            } => self.open_fallback_or_degrade(),
            Sink::File {
                on_fallback: true, ..
            } => {
                let _ = writeln!(io::stderr(), "[CUS-JSONL] fallback write failed, using stderr");
                self.sink = Sink::Stderr;
            }
            Sink::Stderr | Sink::Discard => self.sink = Sink::Discard,
        }
    }

    fn rotate(&mut self) {
        let base = match &self.sink {
            Sink::File {
                on_fallback: false, ..
            } => self.config.path.clone(),
            Sink::File {
                on_fallback: true, ..
            } => match &self.config.fallback_path {
                Some(fb) => fb.clone(),
                None => return,
            },
            Sink::Stderr | Sink::Discard => return,
        };
        let on_fallback = self.state() == "fallback";
        self.flush();

        let keep = self.config.max_rotated_files;
        let _ = fs::remove_file(rotated_name(&base, keep));
        for index in (1..keep).rev() {
            let _ = fs::rename(rotated_name(&base, index), rotated_name(&base, index + 1));
        }
        let _ = fs::rename(&base, rotated_name(&base, 1));

        match open_append(&base) {
            Ok((file, _)) => {
                self.sink = Sink::File {
                    writer: BufWriter::new(file),
                    on_fallback,
                };
                self.bytes_written = 0;
            }
            Err(_) => self.degrade(),
        }
    }
}

// ──────────────────────── helpers ────────────────────────

/// Open or create `path` for appending, creating parent directories.
fn open_append(path: &Path) -> Result<(File, u64)> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| SyncError::io(parent, source))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| SyncError::io(path, source))?;
    let size = file.metadata().map_or(0, |m| m.len());
    Ok((file, size))
}

/// `activity.jsonl` → `activity.jsonl.2`.
fn rotated_name(base: &Path, index: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{index}"));
    PathBuf::from(name)
}
