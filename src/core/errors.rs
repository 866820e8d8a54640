//! CUS-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Top-level error type for the region sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("[CUS-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[CUS-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[CUS-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[CUS-1004] unusable root directory {path}: {details}")]
    RootDirectory { path: PathBuf, details: String },

    #[error("[CUS-2001] invalid region code {code:?}: {reason}")]
    InvalidRegion { code: String, reason: String },

    #[error("[CUS-2002] record {path} too small: {len} bytes")]
    RecordTooSmall { path: PathBuf, len: usize },

    #[error("[CUS-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[CUS-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[CUS-3003] persist failed for {failed} of {attempted} records")]
    PersistFailed { failed: usize, attempted: usize },

    #[error("[CUS-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SyncError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "CUS-1001",
            Self::MissingConfig { .. } => "CUS-1002",
            Self::ConfigParse { .. } => "CUS-1003",
            Self::RootDirectory { .. } => "CUS-1004",
            Self::InvalidRegion { .. } => "CUS-2001",
            Self::RecordTooSmall { .. } => "CUS-2002",
            Self::Serialization { .. } => "CUS-2101",
            Self::Io { .. } => "CUS-3002",
            Self::PersistFailed { .. } => "CUS-3003",
            Self::Runtime { .. } => "CUS-3900",
        }
    }

    /// Whether re-triggering the operation might resolve the failure.
    ///
    /// Nothing is retried automatically; this only tells a caller whether a
    /// manual retry (e.g. converting again) is worth offering.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. } | Self::PersistFailed { .. } | Self::Runtime { .. }
        )
    }

    /// Whether this error is a per-record validation failure (never fatal).
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRegion { .. } | Self::RecordTooSmall { .. }
        )
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}
