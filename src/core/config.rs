//! Configuration system: TOML file + env var overrides + defaults.

#![allow(missing_docs)]

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::errors::{Result, SyncError};
use crate::store::region::{RegionCode, RegionSet};

/// Full cusync configuration model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Config {
    pub watch: WatchConfig,
    pub regions: RegionsConfig,
    pub fingerprint: FingerprintConfig,
    pub paths: PathsConfig,
}

/// What to watch and how often.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchConfig {
    /// Root of the customization tree. Existence is checked when the
    /// synchronizer starts, not here.
    pub root_dir: PathBuf,
    pub recursive: bool,
    /// File extension identifying candidate records, without the dot.
    pub extension: String,
    pub poll_interval_ms: u64,
}

/// Allowed region codes and the initial selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RegionsConfig {
    pub allowed: Vec<String>,
    pub default_region: String,
    pub automatic_conversion: bool,
}

/// Content fingerprint tuning.
///
/// Files up to `full_hash_max_bytes` are hashed whole; larger files hash
/// their size plus the first and last `sample_bytes`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FingerprintConfig {
    pub full_hash_max_bytes: u64,
    pub sample_bytes: u64,
}

/// Filesystem paths used by cusync itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PathsConfig {
    pub config_file: PathBuf,
    pub jsonl_log: PathBuf,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("Customizing"),
            recursive: true,
            extension: "cus".to_string(),
            poll_interval_ms: 100,
        }
    }
}

impl Default for RegionsConfig {
    fn default() -> Self {
        Self {
            allowed: vec!["USA".to_string(), "KOR".to_string(), "RUS".to_string()],
            default_region: "USA".to_string(),
            automatic_conversion: false,
        }
    }
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            full_hash_max_bytes: 4 * 1024 * 1024,
            sample_bytes: 64 * 1024,
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let home_dir = env::var_os("HOME").map_or_else(
            || {
                eprintln!("[CUS-CONFIG] WARNING: HOME not set, falling back to /tmp for data paths");
                PathBuf::from("/tmp")
            },
            PathBuf::from,
        );
        Self {
            config_file: home_dir.join(".config").join("cusync").join("config.toml"),
            jsonl_log: home_dir
                .join(".local")
                .join("share")
                .join("cusync")
                .join("activity.jsonl"),
        }
    }
}

impl WatchConfig {
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl RegionsConfig {
    /// Typed view of `allowed`. Only fails on an unvalidated config.
    pub fn region_set(&self) -> Result<RegionSet> {
        RegionSet::from_codes(&self.allowed)
    }

    /// Typed view of `default_region`, checked against the allowed set.
    pub fn default_code(&self) -> Result<RegionCode> {
        self.region_set()?.resolve(&self.default_region)
    }
}

impl Config {
    /// Default configuration path.
    #[must_use]
    pub fn default_path() -> PathBuf {
        PathsConfig::default().config_file
    }

    /// Load config from default or explicit path, then apply env overrides.
    ///
    /// A missing file at the default path means defaults; a missing explicit
    /// path is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, env_var)
    }

    fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let path_buf = path.map_or_else(Self::default_path, Path::to_path_buf);
        let is_explicit_path = path.is_some();

        let mut cfg = if path_buf.exists() {
            let raw = fs::read_to_string(&path_buf)
                .map_err(|source| SyncError::io(&path_buf, source))?;
            toml::from_str::<Self>(&raw)?
        } else if is_explicit_path {
            return Err(SyncError::MissingConfig { path: path_buf });
        } else {
            Self::default()
        };

        cfg.paths.config_file = path_buf;
        cfg.apply_env_overrides_from(lookup)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Deterministic hash of the effective config for the activity log.
    ///
    /// FNV-1a, so the value is stable across processes and toolchains.
    pub fn stable_hash(&self) -> Result<String> {
        let canonical = serde_json::to_string(self)?;
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in canonical.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        Ok(format!("{hash:016x}"))
    }

    /// Render the effective config as TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn apply_env_overrides_from<F>(&mut self, mut lookup: F) -> Result<()>
    where
        F: FnMut(&str) -> Option<String>,
    {
        // watch
        if let Some(raw) = lookup("CUSYNC_WATCH_ROOT_DIR") {
            self.watch.root_dir = PathBuf::from(raw);
        }
        if let Some(raw) = lookup("CUSYNC_WATCH_RECURSIVE") {
            self.watch.recursive = parse_env_bool("CUSYNC_WATCH_RECURSIVE", &raw)?;
        }
        if let Some(raw) = lookup("CUSYNC_WATCH_EXTENSION") {
            self.watch.extension = raw;
        }
        if let Some(raw) = lookup("CUSYNC_WATCH_POLL_INTERVAL_MS") {
            self.watch.poll_interval_ms = parse_env_u64("CUSYNC_WATCH_POLL_INTERVAL_MS", &raw)?;
        }

        // regions
        if let Some(raw) = lookup("CUSYNC_REGIONS_DEFAULT") {
            self.regions.default_region = raw;
        }
        if let Some(raw) = lookup("CUSYNC_REGIONS_ALLOWED") {
            self.regions.allowed = raw
                .split(',')
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = lookup("CUSYNC_REGIONS_AUTOMATIC_CONVERSION") {
            self.regions.automatic_conversion =
                parse_env_bool("CUSYNC_REGIONS_AUTOMATIC_CONVERSION", &raw)?;
        }

        // fingerprint
        if let Some(raw) = lookup("CUSYNC_FINGERPRINT_FULL_HASH_MAX_BYTES") {
            self.fingerprint.full_hash_max_bytes =
                parse_env_u64("CUSYNC_FINGERPRINT_FULL_HASH_MAX_BYTES", &raw)?;
        }
        if let Some(raw) = lookup("CUSYNC_FINGERPRINT_SAMPLE_BYTES") {
            self.fingerprint.sample_bytes = parse_env_u64("CUSYNC_FINGERPRINT_SAMPLE_BYTES", &raw)?;
        }

        // paths
        if let Some(raw) = lookup("CUSYNC_PATHS_JSONL_LOG") {
            self.paths.jsonl_log = PathBuf::from(raw);
        }

        Ok(())
    }

    fn normalize(&mut self) {
        let s = self.watch.root_dir.to_string_lossy();
        if s.len() > 1
            && let Some(stripped) = s.strip_suffix('/')
        {
            self.watch.root_dir = PathBuf::from(stripped);
        }

        self.watch.extension = self
            .watch
            .extension
            .trim()
            .trim_start_matches('.')
            .to_ascii_lowercase();

        for code in &mut self.regions.allowed {
            *code = code.trim().to_ascii_uppercase();
        }
        self.regions.default_region = self.regions.default_region.trim().to_ascii_uppercase();
    }

    pub fn validate(&self) -> Result<()> {
        let regions = self.regions.region_set().map_err(|err| SyncError::InvalidConfig {
            details: format!("regions.allowed: {err}"),
        })?;
        if regions.resolve(&self.regions.default_region).is_err() {
            return Err(SyncError::InvalidConfig {
                details: format!(
                    "regions.default_region {:?} must be one of {regions}",
                    self.regions.default_region
                ),
            });
        }

        if self.watch.poll_interval_ms == 0 {
            return Err(SyncError::InvalidConfig {
                details: "watch.poll_interval_ms must be > 0".to_string(),
            });
        }
        if self.watch.extension.is_empty() {
            return Err(SyncError::InvalidConfig {
                details: "watch.extension must not be empty".to_string(),
            });
        }
        if self.watch.root_dir.as_os_str().is_empty() {
            return Err(SyncError::InvalidConfig {
                details: "watch.root_dir must not be empty".to_string(),
            });
        }

        if self.fingerprint.sample_bytes == 0 {
            return Err(SyncError::InvalidConfig {
                details: "fingerprint.sample_bytes must be > 0".to_string(),
            });
        }
        if self.fingerprint.sample_bytes > self.fingerprint.full_hash_max_bytes {
            return Err(SyncError::InvalidConfig {
                details: format!(
                    "fingerprint.sample_bytes ({}) must be <= fingerprint.full_hash_max_bytes ({})",
                    self.fingerprint.sample_bytes, self.fingerprint.full_hash_max_bytes
                ),
            });
        }

        Ok(())
    }
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|raw| !raw.trim().is_empty())
}

fn parse_env_u64(name: &str, raw: &str) -> Result<u64> {
    raw.trim().parse::<u64>().map_err(|error| SyncError::ConfigParse {
        context: "env",
        details: format!("{name}={raw:?}: {error}"),
    })
}

fn parse_env_bool(name: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SyncError::ConfigParse {
            context: "env",
            details: format!("{name}={raw:?}: expected a boolean"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{Config, SyncError};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_string(), (*value).to_string()))
            .collect()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn default_config_is_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.regions.region_set().unwrap().len(), 3);
        assert_eq!(cfg.regions.default_code().unwrap().to_string(), "USA");
    }

    #[test]
    fn default_region_must_be_allowed() {
        let mut cfg = Config::default();
        cfg.regions.default_region = "JPN".to_string();
        let err = cfg.validate().expect_err("expected invalid default region");
        match err {
            SyncError::InvalidConfig { details } => assert!(details.contains("JPN")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_allowed_codes_rejected() {
        let mut cfg = Config::default();
        cfg.regions.allowed = vec!["USA".to_string(), "KORE".to_string()];
        assert!(cfg.validate().is_err());

        cfg.regions.allowed = vec!["USA".to_string(), "USA".to_string()];
        assert!(cfg.validate().is_err());

        cfg.regions.allowed.clear();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_poll_interval_rejected() {
        let mut cfg = Config::default();
        cfg.watch.poll_interval_ms = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn sample_larger_than_full_hash_threshold_rejected() {
        let mut cfg = Config::default();
        cfg.fingerprint.sample_bytes = cfg.fingerprint.full_hash_max_bytes + 1;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn normalize_strips_dot_and_uppercases_regions() {
        let mut cfg = Config::default();
        cfg.watch.extension = ".CUS".to_string();
        cfg.watch.root_dir = PathBuf::from("/data/Customizing/");
        cfg.regions.allowed = vec!["usa".to_string(), " kor".to_string()];
        cfg.regions.default_region = "kor".to_string();
        cfg.normalize();

        assert_eq!(cfg.watch.extension, "cus");
        assert_eq!(cfg.watch.root_dir, Path::new("/data/Customizing"));
        assert_eq!(cfg.regions.allowed, vec!["USA", "KOR"]);
        assert_eq!(cfg.regions.default_region, "KOR");
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn normalize_keeps_filesystem_root() {
        let mut cfg = Config::default();
        cfg.watch.root_dir = PathBuf::from("/");
        cfg.normalize();
        assert_eq!(cfg.watch.root_dir, Path::new("/"));
    }

    #[test]
    fn env_overrides_apply() {
        let env = vars(&[
            ("CUSYNC_WATCH_ROOT_DIR", "/srv/cus"),
            ("CUSYNC_WATCH_RECURSIVE", "false"),
            ("CUSYNC_WATCH_POLL_INTERVAL_MS", "250"),
            ("CUSYNC_REGIONS_ALLOWED", "usa, jpn"),
            ("CUSYNC_REGIONS_DEFAULT", "jpn"),
            ("CUSYNC_REGIONS_AUTOMATIC_CONVERSION", "on"),
        ]);
        let mut cfg = Config::default();
        cfg.apply_env_overrides_from(|name| env.get(name).cloned())
            .unwrap();
        cfg.normalize();
        cfg.validate().unwrap();

        assert_eq!(cfg.watch.root_dir, Path::new("/srv/cus"));
        assert!(!cfg.watch.recursive);
        assert_eq!(cfg.watch.poll_interval_ms, 250);
        assert_eq!(cfg.regions.allowed, vec!["USA", "JPN"]);
        assert_eq!(cfg.regions.default_region, "JPN");
        assert!(cfg.regions.automatic_conversion);
    }

    #[test]
    fn env_invalid_number_rejected() {
        let env = vars(&[("CUSYNC_WATCH_POLL_INTERVAL_MS", "soon")]);
        let mut cfg = Config::default();
        let err = cfg
            .apply_env_overrides_from(|name| env.get(name).cloned())
            .expect_err("expected parse failure");
        assert!(matches!(err, SyncError::ConfigParse { context: "env", .. }));
    }

    #[test]
    fn env_invalid_boolean_rejected() {
        let env = vars(&[("CUSYNC_WATCH_RECURSIVE", "maybe")]);
        let mut cfg = Config::default();
        assert!(
            cfg.apply_env_overrides_from(|name| env.get(name).cloned())
                .is_err()
        );
    }

    #[test]
    fn load_returns_error_for_explicit_missing_path() {
        let missing = Path::new("/definitely/not/here/cusync.toml");
        let err = Config::load_with(Some(missing), no_env).expect_err("missing config");
        assert_eq!(err.code(), "CUS-1002");
    }

    #[test]
    fn load_parses_partial_file_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[watch]\nroot_dir = \"/tmp/cus/\"\nextension = \".CUS\"\n\n[regions]\ndefault_region = \"rus\"\n",
        )
        .unwrap();

        let cfg = Config::load_with(Some(&path), no_env).unwrap();
        assert_eq!(cfg.watch.root_dir, Path::new("/tmp/cus"));
        assert_eq!(cfg.watch.extension, "cus");
        assert_eq!(cfg.watch.poll_interval_ms, 100);
        assert_eq!(cfg.regions.default_region, "RUS");
        assert_eq!(cfg.paths.config_file, path);
    }

    #[test]
    fn load_reports_toml_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[watch\nroot_dir = 1").unwrap();
        let err = Config::load_with(Some(&path), no_env).unwrap_err();
        assert_eq!(err.code(), "CUS-1003");
    }

    #[test]
    fn stable_hash_changes_when_config_changes() {
        let a = Config::default();
        let mut b = Config::default();
        b.regions.automatic_conversion = true;
        assert_ne!(a.stable_hash().unwrap(), b.stable_hash().unwrap());
    }

    #[test]
    fn stable_hash_deterministic() {
        let cfg = Config::default();
        assert_eq!(cfg.stable_hash().unwrap(), cfg.stable_hash().unwrap());
        assert_eq!(cfg.stable_hash().unwrap().len(), 16);
    }

    #[test]
    fn toml_rendering_round_trips() {
        let cfg = Config::default();
        let rendered = cfg.to_toml().unwrap();
        let parsed: Config = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, cfg);
    }
}
