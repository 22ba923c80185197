//! # Config - Store Configuration
//!
//! Settings needed to open a CaskKV store: where the files live, the logical
//! database name, when to rotate the active segment, and whether appends are
//! fsynced before they are acknowledged.
//!
//! ```text
//! CASK_DIR         database directory              (default: "data")
//! CASK_NAME        logical database name           (default: "cask")
//! CASK_SEGMENT_KB  rotation threshold in KiB       (default: 65536 = 64 MiB)
//! CASK_SYNC        fsync every append              (default: "true")
//! ```

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default rotation threshold for the active segment (64 MiB).
pub const DEFAULT_SEGMENT_SIZE_LIMIT: u64 = 64 * 1024 * 1024;

/// Smallest accepted rotation threshold. Anything at or below a bare record
/// header would rotate after every append of an empty record.
pub const MIN_SEGMENT_SIZE_LIMIT: u64 = 21;

/// Value offsets are stored as `u32` in hint files, so a segment may never
/// grow past this before rotating.
pub const MAX_SEGMENT_SIZE_LIMIT: u64 = u32::MAX as u64;

/// Extension of the metadata file.
pub const METADATA_EXTENSION: &str = "meta";

/// Rejected configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("database name must not be empty")]
    EmptyName,

    #[error("database name {0:?} must not contain path separators or '.'")]
    InvalidName(String),

    #[error("segment size limit {limit} out of range ({min}..={max})")]
    SegmentSizeLimit { limit: u64, min: u64, max: u64 },
}

/// Configuration for opening a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding the metadata file and every segment pair.
    pub dir: PathBuf,
    /// Logical database name; file names are derived from it.
    pub name: String,
    /// Active data file size (bytes) at which the segment is rotated.
    pub segment_size_limit: u64,
    /// If `true`, every append is fsynced before it is acknowledged.
    pub sync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            name: "cask".to_string(),
            segment_size_limit: DEFAULT_SEGMENT_SIZE_LIMIT,
            sync: true,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration for `name` inside `dir` with default limits.
    pub fn new<P: AsRef<Path>>(dir: P, name: impl Into<String>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Reads the configuration from `CASK_*` environment variables, falling
    /// back to the defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let segment_kb = env_or("CASK_SEGMENT_KB", "")
            .parse::<u64>()
            .unwrap_or(defaults.segment_size_limit / 1024);

        Self {
            dir: PathBuf::from(env_or("CASK_DIR", "data")),
            name: env_or("CASK_NAME", &defaults.name),
            segment_size_limit: segment_kb.saturating_mul(1024),
            sync: env_or("CASK_SYNC", "true").parse().unwrap_or(defaults.sync),
        }
    }

    /// Sets the rotation threshold in bytes.
    #[must_use]
    pub fn with_segment_size_limit(mut self, limit: u64) -> Self {
        self.segment_size_limit = limit;
        self
    }

    /// Enables or disables fsync on every append.
    #[must_use]
    pub fn with_sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Path of the metadata file: `{dir}/{name}.meta`.
    #[must_use]
    pub fn metadata_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}.{}", self.name, METADATA_EXTENSION))
    }

    /// Checks the name and the rotation threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.name.contains(['/', '\\', '.']) {
            return Err(ConfigError::InvalidName(self.name.clone()));
        }
        validate_segment_size_limit(self.segment_size_limit)
    }
}

/// Checks that a rotation threshold is usable.
pub fn validate_segment_size_limit(limit: u64) -> Result<(), ConfigError> {
    if !(MIN_SEGMENT_SIZE_LIMIT..=MAX_SEGMENT_SIZE_LIMIT).contains(&limit) {
        return Err(ConfigError::SegmentSizeLimit {
            limit,
            min: MIN_SEGMENT_SIZE_LIMIT,
            max: MAX_SEGMENT_SIZE_LIMIT,
        });
    }
    Ok(())
}

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_path_uses_name() {
        let cfg = StoreConfig::new("/tmp/db", "kv");
        assert_eq!(cfg.metadata_path(), PathBuf::from("/tmp/db/kv.meta"));
    }

    #[test]
    fn defaults_are_valid() {
        assert_eq!(StoreConfig::default().validate(), Ok(()));
    }

    #[test]
    fn builder_setters() {
        let cfg = StoreConfig::new("d", "kv")
            .with_segment_size_limit(4096)
            .with_sync(false);
        assert_eq!(cfg.segment_size_limit, 4096);
        assert!(!cfg.sync);
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(
            StoreConfig::new("d", "").validate(),
            Err(ConfigError::EmptyName)
        );
        assert!(matches!(
            StoreConfig::new("d", "a/b").validate(),
            Err(ConfigError::InvalidName(_))
        ));
        assert!(matches!(
            StoreConfig::new("d", "kv.meta").validate(),
            Err(ConfigError::InvalidName(_))
        ));
    }

    #[test]
    fn rejects_out_of_range_limits() {
        assert!(validate_segment_size_limit(20).is_err());
        assert!(validate_segment_size_limit(21).is_ok());
        assert!(validate_segment_size_limit(u32::MAX as u64).is_ok());
        assert!(validate_segment_size_limit(u32::MAX as u64 + 1).is_err());
    }
}
