/// # Metadata - Database-Level State
///
/// Records the logical database name, every segment number ever allocated
/// (in creation order), and which segment is currently accepting writes.
///
/// ## File Format
///
/// Pretty-printed JSON, self-describing and versioned:
///
/// ```text
/// {
///   "version": 1,
///   "name": "kv",
///   "segment_numbers": [1, 2],
///   "active_segment": 2
/// }
/// ```
///
/// ## Crash Safety
///
/// The file is never rewritten in place. `save` writes `{path}.tmp`, fsyncs
/// it, renames it over the real file and then fsyncs the directory, so a
/// crash leaves either the old or the new metadata, never a torn file.
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Result, StoreError};

/// Current on-disk metadata format version.
pub const METADATA_VERSION: u32 = 1;

/// Suffix appended to the metadata path for the temporary file used by `save`.
const TMP_SUFFIX: &str = "tmp";

/// In-memory representation of the metadata file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Format version, see [`METADATA_VERSION`].
    pub version: u32,
    /// Logical database name, taken from the metadata file's base name.
    pub name: String,
    /// Every segment ever created, in creation order.
    pub segment_numbers: Vec<u32>,
    /// The segment currently accepting writes (`0` before the first allocation).
    pub active_segment: u32,
}

impl Metadata {
    /// Metadata for a database that has no segments yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: METADATA_VERSION,
            name: name.into(),
            segment_numbers: Vec::new(),
            active_segment: 0,
        }
    }

    /// Derives the database name from a metadata path (`/db/kv.meta` -> `kv`).
    pub fn name_from_path(path: &Path) -> Result<String> {
        path.file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                StoreError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("cannot derive a database name from {}", path.display()),
                ))
            })
    }

    /// Loads metadata from `path`.
    ///
    /// # Errors
    ///
    /// - [`StoreError::NotFound`] if the file does not exist.
    /// - [`StoreError::Corrupt`] if it cannot be parsed or is inconsistent.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let meta: Metadata = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Corrupt(format!("metadata {} failed to parse: {}", path.display(), e))
        })?;
        meta.validate()?;
        Ok(meta)
    }

    /// Checks the invariants every persisted metadata file must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.version != METADATA_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported metadata version {} (expected {})",
                self.version, METADATA_VERSION
            )));
        }
        if self.name.is_empty() {
            return Err(StoreError::Corrupt("metadata has an empty name".into()));
        }
        if self.segment_numbers.windows(2).any(|w| w[0] >= w[1]) {
            return Err(StoreError::Corrupt(format!(
                "segment numbers are not strictly increasing: {:?}",
                self.segment_numbers
            )));
        }
        match self.segment_numbers.last() {
            Some(&last) if last == self.active_segment => Ok(()),
            None if self.active_segment == 0 => Ok(()),
            _ => Err(StoreError::Corrupt(format!(
                "active segment {} is not the last of {:?}",
                self.active_segment, self.segment_numbers
            ))),
        }
    }

    /// Returns a copy with `next` allocated as the new active segment.
    #[must_use]
    pub fn with_next_segment(&self, next: u32) -> Self {
        let mut meta = self.clone();
        meta.segment_numbers.push(next);
        meta.active_segment = next;
        meta
    }

    /// Persists the metadata atomically (temp file + fsync + rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let tmp_path = Self::tmp_path(path);
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| StoreError::Corrupt(format!("failed to serialize metadata: {}", e)))?;

        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&tmp_path)?;
            f.write_all(&json)?;
            f.write_all(b"\n")?;
            f.sync_all()?;
        }

        fs::rename(&tmp_path, path)?;
        sync_parent_dir(path);

        debug!(
            path = %path.display(),
            active_segment = self.active_segment,
            segments = self.segment_numbers.len(),
            "metadata saved"
        );
        Ok(())
    }

    /// Path of the temporary file used by [`Metadata::save`].
    pub fn tmp_path(path: &Path) -> PathBuf {
        let mut name = path.as_os_str().to_owned();
        name.push(".");
        name.push(TMP_SUFFIX);
        PathBuf::from(name)
    }

    /// Removes a leftover temporary file from an interrupted save.
    ///
    /// A tmp path that cannot be removed is an error: the next
    /// [`Metadata::save`] would trip over it.
    pub fn cleanup_tmp(path: &Path) -> io::Result<()> {
        let tmp_path = Self::tmp_path(path);
        if !tmp_path.exists() {
            return Ok(());
        }
        warn!(path = %tmp_path.display(), "removing leftover metadata tmp file");
        fs::remove_file(&tmp_path).map_err(|e| {
            warn!(
                path = %tmp_path.display(),
                error = %e,
                "failed to remove leftover metadata tmp file"
            );
            io::Error::new(
                e.kind(),
                format!("cannot remove {}: {}", tmp_path.display(), e),
            )
        })
    }
}

/// Makes the rename durable. Directories cannot be opened for sync on
/// Windows, so this is a no-op there.
fn sync_parent_dir(path: &Path) {
    #[cfg(unix)]
    {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}
