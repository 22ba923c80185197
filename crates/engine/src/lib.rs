//! # Engine - CaskKV Segment Storage Layer
//!
//! The durable core of a Bitcask-style store: append-only segment files, a
//! parallel hint file per segment, active-segment rotation, and positioned
//! reads of historical values. The key index, the get/put/delete API and
//! compaction live outside this crate and drive it through [`Store::append`]
//! and [`LocationRecord`].
//!
//! ## Architecture
//!
//! ```text
//! Caller (index owner)
//!   |                               ^
//!   | append(key, value)            | LocationRecord
//!   v                               |
//! ┌───────────────────────────────────────────────┐
//! │                    STORE                      │
//! │                                               │
//! │ write.rs → encode → data append → hint append │
//! │              |        (writer mutex held)     │
//! │              |  (active size >= limit?)       │
//! │              |            yes                 │
//! │              v                                │
//! │ rotate.rs → new {name}_{n+1}.data/.hint       │
//! │              → {name}.meta (tmp + rename)     │
//! │                                               │
//! │ read.rs → Arc<SegmentHandle> → pread          │
//! │            (no lock held while reading)       │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module       | Purpose                                                 |
//! |--------------|---------------------------------------------------------|
//! | [`lib.rs`]   | `Store`, `LocationRecord`, open/accessors, `Debug`      |
//! | [`metadata`] | Database metadata, atomic persistence                   |
//! | [`segment`]  | Segment File Set: active pair + read handles            |
//! | [`write`]    | `append()`, `append_record()`                           |
//! | [`recovery`] | Torn-tail repair of the active pair on open             |
//! | [`rotate`]   | Rotation under the writer lock                          |
//! | [`read`]     | `read_value()`, `read_record()`, hint/data replay       |
//!
//! ## Crash Safety
//!
//! A record is acknowledged only after both its data bytes and its hint entry
//! have been written (and fsynced when `sync` is on). Metadata is replaced
//! atomically. A failed rotation halts the store instead of letting writes
//! continue against a half-rotated state.
//! On reopen, a torn tail in the active segment pair is cut off before the
//! first append, so records written after a crash stay reachable.
mod error;
pub mod metadata;
mod read;
mod recovery;
mod rotate;
pub mod segment;
mod write;

pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use metadata::Metadata;
pub use record::{HintEntry, Record, ScanSummary, HINT_HEADER_SIZE, RECORD_HEADER_SIZE};
pub use segment::{SegmentFileSet, SegmentHandle};

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Where a value lives: returned by every append and consumed by the caller's
/// index.
///
/// The location names its segment by number; the handle itself stays owned by
/// the store's [`SegmentFileSet`] and is resolved on each read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocationRecord {
    /// Segment the value lives in.
    pub segment: u32,
    /// Absolute byte offset of the value payload within the data file.
    pub value_offset: u32,
    /// Size of the value payload in bytes.
    pub value_size: u32,
    /// Size of the key, needed to locate the start of the full record.
    pub key_size: u32,
    /// Timestamp of the record.
    pub timestamp: u64,
}

impl LocationRecord {
    /// Byte offset of the start of the full record:
    /// `value_offset - key_size - 20`. `None` if the location is inconsistent.
    #[must_use]
    pub fn record_offset(&self) -> Option<u64> {
        (self.value_offset as u64).checked_sub(self.key_size as u64 + RECORD_HEADER_SIZE as u64)
    }

    /// Length of the full encoded record: `20 + key_size + value_size`.
    #[must_use]
    pub fn record_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key_size as usize + self.value_size as usize
    }
}

/// A segment store instance.
///
/// `Store` is `Send + Sync`: share it by reference or wrap it in an `Arc`.
/// Appends are serialized behind one writer lock; reads run concurrently with
/// each other and with appends.
///
/// # Write Path
///
/// 1. Encode the record.
/// 2. Append it to the active data file and its hint entry to the hint file.
/// 3. If the active data file reached `segment_size_limit`, rotate before
///    returning.
///
/// # Read Path
///
/// Resolve the location's segment handle, then read at the stored offset.
pub struct Store {
    pub(crate) files: SegmentFileSet,
    /// Active data file size (bytes) that triggers rotation.
    pub(crate) segment_size_limit: u64,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = self.files.metadata();
        f.debug_struct("Store")
            .field("name", &meta.name)
            .field("dir", &self.files.dir)
            .field("active_segment", &meta.active_segment)
            .field("segment_count", &meta.segment_numbers.len())
            .field("active_len", &self.files.active_len())
            .field("segment_size_limit", &self.segment_size_limit)
            .field("sync", &self.files.sync)
            .field("halted", &self.halted_reason())
            .finish()
    }
}

impl Store {
    /// Opens (or creates) the store described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        Self::open_path(&config.metadata_path(), config.segment_size_limit, config.sync)
    }

    /// Opens (or creates) the store whose metadata file is `metadata_path`.
    /// Segment files live next to it.
    ///
    /// # Arguments
    ///
    /// * `metadata_path`: metadata file; its base name is the database name.
    /// * `segment_size_limit`: active data size (bytes) that triggers rotation.
    /// * `sync`: if `true`, every append is fsynced before it returns.
    pub fn open_path(metadata_path: &Path, segment_size_limit: u64, sync: bool) -> Result<Self> {
        config::validate_segment_size_limit(segment_size_limit)?;
        let files = SegmentFileSet::open_or_create(metadata_path, sync)?;
        info!(
            name = %files.name(),
            segment_size_limit,
            sync,
            "store ready"
        );
        Ok(Self {
            files,
            segment_size_limit,
        })
    }

    /// The underlying file set.
    #[must_use]
    pub fn files(&self) -> &SegmentFileSet {
        &self.files
    }

    /// Snapshot of the current metadata.
    #[must_use]
    pub fn metadata(&self) -> Metadata {
        self.files.metadata()
    }

    /// Segment currently accepting writes.
    #[must_use]
    pub fn active_segment(&self) -> u32 {
        self.files.writer.lock().metadata.active_segment
    }

    /// Every segment ever created, in creation order.
    #[must_use]
    pub fn segment_numbers(&self) -> Vec<u32> {
        self.files.writer.lock().metadata.segment_numbers.clone()
    }

    /// Rotation threshold in bytes.
    #[must_use]
    pub fn segment_size_limit(&self) -> u64 {
        self.segment_size_limit
    }

    /// Why the store stopped accepting writes, if it did.
    #[must_use]
    pub fn halted_reason(&self) -> Option<String> {
        self.files.writer.lock().halted.clone()
    }
}

#[cfg(test)]
mod tests;
