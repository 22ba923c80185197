/// Error taxonomy of the segment storage layer.
///
/// Nothing is retried internally: the engine cannot tell a transient storage
/// failure from a permanent one, so every error reaches the caller.
use std::io;
use std::path::PathBuf;

use config::ConfigError;
use record::CodecError;
use thiserror::Error;

use crate::LocationRecord;

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The metadata file does not exist. `Store::open` treats this as the
    /// signal to create a new database.
    #[error("metadata not found at {}", .0.display())]
    NotFound(PathBuf),

    /// Metadata or a record failed to parse, decode, or verify.
    #[error("corrupt data: {0}")]
    Corrupt(String),

    /// A location names a segment the store has no read handle for.
    #[error("unknown segment {0}")]
    UnknownSegment(u32),

    /// An append or rotation failed; the write must not be treated as durable.
    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    /// A positioned read returned fewer bytes than the location promised.
    #[error("short read at offset {offset}: expected {expected} bytes, got {actual}")]
    OutOfRange {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    /// A previous rotation failed; the store refuses further writes.
    #[error("store halted: {0}")]
    Halted(String),

    /// The record is durable at `location`, but the rotation that followed it
    /// failed and the store halted. The location may be published.
    #[error(
        "record written to segment {} at offset {} but the store halted: {reason}",
        .location.segment,
        .location.value_offset
    )]
    HaltedAfterWrite {
        location: LocationRecord,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Any other I/O failure (opening files, reading metadata, ...).
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl From<CodecError> for StoreError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Io(io_err) => StoreError::Io(io_err),
            other => StoreError::Corrupt(other.to_string()),
        }
    }
}
