//! # Record - Segment and Hint Codec
//!
//! Binary encoding for the two append-only file kinds of a CaskKV segment:
//! the **data file**, which holds full records, and the **hint file**, which
//! holds just enough metadata to rebuild the key index without touching value
//! bytes.
//!
//! ## Data record
//!
//! ```text
//! [checksum: u32][timestamp: u64][key_size: u32][value_size: u32][key][value]
//! ```
//!
//! The header is [`RECORD_HEADER_SIZE`] (20) bytes, so an encoded record is
//! exactly `20 + key_size + value_size` bytes long. The checksum is a CRC-32
//! over everything after itself: `timestamp | key_size | value_size | key | value`.
//!
//! ## Hint entry
//!
//! ```text
//! [timestamp: u64][key_size: u32][value_size: u32][value_offset: u32][key]
//! ```
//!
//! `value_offset` is the absolute byte position of the value payload inside
//! the matching data file.
//!
//! All integers are little-endian. Field order and widths are the on-disk
//! format: changing either breaks every existing segment.
//!
//! ## Example
//!
//! ```rust
//! use record::Record;
//!
//! let rec = Record::new(1_700_000_000, b"hello".to_vec(), b"world".to_vec());
//! let bytes = rec.encode().unwrap();
//! assert_eq!(bytes.len(), 20 + 5 + 5);
//!
//! let back = Record::decode(&bytes).unwrap();
//! assert_eq!(back, rec);
//! assert!(back.verify_checksum());
//! ```

mod scan;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read};

use thiserror::Error;

pub use scan::{DataScanner, HintScanner, ScanSummary};

/// Size of the fixed data-record header in bytes:
/// 4 (`checksum`) + 8 (`timestamp`) + 4 (`key_size`) + 4 (`value_size`).
pub const RECORD_HEADER_SIZE: usize = 4 + 8 + 4 + 4;

/// Size of the fixed hint-entry header in bytes:
/// 8 (`timestamp`) + 4 (`key_size`) + 4 (`value_size`) + 4 (`value_offset`).
pub const HINT_HEADER_SIZE: usize = 8 + 4 + 4 + 4;

/// Largest key a scanner will accept before declaring the file corrupt.
pub const MAX_SCAN_KEY_SIZE: u32 = 64 * 1024 * 1024;

/// Largest value a scanner will accept before declaring the file corrupt.
pub const MAX_SCAN_VALUE_SIZE: u32 = 1024 * 1024 * 1024;

/// Errors produced while encoding or decoding records and hint entries.
#[derive(Debug, Error)]
pub enum CodecError {
    /// An underlying I/O error (only produced by the scanners).
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The bytes do not form a valid entry.
    #[error("corrupt entry: {0}")]
    Corrupt(String),

    /// A key or value does not fit in the 32-bit size field.
    #[error("{field} too large: {len} bytes (max {max})")]
    TooLarge {
        /// Which field overflowed (`"key"` or `"value"`).
        field: &'static str,
        /// The offending length.
        len: usize,
        /// The largest encodable length.
        max: u64,
    },
}

/// A logical data record as stored in a segment data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// CRC-32 over `timestamp | key_size | value_size | key | value`.
    pub checksum: u32,
    /// Creation time of the record (seconds since the Unix epoch).
    pub timestamp: u64,
    /// The lookup key.
    pub key: Vec<u8>,
    /// The payload value.
    pub value: Vec<u8>,
}

impl Record {
    /// Builds a record and fills in its checksum.
    pub fn new(timestamp: u64, key: Vec<u8>, value: Vec<u8>) -> Self {
        let checksum = compute_checksum(timestamp, &key, &value);
        Self {
            checksum,
            timestamp,
            key,
            value,
        }
    }

    /// Length of the record once encoded: `20 + key_size + value_size`.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_SIZE + self.key.len() + self.value.len()
    }

    /// Recomputes the checksum from the current fields.
    #[must_use]
    pub fn computed_checksum(&self) -> u32 {
        compute_checksum(self.timestamp, &self.key, &self.value)
    }

    /// Returns `true` if the stored checksum matches the fields.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        self.checksum == self.computed_checksum()
    }

    /// Encodes the record into a freshly allocated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Appends the encoded record to `buf`.
    ///
    /// The checksum is recomputed from the fields rather than copied from
    /// `self.checksum`, so the bytes on disk are always self-consistent.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        let key_size = size_field("key", self.key.len())?;
        let value_size = size_field("value", self.value.len())?;

        buf.reserve(self.encoded_len());
        buf.write_u32::<LittleEndian>(self.computed_checksum())?;
        buf.write_u64::<LittleEndian>(self.timestamp)?;
        buf.write_u32::<LittleEndian>(key_size)?;
        buf.write_u32::<LittleEndian>(value_size)?;
        buf.extend_from_slice(&self.key);
        buf.extend_from_slice(&self.value);
        Ok(())
    }

    /// Decodes exactly one record from `bytes`.
    ///
    /// Fails with [`CodecError::Corrupt`] if `bytes` is shorter than the
    /// header or its length disagrees with the declared sizes. The checksum is
    /// **not** verified here; see [`Record::verify_checksum`].
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < RECORD_HEADER_SIZE {
            return Err(CodecError::Corrupt(format!(
                "record needs at least {} header bytes, got {}",
                RECORD_HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut rdr = bytes;
        let checksum = rdr.read_u32::<LittleEndian>()?;
        let timestamp = rdr.read_u64::<LittleEndian>()?;
        let key_size = rdr.read_u32::<LittleEndian>()? as usize;
        let value_size = rdr.read_u32::<LittleEndian>()? as usize;

        let expected = RECORD_HEADER_SIZE as u64 + key_size as u64 + value_size as u64;
        if expected != bytes.len() as u64 {
            return Err(CodecError::Corrupt(format!(
                "record declares key_size={} value_size={} ({} bytes) but {} bytes were given",
                key_size,
                value_size,
                expected,
                bytes.len()
            )));
        }

        let mut key = vec![0u8; key_size];
        rdr.read_exact(&mut key)?;
        let mut value = vec![0u8; value_size];
        rdr.read_exact(&mut value)?;

        Ok(Self {
            checksum,
            timestamp,
            key,
            value,
        })
    }
}

/// One hint-file entry: where the latest value for `key` lives in the
/// matching data file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HintEntry {
    /// Timestamp copied from the data record.
    pub timestamp: u64,
    /// Size of the value payload in bytes.
    pub value_size: u32,
    /// Absolute byte offset of the value payload within the data file.
    pub value_offset: u32,
    /// The lookup key.
    pub key: Vec<u8>,
}

impl HintEntry {
    /// Length of the entry once encoded: `20 + key_size`.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        HINT_HEADER_SIZE + self.key.len()
    }

    /// Appends the encoded entry to `buf`.
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<(), CodecError> {
        let key_size = size_field("key", self.key.len())?;

        buf.reserve(self.encoded_len());
        buf.write_u64::<LittleEndian>(self.timestamp)?;
        buf.write_u32::<LittleEndian>(key_size)?;
        buf.write_u32::<LittleEndian>(self.value_size)?;
        buf.write_u32::<LittleEndian>(self.value_offset)?;
        buf.extend_from_slice(&self.key);
        Ok(())
    }

    /// Encodes the entry into a freshly allocated buffer.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Decodes exactly one hint entry from `bytes`.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() < HINT_HEADER_SIZE {
            return Err(CodecError::Corrupt(format!(
                "hint entry needs at least {} header bytes, got {}",
                HINT_HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut rdr = bytes;
        let timestamp = rdr.read_u64::<LittleEndian>()?;
        let key_size = rdr.read_u32::<LittleEndian>()? as usize;
        let value_size = rdr.read_u32::<LittleEndian>()?;
        let value_offset = rdr.read_u32::<LittleEndian>()?;

        if HINT_HEADER_SIZE + key_size != bytes.len() {
            return Err(CodecError::Corrupt(format!(
                "hint entry declares key_size={} but {} bytes were given",
                key_size,
                bytes.len()
            )));
        }

        let mut key = vec![0u8; key_size];
        rdr.read_exact(&mut key)?;

        Ok(Self {
            timestamp,
            value_size,
            value_offset,
            key,
        })
    }
}

/// CRC-32 over `timestamp | key_size | value_size | key | value`, hashed
/// field by field so no intermediate buffer is needed.
fn compute_checksum(timestamp: u64, key: &[u8], value: &[u8]) -> u32 {
    let mut hasher = Crc32::new();
    hasher.update(&timestamp.to_le_bytes());
    hasher.update(&(key.len() as u32).to_le_bytes());
    hasher.update(&(value.len() as u32).to_le_bytes());
    hasher.update(key);
    hasher.update(value);
    hasher.finalize()
}

fn size_field(field: &'static str, len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::TooLarge {
        field,
        len,
        max: u32::MAX as u64,
    })
}
