//! Sequential replay of whole data and hint files.
//!
//! Both scanners are generic over any `Read` implementor so tests can feed
//! them in-memory buffers. A partially written tail entry (crash mid-append)
//! ends the replay cleanly: every complete entry before it is still yielded
//! and the returned [`ScanSummary`] says where the valid prefix ends.

use byteorder::{LittleEndian, ReadBytesExt};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::warn;

use crate::{
    CodecError, HintEntry, Record, HINT_HEADER_SIZE, MAX_SCAN_KEY_SIZE, MAX_SCAN_VALUE_SIZE,
    RECORD_HEADER_SIZE,
};

/// Outcome of a full replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSummary {
    /// Number of complete entries yielded.
    pub entries: usize,
    /// Byte length of the valid prefix (start of the truncated tail, if any).
    pub valid_len: u64,
    /// `true` if trailing bytes did not form a complete entry.
    pub truncated: bool,
}

/// Replays every record of a segment data file, verifying checksums.
pub struct DataScanner<R: Read> {
    rdr: BufReader<R>,
}

impl DataScanner<File> {
    /// Opens a data file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CodecError> {
        Ok(Self::from_reader(File::open(path)?))
    }
}

impl<R: Read> DataScanner<R> {
    /// Constructs a scanner from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        Self {
            rdr: BufReader::new(reader),
        }
    }

    /// Calls `apply(offset, record)` for every complete record, where
    /// `offset` is the position of the record's first header byte.
    ///
    /// # Termination
    ///
    /// - **Clean EOF** -> `Ok` with `truncated = false`.
    /// - **Truncated tail** -> `Ok` with `truncated = true`.
    /// - **Checksum mismatch** or absurd sizes -> `Err(CodecError::Corrupt)`.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<ScanSummary, CodecError>
    where
        F: FnMut(u64, Record),
    {
        let mut summary = ScanSummary::default();
        let mut header = [0u8; RECORD_HEADER_SIZE];
        let mut body = Vec::with_capacity(256);

        loop {
            let n = read_full(&mut self.rdr, &mut header)?;
            if n == 0 {
                return Ok(summary);
            }
            if n < RECORD_HEADER_SIZE {
                return Ok(truncated_tail(summary, "data"));
            }

            let mut hdr = &header[4..];
            let _timestamp = hdr.read_u64::<LittleEndian>()?;
            let key_size = hdr.read_u32::<LittleEndian>()?;
            let value_size = hdr.read_u32::<LittleEndian>()?;
            if key_size > MAX_SCAN_KEY_SIZE || value_size > MAX_SCAN_VALUE_SIZE {
                return Err(CodecError::Corrupt(format!(
                    "record at offset {} declares implausible sizes (key={}, value={})",
                    summary.valid_len, key_size, value_size
                )));
            }

            let body_len = key_size as usize + value_size as usize;
            body.clear();
            body.extend_from_slice(&header);
            body.resize(RECORD_HEADER_SIZE + body_len, 0);
            let n = read_full(&mut self.rdr, &mut body[RECORD_HEADER_SIZE..])?;
            if n < body_len {
                return Ok(truncated_tail(summary, "data"));
            }

            let record = Record::decode(&body)?;
            if !record.verify_checksum() {
                return Err(CodecError::Corrupt(format!(
                    "checksum mismatch for record at offset {}",
                    summary.valid_len
                )));
            }

            apply(summary.valid_len, record);
            summary.entries += 1;
            summary.valid_len += body.len() as u64;
        }
    }
}

/// Replays every entry of a segment hint file.
pub struct HintScanner<R: Read> {
    rdr: BufReader<R>,
}

impl HintScanner<File> {
    /// Opens a hint file for sequential replay.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, CodecError> {
        Ok(Self::from_reader(File::open(path)?))
    }
}

impl<R: Read> HintScanner<R> {
    /// Constructs a scanner from any `Read` implementor.
    pub fn from_reader(reader: R) -> Self {
        Self {
            rdr: BufReader::new(reader),
        }
    }

    /// Calls `apply(entry)` for every complete hint entry.
    ///
    /// Hint entries carry no checksum of their own; a truncated tail ends the
    /// replay and implausible key sizes are reported as corruption.
    pub fn replay<F>(&mut self, mut apply: F) -> Result<ScanSummary, CodecError>
    where
        F: FnMut(HintEntry),
    {
        let mut summary = ScanSummary::default();
        let mut header = [0u8; HINT_HEADER_SIZE];
        let mut body = Vec::with_capacity(64);

        loop {
            let n = read_full(&mut self.rdr, &mut header)?;
            if n == 0 {
                return Ok(summary);
            }
            if n < HINT_HEADER_SIZE {
                return Ok(truncated_tail(summary, "hint"));
            }

            let key_size = (&header[8..12]).read_u32::<LittleEndian>()?;
            if key_size > MAX_SCAN_KEY_SIZE {
                return Err(CodecError::Corrupt(format!(
                    "hint entry at offset {} declares implausible key size {}",
                    summary.valid_len, key_size
                )));
            }

            body.clear();
            body.extend_from_slice(&header);
            body.resize(HINT_HEADER_SIZE + key_size as usize, 0);
            let n = read_full(&mut self.rdr, &mut body[HINT_HEADER_SIZE..])?;
            if n < key_size as usize {
                return Ok(truncated_tail(summary, "hint"));
            }

            apply(HintEntry::decode(&body)?);
            summary.entries += 1;
            summary.valid_len += body.len() as u64;
        }
    }
}

fn truncated_tail(mut summary: ScanSummary, kind: &str) -> ScanSummary {
    warn!(
        kind,
        valid_len = summary.valid_len,
        entries = summary.entries,
        "ignoring truncated tail entry"
    );
    summary.truncated = true;
    summary
}

/// Reads until `buf` is full or EOF, returning the number of bytes read.
fn read_full<R: Read>(rdr: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match rdr.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
