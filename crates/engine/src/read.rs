/// Read path: `read_value()`, `read_record()`, and whole-segment replay.
///
/// Point reads resolve the location's segment handle, release the map lock,
/// and read at the stored offset. A read that comes back short is reported as
/// [`StoreError::OutOfRange`] and never retried.
use record::{DataScanner, HintEntry, HintScanner, Record, ScanSummary};

use crate::segment::SegmentHandle;
use crate::{LocationRecord, Result, Store, StoreError};

impl Store {
    /// Reads the value bytes a location points at.
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownSegment`] if the segment has no read handle.
    /// - [`StoreError::OutOfRange`] if the file ends before `value_size` bytes.
    ///   Checked against the file length before the buffer is allocated, so a
    ///   bogus location cannot request an arbitrarily large buffer.
    pub fn read_value(&self, location: &LocationRecord) -> Result<Vec<u8>> {
        let handle = self.files.resolve_read_handle(location.segment)?;
        let offset = location.value_offset as u64;
        check_in_bounds(&handle, offset, location.value_size as usize)?;
        let mut buf = vec![0u8; location.value_size as usize];
        let n = handle.read_full_at(&mut buf, offset)?;
        if n < buf.len() {
            return Err(StoreError::OutOfRange {
                offset,
                expected: buf.len(),
                actual: n,
            });
        }
        Ok(buf)
    }

    /// Reads and verifies the full record a location points at.
    ///
    /// Reads `20 + key_size + value_size` bytes starting at
    /// `value_offset - key_size - 20`, decodes them, and checks the checksum.
    /// Meant for recovery and verification; the hot path is
    /// [`Store::read_value`].
    ///
    /// # Errors
    ///
    /// - [`StoreError::UnknownSegment`] if the segment has no read handle.
    /// - [`StoreError::OutOfRange`] on a short read (e.g. truncated file).
    /// - [`StoreError::Corrupt`] if the bytes do not decode or the checksum
    ///   does not match.
    pub fn read_record(&self, location: &LocationRecord) -> Result<Record> {
        let offset = location.record_offset().ok_or_else(|| {
            StoreError::Corrupt(format!(
                "location value_offset {} is smaller than key_size {} + header",
                location.value_offset, location.key_size
            ))
        })?;
        let handle = self.files.resolve_read_handle(location.segment)?;
        check_in_bounds(&handle, offset, location.record_len())?;

        let mut buf = vec![0u8; location.record_len()];
        let n = handle.read_full_at(&mut buf, offset)?;
        if n < buf.len() {
            return Err(StoreError::OutOfRange {
                offset,
                expected: buf.len(),
                actual: n,
            });
        }

        let record = Record::decode(&buf)?;
        if !record.verify_checksum() {
            return Err(StoreError::Corrupt(format!(
                "checksum mismatch for record at segment {} offset {}",
                location.segment, offset
            )));
        }
        Ok(record)
    }

    /// Replays the hint file of `segment`, pairing every entry with the
    /// location it describes. This is what an index rebuild consumes after a
    /// restart.
    pub fn read_hints(&self, segment: u32) -> Result<Vec<(HintEntry, LocationRecord)>> {
        self.files.resolve_read_handle(segment)?;

        let mut out = Vec::new();
        HintScanner::open(self.files.hint_path(segment))?.replay(|entry| {
            let location = LocationRecord {
                segment,
                value_offset: entry.value_offset,
                value_size: entry.value_size,
                key_size: entry.key.len() as u32,
                timestamp: entry.timestamp,
            };
            out.push((entry, location));
        })?;
        Ok(out)
    }

    /// Replays every record of `segment`'s data file, verifying checksums.
    /// `apply` receives each record's start offset.
    pub fn scan_segment<F>(&self, segment: u32, apply: F) -> Result<ScanSummary>
    where
        F: FnMut(u64, Record),
    {
        let handle = self.files.resolve_read_handle(segment)?;
        let summary = DataScanner::open(handle.path())?.replay(apply)?;
        Ok(summary)
    }
}

/// Fails with `OutOfRange` when `[offset, offset + len)` extends past the end
/// of the file. The positioned read still checks for a short count.
fn check_in_bounds(handle: &SegmentHandle, offset: u64, len: usize) -> Result<()> {
    let file_len = handle.len()?;
    let available = file_len.saturating_sub(offset);
    if (len as u64) > available {
        return Err(StoreError::OutOfRange {
            offset,
            expected: len,
            actual: available as usize,
        });
    }
    Ok(())
}
