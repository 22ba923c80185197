/// Write path: `append()`, `append_record()`, and `force_rotate()`.
///
/// Every append runs under the writer lock: encode, write the data record,
/// write the hint entry, optionally fsync, then check the rotation threshold
/// inside the same critical section.
use record::{HintEntry, Record, RECORD_HEADER_SIZE};
use std::io::{self, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{error, trace};

use crate::segment::{ActiveSegment, WriterState};
use crate::{LocationRecord, Result, Store, StoreError};

impl Store {
    /// Appends `key -> value` stamped with the current time (seconds since the
    /// Unix epoch) and returns where the value was written.
    ///
    /// # Errors
    ///
    /// [`StoreError::WriteFailed`] if the record could not be written (the
    /// location must then not be published), [`StoreError::HaltedAfterWrite`]
    /// if it was written but the rotation after it failed,
    /// [`StoreError::Halted`] if an earlier rotation failed.
    pub fn append(&self, key: Vec<u8>, value: Vec<u8>) -> Result<LocationRecord> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.append_record(&Record::new(timestamp, key, value))
    }

    /// Appends a fully formed record.
    ///
    /// # Steps
    ///
    /// 1. Encode the record.
    /// 2. Append it to the active data file in a single write.
    /// 3. `value_offset = record_start + 20 + key_size`, from the tracked
    ///    cursor rather than a `stat` of the file.
    /// 4. Append the hint entry to the active hint file.
    /// 5. fsync both files when `sync` is on.
    /// 6. Rotate if the data file reached `segment_size_limit`.
    ///
    /// A failed write is rolled back by truncating both files to their
    /// previous lengths; if even that fails the store halts.
    ///
    /// If the record is written but the rotation after it fails, the store
    /// halts and [`StoreError::HaltedAfterWrite`] carries the location: the
    /// record is durable and a hint replay of its segment finds it.
    pub fn append_record(&self, record: &Record) -> Result<LocationRecord> {
        let mut state = self.files.writer.lock();
        if let Some(reason) = &state.halted {
            return Err(StoreError::Halted(reason.clone()));
        }

        let location = {
            let sync = self.files.sync;
            let active = state
                .active
                .as_mut()
                .ok_or_else(|| StoreError::Halted("no active segment".into()))?;
            match write_to_active(active, record, sync) {
                Ok(location) => location,
                Err(AppendError::Rejected(e)) => return Err(e),
                Err(AppendError::Failed(e)) => return Err(self.roll_back(&mut state, e)),
            }
        };

        trace!(
            segment = location.segment,
            value_offset = location.value_offset,
            value_size = location.value_size,
            "record appended"
        );

        let active_len = state.active.as_ref().map(|a| a.data_len).unwrap_or(0);
        if active_len >= self.segment_size_limit {
            if let Err(e) = self.files.rotate(&mut state) {
                return Err(StoreError::HaltedAfterWrite {
                    location,
                    reason: e.to_string(),
                });
            }
        }

        Ok(location)
    }

    /// Rotates the active segment now, regardless of its size.
    ///
    /// A no-op when the active data file is still empty, so repeated calls do
    /// not leave a trail of empty segments.
    pub fn force_rotate(&self) -> Result<()> {
        let mut state = self.files.writer.lock();
        if let Some(reason) = &state.halted {
            return Err(StoreError::Halted(reason.clone()));
        }
        match &state.active {
            Some(active) if active.data_len == 0 => Ok(()),
            _ => self.files.rotate(&mut state),
        }
    }

    /// Truncates the active pair back to its last acknowledged length after a
    /// failed append. Halts the store if the files cannot be restored, since
    /// the cursors would no longer match the file contents.
    fn roll_back(&self, state: &mut WriterState, cause: io::Error) -> StoreError {
        let restored = match state.active.as_ref() {
            Some(active) => active
                .data
                .set_len(active.data_len)
                .and_then(|()| active.hint.set_len(active.hint_len)),
            None => Ok(()),
        };

        if let Err(e) = restored {
            let reason = format!(
                "append failed ({}) and the active segment could not be restored: {}",
                cause, e
            );
            error!(name = %self.files.name, "{}", reason);
            state.halted = Some(reason);
            state.active = None;
        }
        StoreError::WriteFailed(cause)
    }
}

enum AppendError {
    /// Nothing was written; the store is unaffected.
    Rejected(StoreError),
    /// Bytes may have reached the files and must be rolled back.
    Failed(io::Error),
}

fn write_to_active(
    active: &mut ActiveSegment,
    record: &Record,
    sync: bool,
) -> std::result::Result<LocationRecord, AppendError> {
    active.data_buf.clear();
    record
        .encode_into(&mut active.data_buf)
        .map_err(|e| AppendError::Rejected(invalid_input(e.to_string())))?;

    let key_size = record.key.len() as u32;
    let value_size = record.value.len() as u32;
    let value_offset = active.data_len + RECORD_HEADER_SIZE as u64 + key_size as u64;
    let value_offset = u32::try_from(value_offset).map_err(|_| {
        AppendError::Rejected(invalid_input(format!(
            "value offset {} does not fit the 32-bit hint field",
            value_offset
        )))
    })?;

    let hint = HintEntry {
        timestamp: record.timestamp,
        value_size,
        value_offset,
        key: record.key.clone(),
    };
    active.hint_buf.clear();
    hint.encode_into(&mut active.hint_buf)
        .map_err(|e| AppendError::Rejected(invalid_input(e.to_string())))?;

    active
        .data
        .write_all(&active.data_buf)
        .map_err(AppendError::Failed)?;
    active
        .hint
        .write_all(&active.hint_buf)
        .map_err(AppendError::Failed)?;
    if sync {
        active.data.sync_data().map_err(AppendError::Failed)?;
        active.hint.sync_data().map_err(AppendError::Failed)?;
    }

    active.data_len += active.data_buf.len() as u64;
    active.hint_len += active.hint_buf.len() as u64;

    Ok(LocationRecord {
        segment: active.segment,
        value_offset,
        value_size,
        key_size,
        timestamp: record.timestamp,
    })
}

fn invalid_input(msg: String) -> StoreError {
    StoreError::WriteFailed(io::Error::new(io::ErrorKind::InvalidInput, msg))
}
