/// Rotator: retires the active segment pair and allocates the next one.
///
/// Rotation only runs with the writer lock held (it takes `&mut WriterState`,
/// which is only reachable through the lock), so no append can observe a
/// half-rotated store and two callers can never rotate the same segment.
use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use tracing::{error, info};

use crate::metadata::Metadata;
use crate::segment::{ActiveSegment, SegmentFileSet, SegmentHandle, WriterState};
use crate::{Result, StoreError};

impl SegmentFileSet {
    /// Closes the active pair and makes `active_segment + 1` the new one.
    ///
    /// # Steps
    ///
    /// 1. fsync and close the current data and hint files.
    /// 2. Create `{name}_{next}.data` and `{name}_{next}.hint`.
    /// 3. Open a read handle for the new data file and register it.
    /// 4. Append `next` to the metadata and persist it atomically.
    ///
    /// Any failure leaves the store without a writable segment and marks it
    /// halted: every later append fails with [`StoreError::Halted`].
    pub(crate) fn rotate(&self, state: &mut WriterState) -> Result<()> {
        match self.try_rotate(state) {
            Ok(()) => Ok(()),
            Err(e) => {
                let reason = format!(
                    "rotation from segment {} failed: {}",
                    state.metadata.active_segment, e
                );
                error!(name = %self.name, error = %e, "{}", reason);
                state.halted = Some(reason);
                state.active = None;
                Err(e)
            }
        }
    }

    fn try_rotate(&self, state: &mut WriterState) -> Result<()> {
        if let Some(old) = state.active.take() {
            old.data.sync_all().map_err(StoreError::WriteFailed)?;
            old.hint.sync_all().map_err(StoreError::WriteFailed)?;
            // both files close here
        }

        let next = state.metadata.active_segment.checked_add(1).ok_or_else(|| {
            StoreError::WriteFailed(io::Error::new(
                io::ErrorKind::Other,
                "segment number overflow (u32::MAX reached)",
            ))
        })?;

        let data_path = self.data_path(next);
        let hint_path = self.hint_path(next);
        create_segment_file(&data_path)?;
        create_segment_file(&hint_path)?;

        let handle = SegmentHandle::open(next, &data_path).map_err(StoreError::WriteFailed)?;
        let active =
            ActiveSegment::open(next, &data_path, &hint_path).map_err(StoreError::WriteFailed)?;

        let metadata: Metadata = state.metadata.with_next_segment(next);
        metadata.save(&self.metadata_path).map_err(|e| match e {
            StoreError::Io(io_err) => StoreError::WriteFailed(io_err),
            other => other,
        })?;

        self.insert_read_handle(handle);
        state.metadata = metadata;
        state.active = Some(active);

        info!(name = %self.name, segment = next, "rotated to new active segment");
        Ok(())
    }
}

/// Creates an empty segment file.
///
/// A crash between creating the files and persisting the metadata leaves an
/// empty orphan with the next number; it is reused. A non-empty file with an
/// unallocated number is never overwritten.
fn create_segment_file(path: &Path) -> Result<()> {
    let file: File = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(StoreError::WriteFailed)?;
    let len = file.metadata().map_err(StoreError::WriteFailed)?.len();
    if len != 0 {
        return Err(StoreError::WriteFailed(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!(
                "refusing to reuse non-empty unallocated segment file {} ({} bytes)",
                path.display(),
                len
            ),
        )));
    }
    file.sync_all().map_err(StoreError::WriteFailed)?;
    Ok(())
}
