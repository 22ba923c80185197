/// Cold-start recovery of the active segment pair.
///
/// A crash mid-append can leave a partial record at the end of the data file,
/// a partial entry at the end of the hint file, or a complete record whose
/// hint entry was never written. Before the writer cursors are placed, both
/// files are cut back to their valid prefixes and any missing hint entries
/// are regenerated from the data file, so records appended after the restart
/// stay reachable by a hint or data replay.
///
/// Corruption inside the valid region (a checksum mismatch, implausible
/// sizes) is not a torn tail and fails the open.
use record::{DataScanner, HintEntry, HintScanner, RECORD_HEADER_SIZE};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

use crate::segment::ActiveSegment;
use crate::Result;

/// What a recovery pass changed; all zero for a cleanly closed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct RecoveryReport {
    pub(crate) data_trimmed: u64,
    pub(crate) hint_trimmed: u64,
    pub(crate) hints_dropped: usize,
    pub(crate) hints_rebuilt: usize,
}

/// Repairs the pair at `data_path` / `hint_path` and opens it for append with
/// the cursors at the repaired ends.
pub(crate) fn recover_active(
    segment: u32,
    data_path: &Path,
    hint_path: &Path,
) -> Result<(ActiveSegment, RecoveryReport)> {
    let mut report = RecoveryReport::default();

    // (entry length, end of the value it points at)
    let mut hints: Vec<(u64, u64)> = Vec::new();
    let hint_summary = HintScanner::open(hint_path)?.replay(|entry| {
        hints.push((
            entry.encoded_len() as u64,
            entry.value_offset as u64 + entry.value_size as u64,
        ));
    })?;
    let last_hinted_end = hints.last().map(|&(_, end)| end).unwrap_or(0);

    let mut missing: Vec<HintEntry> = Vec::new();
    let data_summary = DataScanner::open(data_path)?.replay(|offset, rec| {
        if offset >= last_hinted_end {
            let value_offset = offset + RECORD_HEADER_SIZE as u64 + rec.key.len() as u64;
            missing.push(HintEntry {
                timestamp: rec.timestamp,
                value_size: rec.value.len() as u32,
                // the record was written through the writer, so it fits
                value_offset: value_offset as u32,
                key: rec.key,
            });
        }
    })?;
    let data_len = data_summary.valid_len;

    // hints are in data order: keep the prefix whose values are fully on disk
    let kept = hints
        .iter()
        .take_while(|&&(_, end)| end <= data_len)
        .count();
    let hint_len: u64 = hints[..kept].iter().map(|&(len, _)| len).sum();
    report.hints_dropped = hints.len() - kept;

    let data = OpenOptions::new().append(true).open(data_path)?;
    let mut hint = OpenOptions::new().append(true).open(hint_path)?;

    let data_file_len = data.metadata()?.len();
    if data_file_len > data_len {
        report.data_trimmed = data_file_len - data_len;
        warn!(
            segment,
            valid_len = data_len,
            trimmed = report.data_trimmed,
            "trimming torn tail of active data file"
        );
        data.set_len(data_len)?;
    }

    let hint_file_len = hint.metadata()?.len();
    if hint_file_len > hint_len {
        report.hint_trimmed = hint_file_len - hint_len;
        warn!(
            segment,
            valid_len = hint_len,
            trimmed = report.hint_trimmed,
            dropped_entries = report.hints_dropped,
            truncated_tail = hint_summary.truncated,
            "trimming torn tail of active hint file"
        );
        hint.set_len(hint_len)?;
    }

    let mut hint_len = hint_len;
    if !missing.is_empty() {
        let mut buf = Vec::new();
        for entry in &missing {
            entry.encode_into(&mut buf)?;
        }
        hint.write_all(&buf)?;
        hint_len += buf.len() as u64;
        report.hints_rebuilt = missing.len();
        warn!(
            segment,
            rebuilt = missing.len(),
            "regenerated hint entries missing for records in the data file"
        );
    }

    if report != RecoveryReport::default() {
        data.sync_all()?;
        hint.sync_all()?;
        info!(
            segment,
            data_len,
            hint_len,
            data_trimmed = report.data_trimmed,
            hint_trimmed = report.hint_trimmed,
            hints_dropped = report.hints_dropped,
            hints_rebuilt = report.hints_rebuilt,
            "active segment recovered"
        );
    }

    let active = ActiveSegment::from_files(segment, data, hint, data_len, hint_len);
    Ok((active, report))
}
