/// Segment File Set: every open file handle of a store.
///
/// The set owns one writable segment pair (data + hint, behind the writer
/// mutex) and a read-only data handle for every segment, the active one
/// included, so a value is readable as soon as its append returns.
///
/// Read handles are shared as `Arc<SegmentHandle>`. A handle is only ever read
/// with positioned reads, so concurrent readers need no lock once they hold
/// the `Arc`.
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use crate::metadata::Metadata;
use crate::recovery::recover_active;
use crate::{Result, StoreError};

/// Extension of segment data files.
pub const DATA_EXTENSION: &str = "data";
/// Extension of segment hint files.
pub const HINT_EXTENSION: &str = "hint";

/// Read-only handle to one segment data file.
#[derive(Debug)]
pub struct SegmentHandle {
    segment: u32,
    path: PathBuf,
    file: File,
}

impl SegmentHandle {
    /// Opens `path` read-only as the data file of `segment`.
    pub fn open(segment: u32, path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            segment,
            path: path.to_path_buf(),
            file,
        })
    }

    /// Segment number of this handle.
    #[must_use]
    pub fn segment(&self) -> u32 {
        self.segment
    }

    /// Path of the underlying data file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the data file in bytes.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    /// Reads into `buf` starting at `offset` until `buf` is full or EOF is
    /// reached. Returns the number of bytes read; a short count means the
    /// file ends before `offset + buf.len()`.
    ///
    /// Does not touch the file cursor, so any number of threads may call this
    /// concurrently on the same handle.
    pub fn read_full_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }

    #[cfg(unix)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::unix::fs::FileExt;
        self.file.read_at(buf, offset)
    }

    #[cfg(windows)]
    fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        use std::os::windows::fs::FileExt;
        self.file.seek_read(buf, offset)
    }
}

/// The writable segment pair plus the cursors used for offset arithmetic.
#[derive(Debug)]
pub(crate) struct ActiveSegment {
    pub(crate) segment: u32,
    pub(crate) data: File,
    pub(crate) hint: File,
    /// Length of the data file: where the next record starts.
    pub(crate) data_len: u64,
    /// Length of the hint file: where the next hint entry starts.
    pub(crate) hint_len: u64,
    /// Reusable scratch buffers to avoid allocation on every append.
    pub(crate) data_buf: Vec<u8>,
    pub(crate) hint_buf: Vec<u8>,
}

impl ActiveSegment {
    /// Opens a pair for append, positioning the cursors at the current file
    /// ends. Only for freshly created files; a pair that may hold a torn tail
    /// goes through [`crate::recovery::recover_active`].
    pub(crate) fn open(segment: u32, data_path: &Path, hint_path: &Path) -> io::Result<Self> {
        let data = OpenOptions::new().append(true).open(data_path)?;
        let hint = OpenOptions::new().append(true).open(hint_path)?;
        let data_len = data.metadata()?.len();
        let hint_len = hint.metadata()?.len();
        Ok(Self::from_files(segment, data, hint, data_len, hint_len))
    }

    /// Wraps already opened append handles whose valid lengths are known.
    pub(crate) fn from_files(
        segment: u32,
        data: File,
        hint: File,
        data_len: u64,
        hint_len: u64,
    ) -> Self {
        Self {
            segment,
            data,
            hint,
            data_len,
            hint_len,
            data_buf: Vec::with_capacity(256),
            hint_buf: Vec::with_capacity(64),
        }
    }
}

/// Everything mutated by appends and rotations. Only reachable through
/// [`SegmentFileSet::writer`], so holding `&mut WriterState` means holding the
/// writer lock.
#[derive(Debug)]
pub(crate) struct WriterState {
    pub(crate) metadata: Metadata,
    /// `None` while no segment is writable (before the first allocation, or
    /// after a failed rotation).
    pub(crate) active: Option<ActiveSegment>,
    /// Set when a rotation fails; every later append is refused.
    pub(crate) halted: Option<String>,
}

/// Owns the active segment pair and the read handles of every segment.
pub struct SegmentFileSet {
    pub(crate) dir: PathBuf,
    pub(crate) metadata_path: PathBuf,
    pub(crate) name: String,
    pub(crate) sync: bool,
    pub(crate) writer: Mutex<WriterState>,
    pub(crate) readers: RwLock<BTreeMap<u32, Arc<SegmentHandle>>>,
}

impl std::fmt::Debug for SegmentFileSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentFileSet")
            .field("dir", &self.dir)
            .field("name", &self.name)
            .field("sync", &self.sync)
            .field("segments", &self.readers.read().keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SegmentFileSet {
    /// Opens the database described by `metadata_path`, creating it if the
    /// metadata file does not exist.
    ///
    /// # Existing database
    ///
    /// Opens the active pair for append and every listed segment read-only.
    /// A missing or unopenable segment file fails the whole open.
    ///
    /// # New database
    ///
    /// Starts from `active_segment = 0` with no segments and immediately
    /// allocates segment 1 through the rotator, which also persists the
    /// metadata.
    pub fn open_or_create(metadata_path: &Path, sync: bool) -> Result<Self> {
        let dir = match metadata_path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        Metadata::cleanup_tmp(metadata_path)?;

        match Metadata::load(metadata_path) {
            Ok(metadata) => Self::open_existing(dir, metadata_path, metadata, sync),
            Err(StoreError::NotFound(_)) => Self::create(dir, metadata_path, sync),
            Err(e) => Err(e),
        }
    }

    fn open_existing(
        dir: PathBuf,
        metadata_path: &Path,
        metadata: Metadata,
        sync: bool,
    ) -> Result<Self> {
        let name = metadata.name.clone();
        let mut readers = BTreeMap::new();
        for &segment in &metadata.segment_numbers {
            let path = segment_path(&dir, &name, segment, DATA_EXTENSION);
            let handle = SegmentHandle::open(segment, &path).map_err(|e| {
                StoreError::Io(io::Error::new(
                    e.kind(),
                    format!("failed to open segment {} ({}): {}", segment, path.display(), e),
                ))
            })?;
            readers.insert(segment, Arc::new(handle));
        }

        let active_no = metadata.active_segment;
        let (active, _report) = recover_active(
            active_no,
            &segment_path(&dir, &name, active_no, DATA_EXTENSION),
            &segment_path(&dir, &name, active_no, HINT_EXTENSION),
        )
        .map_err(|e| match e {
            StoreError::Io(e) => StoreError::Io(io::Error::new(
                e.kind(),
                format!("failed to open active segment {}: {}", active_no, e),
            )),
            other => other,
        })?;

        info!(
            name = %name,
            active_segment = active_no,
            segments = metadata.segment_numbers.len(),
            active_len = active.data_len,
            "opened existing database"
        );

        Ok(Self {
            dir,
            metadata_path: metadata_path.to_path_buf(),
            name,
            sync,
            writer: Mutex::new(WriterState {
                metadata,
                active: Some(active),
                halted: None,
            }),
            readers: RwLock::new(readers),
        })
    }

    fn create(dir: PathBuf, metadata_path: &Path, sync: bool) -> Result<Self> {
        let name = Metadata::name_from_path(metadata_path)?;
        let set = Self {
            dir,
            metadata_path: metadata_path.to_path_buf(),
            name: name.clone(),
            sync,
            writer: Mutex::new(WriterState {
                metadata: Metadata::new(name.clone()),
                active: None,
                halted: None,
            }),
            readers: RwLock::new(BTreeMap::new()),
        };

        {
            let mut state = set.writer.lock();
            set.rotate(&mut state)?;
        }

        info!(name = %name, path = %metadata_path.display(), "created new database");
        Ok(set)
    }

    /// Returns the read handle of `segment`.
    ///
    /// Never creates files: an unknown segment means the caller's index and
    /// this store disagree.
    pub fn resolve_read_handle(&self, segment: u32) -> Result<Arc<SegmentHandle>> {
        self.readers
            .read()
            .get(&segment)
            .cloned()
            .ok_or(StoreError::UnknownSegment(segment))
    }

    pub(crate) fn insert_read_handle(&self, handle: SegmentHandle) {
        self.readers.write().insert(handle.segment, Arc::new(handle));
    }

    /// Path of the data file of `segment`.
    #[must_use]
    pub fn data_path(&self, segment: u32) -> PathBuf {
        segment_path(&self.dir, &self.name, segment, DATA_EXTENSION)
    }

    /// Path of the hint file of `segment`.
    #[must_use]
    pub fn hint_path(&self, segment: u32) -> PathBuf {
        segment_path(&self.dir, &self.name, segment, HINT_EXTENSION)
    }

    /// Snapshot of the current metadata.
    #[must_use]
    pub fn metadata(&self) -> Metadata {
        self.writer.lock().metadata.clone()
    }

    /// Size of the active data file, or `None` if the store is halted.
    #[must_use]
    pub fn active_len(&self) -> Option<u64> {
        self.writer.lock().active.as_ref().map(|a| a.data_len)
    }

    /// Segment numbers that currently have a read handle, ascending.
    #[must_use]
    pub fn readable_segments(&self) -> Vec<u32> {
        self.readers.read().keys().copied().collect()
    }

    /// Logical database name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Directory holding the segment files.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

/// `{dir}/{name}_{segment}.{ext}`
pub fn segment_path(dir: &Path, name: &str, segment: u32, ext: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", name, segment, ext))
}
