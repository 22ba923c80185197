use std::fs;
use std::path::{Path, PathBuf};

use crate::Store;

pub fn meta_path(dir: &Path) -> PathBuf {
    dir.join("kv.meta")
}

pub fn open_store(dir: &Path, segment_size_limit: u64) -> Store {
    Store::open_path(&meta_path(dir), segment_size_limit, true).unwrap()
}

pub fn count_files_with_ext(dir: &Path, ext: &str) -> usize {
    fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .and_then(|s| s.to_str())
                .map(|x| x == ext)
                .unwrap_or(false)
        })
        .count()
}
