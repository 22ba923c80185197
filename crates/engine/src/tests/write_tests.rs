use super::helpers::{count_files_with_ext, meta_path, open_store};
use crate::*;
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use tempfile::tempdir;

// --------------------- Database creation ---------------------

#[test]
fn new_database_allocates_segment_one() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), 1024);

    let meta = store.metadata();
    assert_eq!(meta.name, "kv");
    assert_eq!(meta.segment_numbers, vec![1]);
    assert_eq!(meta.active_segment, 1);

    assert!(meta_path(dir.path()).exists());
    assert!(dir.path().join("kv_1.data").exists());
    assert!(dir.path().join("kv_1.hint").exists());
    assert_eq!(store.files().readable_segments(), vec![1]);
    Ok(())
}

#[test]
fn open_with_config() -> Result<()> {
    let dir = tempdir()?;
    let cfg = StoreConfig::new(dir.path(), "orders")
        .with_segment_size_limit(4096)
        .with_sync(false);
    let store = Store::open(&cfg)?;

    assert_eq!(store.metadata().name, "orders");
    assert_eq!(store.segment_size_limit(), 4096);
    assert!(dir.path().join("orders.meta").exists());
    assert!(dir.path().join("orders_1.data").exists());
    Ok(())
}

#[test]
fn open_rejects_invalid_limit() {
    let dir = tempdir().unwrap();
    let result = Store::open_path(&meta_path(dir.path()), 10, true);
    assert!(matches!(result, Err(StoreError::InvalidConfig(_))));
}

// --------------------- Append ---------------------

#[test]
fn append_returns_value_location() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), 1024);

    let a = store.append(b"a".to_vec(), b"1".to_vec())?;
    assert_eq!(a.segment, 1);
    assert_eq!(a.value_size, 1);
    assert_eq!(a.key_size, 1);
    assert_eq!(a.value_offset, 21);

    let b = store.append(b"b".to_vec(), b"22".to_vec())?;
    assert_eq!(b.segment, 1);
    assert_eq!(b.value_size, 2);
    // first record is 22 bytes, then 20 header + 1 key
    assert_eq!(b.value_offset, 43);

    assert_eq!(store.files().active_len(), Some(22 + 23));
    Ok(())
}

#[test]
fn value_offset_matches_file_size_minus_value() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), 1 << 20);

    for i in 0..20 {
        let value = vec![b'v'; i * 3];
        let loc = store.append(format!("key-{}", i).into_bytes(), value)?;
        let size = std::fs::metadata(dir.path().join("kv_1.data"))?.len();
        assert_eq!(loc.value_offset as u64, size - loc.value_size as u64);
    }
    Ok(())
}

#[test]
fn append_record_keeps_timestamp() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), 1024);

    let loc = store.append_record(&Record::new(1234, b"k".to_vec(), b"v".to_vec()))?;
    assert_eq!(loc.timestamp, 1234);
    assert_eq!(store.read_record(&loc)?.timestamp, 1234);
    Ok(())
}

#[test]
fn empty_key_and_value() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), 1024);

    let loc = store.append(Vec::new(), Vec::new())?;
    assert_eq!(loc.value_offset, 20);
    assert_eq!(store.read_value(&loc)?, Vec::<u8>::new());
    Ok(())
}

#[test]
fn hint_entries_mirror_appends() -> Result<()> {
    let dir = tempdir()?;
    let store = open_store(dir.path(), 1 << 20);

    let mut written = Vec::new();
    for i in 0..10u32 {
        let key = format!("k{}", i).into_bytes();
        written.push((key.clone(), store.append(key, vec![b'x'; i as usize])?));
    }

    let hints = store.read_hints(1)?;
    assert_eq!(hints.len(), written.len());
    for ((entry, loc), (key, expected)) in hints.iter().zip(&written) {
        assert_eq!(&entry.key, key);
        assert_eq!(loc, expected);
    }
    Ok(())
}

#[test]
fn unsynced_store_appends() -> Result<()> {
    let dir = tempdir()?;
    let store = Store::open_path(&meta_path(dir.path()), 1024, false)?;

    let loc = store.append(b"fast".to_vec(), b"path".to_vec())?;
    assert_eq!(store.read_value(&loc)?, b"path");
    Ok(())
}

// --------------------- Concurrency ---------------------

#[test]
fn concurrent_appends_do_not_overlap() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(Store::open_path(&meta_path(dir.path()), 2048, false)?);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                (0..100)
                    .map(|i| {
                        let key = format!("t{}-k{}", t, i).into_bytes();
                        let value = format!("value-{}-{}", t, i).into_bytes();
                        let loc = store.append(key, value.clone()).unwrap();
                        (loc, value)
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut seen = HashSet::new();
    for h in handles {
        for (loc, value) in h.join().unwrap() {
            assert!(seen.insert((loc.segment, loc.value_offset)));
            assert_eq!(store.read_value(&loc)?, value);
        }
    }

    let meta = store.metadata();
    assert!(meta.segment_numbers.len() > 1);
    assert_eq!(meta.segment_numbers.last(), Some(&meta.active_segment));
    assert_eq!(
        count_files_with_ext(dir.path(), "data"),
        meta.segment_numbers.len()
    );
    Ok(())
}

#[test]
fn reads_run_while_appending() -> Result<()> {
    let dir = tempdir()?;
    let store = Arc::new(Store::open_path(&meta_path(dir.path()), 512, false)?);
    let first = store.append(b"stable".to_vec(), b"value".to_vec())?;

    let writer = {
        let store = Arc::clone(&store);
        thread::spawn(move || {
            for i in 0..200 {
                store
                    .append(format!("k{}", i).into_bytes(), vec![b'z'; 16])
                    .unwrap();
            }
        })
    };

    for _ in 0..200 {
        assert_eq!(store.read_value(&first)?, b"value");
    }
    writer.join().unwrap();
    assert!(store.active_segment() > 1);
    Ok(())
}
