use crate::metadata::METADATA_VERSION;
use crate::*;
use anyhow::Result;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[test]
fn load_missing_is_not_found() {
    let dir = tempdir().unwrap();
    let result = Metadata::load(&dir.path().join("kv.meta"));
    assert!(matches!(result, Err(StoreError::NotFound(_))));
}

#[test]
fn new_metadata_is_empty() {
    let meta = Metadata::new("kv");
    assert_eq!(meta.version, METADATA_VERSION);
    assert_eq!(meta.active_segment, 0);
    assert!(meta.segment_numbers.is_empty());
    assert!(meta.validate().is_ok());
}

#[test]
fn save_and_reload() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("kv.meta");

    let meta = Metadata::new("kv").with_next_segment(1).with_next_segment(2);
    meta.save(&path)?;

    let back = Metadata::load(&path)?;
    assert_eq!(back, meta);
    assert_eq!(back.segment_numbers, vec![1, 2]);
    assert_eq!(back.active_segment, 2);
    assert!(!Metadata::tmp_path(&path).exists());
    Ok(())
}

#[test]
fn file_is_self_describing_json() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("kv.meta");
    Metadata::new("kv").with_next_segment(1).save(&path)?;

    let value: serde_json::Value = serde_json::from_slice(&fs::read(&path)?)?;
    assert_eq!(value["version"], 1);
    assert_eq!(value["name"], "kv");
    assert_eq!(value["segment_numbers"], serde_json::json!([1]));
    assert_eq!(value["active_segment"], 1);
    Ok(())
}

#[test]
fn save_overwrites_previous_state() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("kv.meta");

    let one = Metadata::new("kv").with_next_segment(1);
    one.save(&path)?;
    let two = one.with_next_segment(2);
    two.save(&path)?;

    assert_eq!(Metadata::load(&path)?, two);
    Ok(())
}

#[test]
fn garbage_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kv.meta");
    fs::write(&path, b"{\"name\": \"kv\", \"segm").unwrap();
    assert!(matches!(Metadata::load(&path), Err(StoreError::Corrupt(_))));
}

#[test]
fn empty_file_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kv.meta");
    fs::write(&path, b"").unwrap();
    assert!(matches!(Metadata::load(&path), Err(StoreError::Corrupt(_))));
}

fn write_json(path: &Path, json: &str) {
    fs::write(path, json).unwrap();
}

#[test]
fn active_must_be_last_segment() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kv.meta");
    write_json(
        &path,
        r#"{"version":1,"name":"kv","segment_numbers":[1,2],"active_segment":1}"#,
    );
    assert!(matches!(Metadata::load(&path), Err(StoreError::Corrupt(_))));
}

#[test]
fn segments_must_increase() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kv.meta");
    write_json(
        &path,
        r#"{"version":1,"name":"kv","segment_numbers":[2,1,3],"active_segment":3}"#,
    );
    assert!(matches!(Metadata::load(&path), Err(StoreError::Corrupt(_))));
}

#[test]
fn unknown_version_is_corrupt() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("kv.meta");
    write_json(
        &path,
        r#"{"version":7,"name":"kv","segment_numbers":[1],"active_segment":1}"#,
    );
    assert!(matches!(Metadata::load(&path), Err(StoreError::Corrupt(_))));
}

#[test]
fn cleanup_removes_leftover_tmp() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("kv.meta");
    let tmp = Metadata::tmp_path(&path);
    assert_eq!(tmp, dir.path().join("kv.meta.tmp"));

    fs::write(&tmp, b"half-written")?;
    Metadata::cleanup_tmp(&path)?;
    assert!(!tmp.exists());

    // nothing to clean is fine too
    Metadata::cleanup_tmp(&path)?;
    Ok(())
}

#[test]
fn cleanup_reports_unremovable_tmp() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("kv.meta");
    let tmp = Metadata::tmp_path(&path);

    // a directory cannot be removed with remove_file
    fs::create_dir(&tmp)?;
    assert!(Metadata::cleanup_tmp(&path).is_err());
    assert!(tmp.exists());

    let result = Store::open_path(&path, 1024, true);
    assert!(matches!(result, Err(StoreError::Io(_))));
    Ok(())
}

#[test]
fn name_comes_from_file_stem() -> Result<()> {
    assert_eq!(Metadata::name_from_path(Path::new("/db/kv.meta"))?, "kv");
    assert_eq!(Metadata::name_from_path(Path::new("orders"))?, "orders");
    assert!(Metadata::name_from_path(Path::new("/")).is_err());
    Ok(())
}
