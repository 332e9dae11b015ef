//! Catalog error-message, atomic-write-safety, and listing integration tests.

use assert_fs::prelude::*;
use chrono::Utc;
use ferry_core::{
    catalog, ArchiverConfig, CoreError, Dataset, DatasetId, StorageConfig, UploadStatus,
};
use predicates::prelude::predicate;
use std::fs;

fn id() -> DatasetId {
    DatasetId::from("d-training")
}

fn dataset(id: DatasetId) -> Dataset {
    Dataset::new(id, StorageConfig::default(), ArchiverConfig::default(), Utc::now())
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_dataset_returns_not_found() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = catalog::load_dataset_at(root.path(), &id()).unwrap_err();
    assert!(matches!(err, CoreError::DatasetNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("d-training"));
    assert!(err.to_string().contains("not found"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    root.child("datasets/d-training.yaml")
        .write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = catalog::load_dataset_at(root.path(), &id()).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("d-training.yaml"), "must contain file path, got: {msg}");
}

#[test]
fn load_rejects_path_like_ids_before_touching_disk() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let err = catalog::load_dataset_at(root.path(), &DatasetId::from("../escape")).unwrap_err();
    assert!(matches!(err, CoreError::InvalidSpec { .. }), "got: {err}");
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_writes_document_with_private_mode() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    catalog::save_dataset_at(root.path(), &dataset(id())).expect("save");

    root.child("datasets/d-training.yaml")
        .assert(predicate::path::exists());
    root.child("datasets/d-training.yaml.tmp")
        .assert(predicate::path::missing());

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let path = catalog::dataset_path_at(root.path(), &id());
        let mode = fs::metadata(&path).expect("meta").permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "expected 0600, got {mode:o}");
    }
}

#[test]
fn mid_write_crash_leaves_original_intact() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    catalog::save_dataset_at(root.path(), &dataset(id())).expect("save");

    let path = catalog::dataset_path_at(root.path(), &id());
    let original_bytes = fs::read(&path).expect("read original");

    // Simulate crash: .tmp written but process died before rename
    let tmp = path.with_file_name("d-training.yaml.tmp");
    fs::write(&tmp, b"CRASH - INCOMPLETE WRITE").expect("write crash tmp");

    assert_eq!(original_bytes, fs::read(&path).expect("read after crash"));
    let loaded = catalog::load_dataset_at(root.path(), &id()).expect("load");
    assert_eq!(loaded.status, UploadStatus::Pending);
}

#[test]
fn save_then_load_preserves_status_and_size() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    let now = Utc::now();
    let mut ds = dataset(id());
    ds.transition(UploadStatus::Uploading, Some(now.timestamp() + 30), now)
        .expect("uploading");
    ds.transition(UploadStatus::Success, None, now).expect("success");
    ds.size = 4096;
    catalog::save_dataset_at(root.path(), &ds).expect("save");

    let loaded = catalog::load_dataset_at(root.path(), &id()).expect("load");
    assert_eq!(loaded, ds);
}

// ---------------------------------------------------------------------------
// 3. List
// ---------------------------------------------------------------------------

#[test]
fn list_on_fresh_root_is_empty() {
    let root = assert_fs::TempDir::new().expect("tempdir");
    assert!(catalog::list_datasets_at(root.path()).expect("list").is_empty());
}

#[test]
fn list_is_sorted_and_skips_stray_files() {
    let root = assert_fs::TempDir::new().expect("tempdir");

    // Save beta before alpha intentionally
    catalog::save_dataset_at(root.path(), &dataset(DatasetId::from("beta"))).expect("beta");
    catalog::save_dataset_at(root.path(), &dataset(DatasetId::from("alpha"))).expect("alpha");
    root.child("datasets/notes.txt").write_str("ignore me").expect("stray");

    let list = catalog::list_datasets_at(root.path()).expect("list");
    let ids: Vec<&str> = list.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "beta"]);
    assert!(catalog::dataset_exists_at(root.path(), &DatasetId::from("beta")));
}
