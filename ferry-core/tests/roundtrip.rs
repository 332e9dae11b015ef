//! Roundtrip serialisation tests for `ferry-core` documents.
//!
//! Each `#[case]` is isolated — no shared state.

use chrono::Utc;
use ferry_core::{
    ArchiverConfig, ArchiverKind, Dataset, DatasetId, StorageConfig, SymlinkPolicy,
    TransferConfig, UploadStatus,
};
use rstest::rstest;
use std::path::PathBuf;

fn dataset_with(status: UploadStatus, archiver: ArchiverConfig) -> Dataset {
    let mut ds = Dataset::new(
        DatasetId::from("d-roundtrip"),
        StorageConfig {
            root: PathBuf::from("/srv/ferry"),
            bucket: "team-a".to_string(),
        },
        archiver,
        Utc::now(),
    );
    ds.status = status;
    ds.upload_expire = 1_700_000_000;
    ds
}

#[rstest]
#[case::pending_tar(UploadStatus::Pending, ArchiverConfig::default())]
#[case::uploading_sharded(
    UploadStatus::Uploading,
    ArchiverConfig { kind: ArchiverKind::Sharded, shards: 32, ..ArchiverConfig::default() }
)]
#[case::success_prefixed(
    UploadStatus::Success,
    ArchiverConfig { key_prefix: "exports/d-roundtrip/".to_string(), symlinks: SymlinkPolicy::Skip, ..ArchiverConfig::default() }
)]
fn dataset_yaml_roundtrip(#[case] status: UploadStatus, #[case] archiver: ArchiverConfig) {
    let original = dataset_with(status, archiver);
    let yaml = serde_yaml::to_string(&original).expect("serialize");
    let back: Dataset = serde_yaml::from_str(&yaml).expect("deserialize");
    assert_eq!(original, back);
}

#[test]
fn status_serializes_lowercase() {
    let yaml = serde_yaml::to_string(&dataset_with(UploadStatus::Uploading, ArchiverConfig::default()))
        .expect("serialize");
    assert!(yaml.contains("status: uploading"), "got:\n{yaml}");
    assert!(yaml.contains("kind: tar"), "got:\n{yaml}");
}

#[test]
fn empty_config_document_is_all_defaults() {
    let config: TransferConfig = serde_yaml::from_str("{}").expect("parse");
    assert_eq!(config, TransferConfig::default());
}
