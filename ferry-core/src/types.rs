//! Domain types for ferry datasets.
//!
//! Every type here is serializable via serde + serde_yaml; the catalog stores
//! one [`Dataset`] document per dataset.

use std::fmt;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::config::{ArchiverConfig, StorageConfig};
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Opaque identifier of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatasetId(pub String);

impl DatasetId {
    /// A fresh, time-sortable identifier (`d-<ulid>`).
    pub fn generate() -> Self {
        Self(format!("d-{}", Ulid::new().to_string().to_lowercase()))
    }

    /// Ids end up in file names and object keys, so they must be a single
    /// non-empty path segment.
    pub fn validate(&self) -> Result<(), CoreError> {
        let id = self.0.as_str();
        let reason = if id.trim().is_empty() {
            Some("must not be empty")
        } else if id == "." || id == ".." {
            Some("must not be a relative path segment")
        } else if id.contains(['/', '\\', ':']) {
            Some("must not contain path separators or ':'")
        } else if id.chars().any(|c| c.is_whitespace() || c.is_control()) {
            Some("must not contain whitespace")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(CoreError::InvalidSpec {
                kind: "dataset id",
                spec: id.to_string(),
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for DatasetId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for DatasetId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Remote key of one archive object, always `/`-separated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey(pub String);

impl ObjectKey {
    /// `<prefix><name>`; `prefix` is empty or already ends in `/`.
    pub fn join(prefix: &str, name: &str) -> Self {
        Self(format!("{prefix}{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ObjectKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ObjectKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Upload status of a dataset. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Pending,
    Uploading,
    Success,
}

impl UploadStatus {
    /// Whether a dataset in `self` may be moved to `next`.
    ///
    /// `Uploading -> Uploading` restarts an abandoned upload with a fresh
    /// expiry; nothing leaves `Success`.
    pub fn can_transition_to(self, next: UploadStatus) -> bool {
        use UploadStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading) | (Pending, Success) | (Uploading, Uploading) | (Uploading, Success)
        )
    }

    pub fn is_complete(self) -> bool {
        self == UploadStatus::Success
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadStatus::Pending => write!(f, "pending"),
            UploadStatus::Uploading => write!(f, "uploading"),
            UploadStatus::Success => write!(f, "success"),
        }
    }
}

// ---------------------------------------------------------------------------
// Domain structs
// ---------------------------------------------------------------------------

/// Where a dataset's objects live: bucket plus the root key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageLocation {
    pub bucket: String,
    pub root: String,
}

/// A dataset as recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub id: DatasetId,
    pub storage: StorageConfig,
    /// Archiver settings the dataset was written with; `key_prefix` is the
    /// dataset's own root inside the bucket.
    pub archiver: ArchiverConfig,
    pub status: UploadStatus,
    /// Unix seconds after which an unfinished upload counts as abandoned.
    #[serde(default)]
    pub upload_expire: i64,
    /// Total archived bytes, set when the upload succeeds.
    #[serde(default)]
    pub size: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Dataset {
    /// A new `pending` dataset.
    pub fn new(
        id: DatasetId,
        storage: StorageConfig,
        archiver: ArchiverConfig,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            storage,
            archiver,
            status: UploadStatus::Pending,
            upload_expire: now.timestamp(),
            size: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn location(&self) -> StorageLocation {
        StorageLocation {
            bucket: self.storage.bucket.clone(),
            root: self.archiver.key_prefix.clone(),
        }
    }

    /// Move to `next`, enforcing forward-only status changes.
    pub fn transition(
        &mut self,
        next: UploadStatus,
        upload_expire: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        if !self.status.can_transition_to(next) {
            return Err(CoreError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if let Some(expire) = upload_expire {
            self.upload_expire = expire;
        }
        self.updated_at = now;
        Ok(())
    }

    pub fn upload_expire_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.upload_expire, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Time left before the upload expires; negative once it has passed.
    pub fn remaining_upload_time(&self, now: DateTime<Utc>) -> chrono::Duration {
        self.upload_expire_at() - now
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> Dataset {
        Dataset::new(
            DatasetId::from("d-1"),
            StorageConfig::default(),
            ArchiverConfig::default(),
            Utc::now(),
        )
    }

    #[test]
    fn newtype_display() {
        assert_eq!(DatasetId::from("d-01").to_string(), "d-01");
        assert_eq!(ObjectKey::from("a/archive.tar").to_string(), "a/archive.tar");
    }

    #[test]
    fn generated_ids_are_distinct_and_valid() {
        let a = DatasetId::generate();
        let b = DatasetId::generate();
        assert_ne!(a, b);
        assert!(a.0.starts_with("d-"));
        a.validate().expect("generated id is valid");
    }

    #[test]
    fn id_validation_rejects_path_like_names() {
        for bad in ["", " ", "..", "a/b", "a\\b", "C:x", "has space"] {
            assert!(DatasetId::from(bad).validate().is_err(), "{bad:?} accepted");
        }
        DatasetId::from("my-dataset_01").validate().expect("plain id");
    }

    #[test]
    fn object_key_join() {
        assert_eq!(ObjectKey::join("", "archive.tar").0, "archive.tar");
        assert_eq!(ObjectKey::join("d-1/", "archive.tar").0, "d-1/archive.tar");
    }

    #[test]
    fn status_only_moves_forward() {
        use UploadStatus::*;
        assert!(Pending.can_transition_to(Uploading));
        assert!(Uploading.can_transition_to(Success));
        assert!(Uploading.can_transition_to(Uploading));
        assert!(!Success.can_transition_to(Uploading));
        assert!(!Success.can_transition_to(Pending));
        assert!(!Uploading.can_transition_to(Pending));
    }

    #[test]
    fn transition_rejects_leaving_success() {
        let mut ds = dataset();
        let now = Utc::now();
        ds.transition(UploadStatus::Uploading, Some(now.timestamp() + 60), now)
            .expect("pending -> uploading");
        ds.transition(UploadStatus::Success, None, now)
            .expect("uploading -> success");
        let err = ds
            .transition(UploadStatus::Uploading, None, now)
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
        assert_eq!(ds.status, UploadStatus::Success);
    }

    #[test]
    fn remaining_upload_time_goes_negative_after_expiry() {
        let mut ds = dataset();
        let now = Utc::now();
        ds.upload_expire = now.timestamp() + 5;
        assert!(ds.remaining_upload_time(now) > chrono::Duration::zero());
        let later = now + chrono::Duration::seconds(10);
        assert!(ds.remaining_upload_time(later) < chrono::Duration::zero());
    }

    #[test]
    fn location_uses_bucket_and_dataset_root() {
        let mut d = dataset();
        d.archiver = d.archiver.nested("d-1");
        let location = d.location();
        assert_eq!(location.bucket, d.storage.bucket);
        assert_eq!(location.root, "d-1/");
    }

    #[test]
    fn status_display() {
        assert_eq!(UploadStatus::Uploading.to_string(), "uploading");
        assert_eq!(UploadStatus::Success.to_string(), "success");
    }
}
