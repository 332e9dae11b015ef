//! The [`Archiver`] contract shared by every archive layout.

use std::fs::File;
use std::io::{Seek, SeekFrom};
use std::path::Path;

use tracing::debug;

use ferry_core::ObjectKey;

use crate::error::{io_err, ArchiveError};

/// Called once per object key, without data.
pub type IndexVisitor<'a> = dyn FnMut(&ObjectKey) -> Result<(), ArchiveError> + 'a;

/// Called once per produced object, or to fill an object before extraction.
/// The file is positioned at the start of the object's content.
pub type ObjectVisitor<'a> = dyn FnMut(&ObjectKey, &mut File) -> Result<(), ArchiveError> + 'a;

/// Turns a directory tree into a fixed set of remote objects and back.
///
/// Implementations are stateless apart from their configuration, so one
/// instance can serve concurrent extractions of different keys.
pub trait Archiver: Send + Sync {
    /// Every key an archive of this shape consists of. Does not depend on
    /// any source tree and never changes for a given configuration.
    fn index(&self, visit: &mut IndexVisitor<'_>) -> Result<(), ArchiveError>;

    /// Archive `source` and hand each finished object to `visit`.
    fn archive(&self, source: &Path, visit: &mut ObjectVisitor<'_>) -> Result<(), ArchiveError>;

    /// Extract one fetched object into `destination`.
    fn extract(
        &self,
        destination: &Path,
        key: &ObjectKey,
        object: &mut File,
    ) -> Result<(), ArchiveError>;

    /// [`Archiver::index`] collected into a vector.
    fn keys(&self) -> Result<Vec<ObjectKey>, ArchiveError> {
        let mut keys = Vec::new();
        self.index(&mut |key| {
            keys.push(key.clone());
            Ok(())
        })?;
        Ok(keys)
    }

    /// Rebuild a tree under `destination`, calling `fetch` to fill a
    /// temporary file for every key before extracting it.
    fn unarchive(
        &self,
        destination: &Path,
        fetch: &mut ObjectVisitor<'_>,
    ) -> Result<(), ArchiveError> {
        prepare_destination(destination)?;
        for key in self.keys()? {
            let mut object = tempfile::tempfile().map_err(|e| io_err(destination, e))?;
            fetch(&key, &mut object)?;
            object
                .seek(SeekFrom::Start(0))
                .map_err(|e| io_err(destination, e))?;
            debug!(key = %key, "extracting object");
            self.extract(destination, &key, &mut object)?;
        }
        Ok(())
    }
}

/// Extraction precondition: `path` is missing (and gets created) or is an
/// empty directory. A non-empty directory is left untouched.
pub fn prepare_destination(path: &Path) -> Result<(), ArchiveError> {
    match std::fs::read_dir(path) {
        Ok(mut entries) => {
            if entries.next().is_some() {
                return Err(ArchiveError::DestinationNotEmpty {
                    path: path.to_path_buf(),
                });
            }
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            std::fs::create_dir_all(path).map_err(|e| io_err(path, e))
        }
        Err(e) => Err(io_err(path, e)),
    }
}

/// Empty, or ending in `/`.
pub(crate) fn validate_key_prefix(prefix: &str) -> Result<(), ArchiveError> {
    if prefix.is_empty() || prefix.ends_with('/') {
        Ok(())
    } else {
        Err(ArchiveError::InvalidKeyPrefix {
            prefix: prefix.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_destination_is_created() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("a").join("b");
        prepare_destination(&dest).expect("prepare");
        assert!(dest.is_dir());
    }

    #[test]
    fn empty_destination_is_accepted() {
        let tmp = TempDir::new().unwrap();
        prepare_destination(tmp.path()).expect("empty dir");
    }

    #[test]
    fn non_empty_destination_is_rejected_untouched() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("keep.txt"), b"x").unwrap();
        let err = prepare_destination(tmp.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::DestinationNotEmpty { .. }));
        assert!(err.to_string().contains("directory is not empty"));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn key_prefix_validation() {
        validate_key_prefix("").unwrap();
        validate_key_prefix("a/b/").unwrap();
        assert!(matches!(
            validate_key_prefix("a/b"),
            Err(ArchiveError::InvalidKeyPrefix { .. })
        ));
    }
}
