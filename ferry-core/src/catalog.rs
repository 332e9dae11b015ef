//! Per-dataset YAML catalog.
//!
//! # Storage layout
//!
//! ```text
//! <root>/                  (the storage root)
//!   datasets/
//!     <dataset_id>.yaml    (one file per dataset — mode 0600)
//! ```
//!
//! All functions take the catalog root explicitly.

use std::path::{Path, PathBuf};

use crate::config::{set_dir_permissions, set_file_permissions};
use crate::error::{io_err, CoreError};
use crate::types::{Dataset, DatasetId};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<root>/datasets/` — creates the directory (mode `0700`) if absent.
pub fn datasets_dir_at(root: &Path) -> Result<PathBuf, CoreError> {
    let dir = root.join("datasets");
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<root>/datasets/<id>.yaml` — pure, no I/O.
pub fn dataset_path_at(root: &Path, id: &DatasetId) -> PathBuf {
    root.join("datasets").join(format!("{}.yaml", id.0))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load one dataset document.
///
/// Returns `CoreError::DatasetNotFound` if absent,
/// `CoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_dataset_at(root: &Path, id: &DatasetId) -> Result<Dataset, CoreError> {
    id.validate()?;
    let path = dataset_path_at(root, id);
    if !path.exists() {
        return Err(CoreError::DatasetNotFound {
            id: id.clone(),
            path,
        });
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

/// Every dataset in the catalog, sorted by id. Skips stray non-YAML files.
pub fn list_datasets_at(root: &Path) -> Result<Vec<Dataset>, CoreError> {
    let dir = root.join("datasets");
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut entries: Vec<_> = std::fs::read_dir(&dir)
        .map_err(|e| io_err(&dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut result = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
            continue;
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
        let dataset: Dataset =
            serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })?;
        result.push(dataset);
    }
    result.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(result)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically write `dataset` to `<root>/datasets/<id>.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_dataset_at(root: &Path, dataset: &Dataset) -> Result<(), CoreError> {
    dataset.id.validate()?;
    datasets_dir_at(root)?;
    let path = dataset_path_at(root, &dataset.id);
    let tmp_path = path.with_file_name(format!("{}.yaml.tmp", dataset.id.0));

    let yaml = serde_yaml::to_string(dataset)?;
    std::fs::write(&tmp_path, yaml).map_err(|e| io_err(&tmp_path, e))?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path).map_err(|e| io_err(&path, e))?;
    Ok(())
}

/// Whether a document exists for `id`.
pub fn dataset_exists_at(root: &Path, id: &DatasetId) -> bool {
    dataset_path_at(root, id).exists()
}
