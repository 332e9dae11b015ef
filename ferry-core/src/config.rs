//! `~/.ferry/config.yaml` — storage, archiver and transfer settings.
//!
//! # API pattern
//!
//! Every function that touches the home directory has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};

/// Upper bound on the shard count of the sharded archiver.
pub const MAX_SHARDS: usize = 4096;

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Which archiver lays out a dataset's objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArchiverKind {
    /// A single `archive.tar` object.
    #[default]
    Tar,
    /// A fixed number of `shard-NNNN.tar` objects.
    Sharded,
}

/// What the archiver does with symbolic links and other special files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SymlinkPolicy {
    /// Store the link itself (never its target's content).
    #[default]
    Preserve,
    /// Leave links out of the archive.
    Skip,
    /// Fail the archive when a link is found.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root directory of the local object store.
    pub root: PathBuf,
    pub bucket: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("ferry-store"),
            bucket: "datasets".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiverConfig {
    pub kind: ArchiverKind,
    /// Empty, or ending in `/`.
    pub key_prefix: String,
    pub shards: usize,
    pub symlinks: SymlinkPolicy,
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            kind: ArchiverKind::Tar,
            key_prefix: String::new(),
            shards: 8,
            symlinks: SymlinkPolicy::Preserve,
        }
    }
}

impl ArchiverConfig {
    pub fn validate(&self) -> Result<(), CoreError> {
        if !self.key_prefix.is_empty() && !self.key_prefix.ends_with('/') {
            return Err(CoreError::InvalidConfig(format!(
                "archiver key prefix '{}' must end with a forward slash",
                self.key_prefix
            )));
        }
        if self.kind == ArchiverKind::Sharded && !(1..=MAX_SHARDS).contains(&self.shards) {
            return Err(CoreError::InvalidConfig(format!(
                "shard count {} is outside 1..={MAX_SHARDS}",
                self.shards
            )));
        }
        Ok(())
    }

    /// The same settings, rooted one level deeper at `<key_prefix><segment>/`.
    pub fn nested(&self, segment: &str) -> Self {
        Self {
            key_prefix: format!("{}{segment}/", self.key_prefix),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Download worker count.
    pub concurrency: usize,
    /// How long an upload may stay in `uploading` before readers give up.
    pub upload_ttl_secs: u64,
    /// Longest single wait between status polls while an upload is running.
    pub poll_interval_secs: u64,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            upload_ttl_secs: 3600,
            poll_interval_secs: 5,
        }
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransferConfig {
    pub storage: StorageConfig,
    pub archiver: ArchiverConfig,
    pub transfer: TransferSettings,
}

impl TransferConfig {
    /// Defaults with the store rooted under `<home>/.ferry/store`.
    pub fn default_at(home: &Path) -> Self {
        Self {
            storage: StorageConfig {
                root: ferry_root(home).join("store"),
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.archiver.validate()?;
        if self.transfer.concurrency == 0 {
            return Err(CoreError::InvalidConfig(
                "transfer concurrency must be at least 1".to_string(),
            ));
        }
        if self.transfer.poll_interval_secs == 0 {
            return Err(CoreError::InvalidConfig(
                "poll interval must be at least one second".to_string(),
            ));
        }
        if self.storage.bucket.trim().is_empty() {
            return Err(CoreError::InvalidConfig("storage bucket is empty".to_string()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.ferry` — pure, no I/O.
pub fn ferry_root(home: &Path) -> PathBuf {
    home.join(".ferry")
}

/// `<home>/.ferry/config.yaml` — pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    ferry_root(home).join("config.yaml")
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, CoreError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.ferry/config.yaml`.
///
/// A missing file yields [`TransferConfig::default_at`]; malformed YAML is a
/// `CoreError::Parse` carrying the path. The result is validated.
pub fn load_at(home: &Path) -> Result<TransferConfig, CoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(TransferConfig::default_at(home));
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    let config: TransferConfig =
        serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })?;
    config.validate()?;
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<TransferConfig, CoreError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `<home>/.ferry/config.yaml`.
///
/// Write flow: validate → serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &TransferConfig) -> Result<PathBuf, CoreError> {
    config.validate()?;
    let dir = ferry_root(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(config: &TransferConfig) -> Result<PathBuf, CoreError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub(crate) fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

#[cfg(unix)]
pub(crate) fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
pub(crate) fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
pub(crate) fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
pub(crate) fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
