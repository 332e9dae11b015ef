//! Dataset status oracle.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ferry_core::catalog as files;
use ferry_core::{CoreError, Dataset, DatasetId, UploadStatus};

use crate::error::CatalogError;

/// A status change recorded through [`DatasetCatalog::set_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: UploadStatus,
    /// New upload expiry, unix seconds.
    pub upload_expire: Option<i64>,
    pub size: Option<u64>,
    pub at: DateTime<Utc>,
}

impl StatusUpdate {
    pub fn new(status: UploadStatus, at: DateTime<Utc>) -> Self {
        Self {
            status,
            upload_expire: None,
            size: None,
            at,
        }
    }

    pub fn expiring(mut self, upload_expire: i64) -> Self {
        self.upload_expire = Some(upload_expire);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    fn apply(&self, dataset: &mut Dataset) -> Result<(), CatalogError> {
        dataset.transition(self.status, self.upload_expire, self.at)?;
        if let Some(size) = self.size {
            dataset.size = size;
        }
        Ok(())
    }
}

/// Where datasets are recorded and their upload status is read back.
#[async_trait]
pub trait DatasetCatalog: Send + Sync {
    /// Record a new dataset. Fails with `AlreadyExists` for a known id.
    async fn create(&self, dataset: Dataset) -> Result<Dataset, CatalogError>;

    async fn describe(&self, id: &DatasetId) -> Result<Dataset, CatalogError>;

    /// Apply a forward-only status change and return the updated record.
    async fn set_status(
        &self,
        id: &DatasetId,
        update: StatusUpdate,
    ) -> Result<Dataset, CatalogError>;

    /// Every dataset, ordered by id.
    async fn list(&self) -> Result<Vec<Dataset>, CatalogError>;
}

// ---------------------------------------------------------------------------
// MemoryCatalog
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryCatalog {
    datasets: Mutex<BTreeMap<DatasetId, Dataset>>,
    describes: AtomicUsize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record without status checks.
    pub fn insert(&self, dataset: Dataset) {
        self.lock().insert(dataset.id.clone(), dataset);
    }

    /// Number of `describe` calls served so far.
    pub fn describe_count(&self) -> usize {
        self.describes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<DatasetId, Dataset>> {
        self.datasets.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl DatasetCatalog for MemoryCatalog {
    async fn create(&self, dataset: Dataset) -> Result<Dataset, CatalogError> {
        let mut datasets = self.lock();
        if datasets.contains_key(&dataset.id) {
            return Err(CatalogError::AlreadyExists { id: dataset.id });
        }
        datasets.insert(dataset.id.clone(), dataset.clone());
        Ok(dataset)
    }

    async fn describe(&self, id: &DatasetId) -> Result<Dataset, CatalogError> {
        self.describes.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound { id: id.clone() })
    }

    async fn set_status(
        &self,
        id: &DatasetId,
        update: StatusUpdate,
    ) -> Result<Dataset, CatalogError> {
        let mut datasets = self.lock();
        let dataset = datasets
            .get_mut(id)
            .ok_or_else(|| CatalogError::NotFound { id: id.clone() })?;
        update.apply(dataset)?;
        Ok(dataset.clone())
    }

    async fn list(&self) -> Result<Vec<Dataset>, CatalogError> {
        Ok(self.lock().values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// FileCatalog
// ---------------------------------------------------------------------------

/// One YAML document per dataset under `<root>/datasets/`.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    root: PathBuf,
}

impl FileCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, CatalogError>
    where
        T: Send + 'static,
        F: FnOnce(PathBuf) -> Result<T, CatalogError> + Send + 'static,
    {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || f(root))
            .await
            .map_err(|err| CatalogError::Join(err.to_string()))?
    }
}

fn not_found(err: CoreError) -> CatalogError {
    match err {
        CoreError::DatasetNotFound { id, .. } => CatalogError::NotFound { id },
        other => CatalogError::Core(other),
    }
}

#[async_trait]
impl DatasetCatalog for FileCatalog {
    async fn create(&self, dataset: Dataset) -> Result<Dataset, CatalogError> {
        self.blocking(move |root| {
            dataset.id.validate()?;
            if files::dataset_exists_at(&root, &dataset.id) {
                return Err(CatalogError::AlreadyExists { id: dataset.id });
            }
            files::save_dataset_at(&root, &dataset)?;
            Ok(dataset)
        })
        .await
    }

    async fn describe(&self, id: &DatasetId) -> Result<Dataset, CatalogError> {
        let id = id.clone();
        self.blocking(move |root| files::load_dataset_at(&root, &id).map_err(not_found))
            .await
    }

    async fn set_status(
        &self,
        id: &DatasetId,
        update: StatusUpdate,
    ) -> Result<Dataset, CatalogError> {
        let id = id.clone();
        self.blocking(move |root| {
            let mut dataset = files::load_dataset_at(&root, &id).map_err(not_found)?;
            update.apply(&mut dataset)?;
            files::save_dataset_at(&root, &dataset)?;
            Ok(dataset)
        })
        .await
    }

    async fn list(&self) -> Result<Vec<Dataset>, CatalogError> {
        self.blocking(|root| Ok(files::list_datasets_at(&root)?)).await
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
