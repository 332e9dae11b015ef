//! Factory for [`Handle`]s.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use ferry_core::{ArchiverConfig, Dataset, DatasetId, StorageConfig, TransferSettings};

use crate::catalog::DatasetCatalog;
use crate::clock::{Clock, SystemClock};
use crate::error::TransferError;
use crate::handle::Handle;
use crate::storage::{ObjectStore, StoreConnector};

pub struct TransferManager {
    catalog: Arc<dyn DatasetCatalog>,
    connector: Arc<dyn StoreConnector>,
    settings: TransferSettings,
    clock: Arc<dyn Clock>,
}

impl TransferManager {
    pub fn new(
        catalog: Arc<dyn DatasetCatalog>,
        connector: Arc<dyn StoreConnector>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            catalog,
            connector,
            settings,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock used for upload expiry.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn catalog(&self) -> &Arc<dyn DatasetCatalog> {
        &self.catalog
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Record a new `pending` dataset and return a handle to it.
    ///
    /// `name` becomes the dataset id; `None` generates one. The archiver is
    /// rooted at `<key_prefix><id>/` so datasets never share keys.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        name: Option<DatasetId>,
        storage: StorageConfig,
        archiver: ArchiverConfig,
    ) -> Result<Handle, TransferError> {
        let id = name.unwrap_or_else(DatasetId::generate);
        id.validate()?;
        archiver.validate()?;

        let store = self.connect(cancel, &storage).await?;
        let archiver = archiver.nested(id.as_str());
        let built = ferry_archive::from_config(&archiver)?;

        let dataset = Dataset::new(id.clone(), storage, archiver, self.clock.now());
        self.catalog.create(dataset).await?;
        info!(dataset = %id, "dataset created");
        Ok(self.handle(id, Arc::from(built), store))
    }

    /// Handle to an existing dataset, rebuilt from its recorded settings.
    pub async fn open(
        &self,
        cancel: &CancellationToken,
        id: &DatasetId,
    ) -> Result<Handle, TransferError> {
        let dataset = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            described = self.catalog.describe(id) => described?,
        };
        let store = self.connect(cancel, &dataset.storage).await?;
        let built = ferry_archive::from_config(&dataset.archiver)?;
        debug!(dataset = %id, status = %dataset.status, "dataset opened");
        Ok(self.handle(dataset.id, Arc::from(built), store))
    }

    async fn connect(
        &self,
        cancel: &CancellationToken,
        storage: &StorageConfig,
    ) -> Result<Arc<dyn ObjectStore>, TransferError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TransferError::Cancelled),
            store = self.connector.connect(storage) => Ok(store?),
        }
    }

    fn handle(
        &self,
        id: DatasetId,
        archiver: Arc<dyn ferry_archive::Archiver>,
        store: Arc<dyn ObjectStore>,
    ) -> Handle {
        Handle::new(
            id,
            archiver,
            store,
            self.catalog.clone(),
            self.clock.clone(),
            self.settings.clone(),
        )
    }
}
