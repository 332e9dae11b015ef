//! A dataset bound to its archiver, object store and catalog.
//!
//! # Push
//!
//! ```text
//! catalog: pending ──► uploading (expiry = now + ttl) ──► success (size)
//!
//! blocking pool                      async task
//! archiver.archive(dir) ──(key, file)──► store.put(key, file)
//!              mpsc, capacity 1
//! ```
//!
//! A failed or cancelled push leaves the dataset `uploading`; readers give
//! up once its expiry passes.
//!
//! # Fetch
//!
//! The destination precondition is checked once, then `concurrency` workers
//! drain a shared queue of [`Archiver::index`] keys. Each worker downloads
//! one object into an anonymous temporary file and extracts it on the
//! blocking pool. The first failure cancels the others.

use std::collections::VecDeque;
use std::io::{Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ferry_archive::{prepare_destination, ArchiveError, Archiver};
use ferry_core::{Dataset, DatasetId, ObjectKey, TransferSettings, UploadStatus};

use crate::catalog::{DatasetCatalog, StatusUpdate};
use crate::clock::Clock;
use crate::error::{io_err, join_err, TransferError};
use crate::progress::{ProgressCounter, ProgressReader, ProgressWriter, Reporter};
use crate::storage::ObjectStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushSummary {
    pub dataset: DatasetId,
    pub objects: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    pub dataset: DatasetId,
    pub objects: usize,
    pub bytes: u64,
}

pub struct Handle {
    dataset: DatasetId,
    archiver: Arc<dyn Archiver>,
    store: Arc<dyn ObjectStore>,
    catalog: Arc<dyn DatasetCatalog>,
    clock: Arc<dyn Clock>,
    settings: TransferSettings,
    closed: AtomicBool,
}

impl Handle {
    pub(crate) fn new(
        dataset: DatasetId,
        archiver: Arc<dyn Archiver>,
        store: Arc<dyn ObjectStore>,
        catalog: Arc<dyn DatasetCatalog>,
        clock: Arc<dyn Clock>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            dataset,
            archiver,
            store,
            catalog,
            clock,
            settings,
            closed: AtomicBool::new(false),
        }
    }

    pub fn dataset(&self) -> &DatasetId {
        &self.dataset
    }

    pub fn archiver(&self) -> &Arc<dyn Archiver> {
        &self.archiver
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Current catalog record of this handle's dataset.
    pub async fn describe(&self) -> Result<Dataset, TransferError> {
        Ok(self.catalog.describe(&self.dataset).await?)
    }

    /// Archive `local` and upload every object, then mark the dataset
    /// `success`.
    pub async fn push(
        &self,
        cancel: &CancellationToken,
        local: &Path,
        reporter: Arc<dyn Reporter>,
    ) -> Result<PushSummary, TransferError> {
        self.ensure_open()?;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let now = self.clock.now();
        let ttl = i64::try_from(self.settings.upload_ttl_secs).unwrap_or(i64::MAX);
        let expire = now.timestamp().saturating_add(ttl);
        self.catalog
            .set_status(
                &self.dataset,
                StatusUpdate::new(UploadStatus::Uploading, now).expiring(expire),
            )
            .await?;
        info!(dataset = %self.dataset, source = %local.display(), "push started");

        let counter = ProgressCounter::new(reporter);
        let objects = match self.upload(cancel, local, counter.clone()).await {
            Ok(objects) => objects,
            Err(err) => {
                warn!(dataset = %self.dataset, error = %err, "push failed; dataset left uploading");
                return Err(err);
            }
        };

        let bytes = counter.total();
        self.catalog
            .set_status(
                &self.dataset,
                StatusUpdate::new(UploadStatus::Success, self.clock.now()).with_size(bytes),
            )
            .await?;
        info!(dataset = %self.dataset, objects, bytes, "push completed");
        Ok(PushSummary {
            dataset: self.dataset.clone(),
            objects,
            bytes,
        })
    }

    async fn upload(
        &self,
        cancel: &CancellationToken,
        local: &Path,
        counter: ProgressCounter,
    ) -> Result<usize, TransferError> {
        let (tx, mut rx) = mpsc::channel::<(ObjectKey, std::fs::File)>(1);
        let archiver = self.archiver.clone();
        let source = local.to_path_buf();
        let producer = tokio::task::spawn_blocking(move || {
            archiver.archive(&source, &mut |key, object| {
                let object = object.try_clone().map_err(|e| ArchiveError::Io {
                    path: source.clone(),
                    source: e,
                })?;
                tx.blocking_send((key.clone(), object))
                    .map_err(|_| ArchiveError::Interrupted { key: key.clone() })
            })
        });

        let store = self.store.clone();
        let uploads = async {
            let mut objects = 0usize;
            while let Some((key, object)) = rx.recv().await {
                let mut body = ProgressReader::new(tokio::fs::File::from_std(object), counter.clone());
                let bytes = store.put(&key, &mut body).await?;
                debug!(key = %key, bytes, "uploaded object");
                objects += 1;
            }
            Ok::<_, TransferError>(objects)
        };

        let objects = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransferError::Cancelled),
            result = uploads => result?,
        };
        // The channel only closes once the producer is done.
        producer.await.map_err(join_err)??;
        Ok(objects)
    }

    /// Sequential fetch of every object into `local`.
    pub async fn pull(
        &self,
        cancel: &CancellationToken,
        local: &Path,
        reporter: Arc<dyn Reporter>,
    ) -> Result<FetchSummary, TransferError> {
        self.fetch_into(cancel, local, 1, reporter).await
    }

    /// Fetch and extract every object into `local` with up to `concurrency`
    /// workers.
    pub async fn fetch_into(
        &self,
        cancel: &CancellationToken,
        local: &Path,
        concurrency: usize,
        reporter: Arc<dyn Reporter>,
    ) -> Result<FetchSummary, TransferError> {
        self.ensure_open()?;
        if cancel.is_cancelled() {
            return Err(TransferError::Cancelled);
        }

        let destination = local.to_path_buf();
        let archiver = self.archiver.clone();
        let keys = tokio::task::spawn_blocking(move || {
            prepare_destination(&destination)?;
            archiver.keys()
        })
        .await
        .map_err(join_err)??;

        let objects = keys.len();
        let workers = concurrency.max(1).min(objects);
        debug!(dataset = %self.dataset, objects, workers, "fetching");

        let queue = Arc::new(Mutex::new(VecDeque::from(keys)));
        let counter = ProgressCounter::new(reporter);
        let stop = cancel.child_token();
        let mut set = JoinSet::new();
        for _ in 0..workers {
            let worker = Worker {
                queue: queue.clone(),
                archiver: self.archiver.clone(),
                store: self.store.clone(),
                counter: counter.clone(),
                cancel: stop.clone(),
                destination: local.to_path_buf(),
            };
            set.spawn(worker.run());
        }

        let mut first_err = None;
        while let Some(joined) = set.join_next().await {
            let err = match joined {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err,
                Err(err) if err.is_cancelled() => continue,
                Err(err) => join_err(err),
            };
            if first_err.is_none() {
                stop.cancel();
                set.abort_all();
                first_err = Some(err);
            }
        }
        if let Some(err) = first_err {
            return Err(err);
        }

        Ok(FetchSummary {
            dataset: self.dataset.clone(),
            objects,
            bytes: counter.total(),
        })
    }

    /// Release the handle. Safe to call more than once.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(dataset = %self.dataset, "handle closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<(), TransferError> {
        if self.is_closed() {
            return Err(TransferError::HandleClosed {
                id: self.dataset.clone(),
            });
        }
        Ok(())
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("dataset", &self.dataset)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Fetch worker
// ---------------------------------------------------------------------------

struct Worker {
    queue: Arc<Mutex<VecDeque<ObjectKey>>>,
    archiver: Arc<dyn Archiver>,
    store: Arc<dyn ObjectStore>,
    counter: ProgressCounter,
    cancel: CancellationToken,
    destination: PathBuf,
}

impl Worker {
    fn next_key(&self) -> Option<ObjectKey> {
        self.queue
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    async fn run(self) -> Result<(), TransferError> {
        while let Some(key) = self.next_key() {
            if self.cancel.is_cancelled() {
                return Err(TransferError::Cancelled);
            }

            let object = tempfile::tempfile().map_err(|e| io_err(&self.destination, e))?;
            let mut sink = ProgressWriter::new(tokio::fs::File::from_std(object), self.counter.clone());
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                fetched = self.store.get(&key, &mut sink) => { fetched?; }
            }
            let mut object = sink.into_inner();
            object
                .flush()
                .await
                .map_err(|e| io_err(&self.destination, e))?;
            let mut object = object.into_std().await;

            let archiver = self.archiver.clone();
            let destination = self.destination.clone();
            let extract_key = key.clone();
            let extract = tokio::task::spawn_blocking(move || {
                object
                    .seek(SeekFrom::Start(0))
                    .map_err(|e| ArchiveError::Io {
                        path: destination.clone(),
                        source: e,
                    })?;
                archiver.extract(&destination, &extract_key, &mut object)
            });
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(TransferError::Cancelled),
                extracted = extract => { extracted.map_err(join_err)??; }
            }
            debug!(key = %key, "object extracted");
        }
        Ok(())
    }
}
