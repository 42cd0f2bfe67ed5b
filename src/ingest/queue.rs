//! Asynchronous indexing queue.
//!
//! Uploads are acknowledged as soon as the job is enqueued; embedding and
//! index insertion happen on a background worker, so a record is not
//! searchable until the worker gets to it. The depth counter is advisory
//! observability only; nothing sheds load when it grows.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::embedding::EmbeddingProvider;
use crate::errors::AppError;
use crate::index::ImageIndex;
use crate::models::ImageRecord;
use crate::storage::StorageBackend;

struct IndexJob {
    record: ImageRecord,
    bytes: Vec<u8>,
    skip_ocr: bool,
}

pub struct IndexingQueue {
    tx: mpsc::UnboundedSender<IndexJob>,
    depth: Arc<AtomicUsize>,
}

impl IndexingQueue {
    /// Starts the background worker and returns the submission handle.
    pub fn spawn(
        index: Arc<dyn ImageIndex>,
        storage: Arc<dyn StorageBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        storage_enabled: bool,
        ocr_enabled: bool,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<IndexJob>();
        let depth = Arc::new(AtomicUsize::new(0));

        let worker_depth = depth.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let id = job.record.id.clone();
                // failed jobs are dropped, not retried; the collaborators
                // own their own resilience
                match process(&*index, &*storage, &*embedder, storage_enabled, ocr_enabled, job)
                    .await
                {
                    Ok(()) => log::info!("image {id} indexed"),
                    Err(err) => log::error!("indexing image {id} failed: {err}"),
                }
                worker_depth.fetch_sub(1, Ordering::Relaxed);
            }
            log::debug!("indexing queue closed");
        });

        Self { tx, depth }
    }

    /// Fire-and-enqueue; returns as soon as the job is queued.
    pub fn submit(
        &self,
        record: ImageRecord,
        bytes: Vec<u8>,
        skip_ocr: bool,
    ) -> Result<(), AppError> {
        self.depth.fetch_add(1, Ordering::Relaxed);
        if self
            .tx
            .send(IndexJob {
                record,
                bytes,
                skip_ocr,
            })
            .is_err()
        {
            self.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(AppError::computation("the indexing queue is closed"));
        }
        Ok(())
    }

    /// Jobs submitted but not yet fully processed.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }
}

async fn process(
    index: &dyn ImageIndex,
    storage: &dyn StorageBackend,
    embedder: &dyn EmbeddingProvider,
    storage_enabled: bool,
    ocr_enabled: bool,
    job: IndexJob,
) -> Result<(), AppError> {
    let mut record = job.record;

    if record.local && storage_enabled {
        storage
            .write(&format!("{}.{}", record.id, record.format), &job.bytes)
            .await?;
    }

    record.image_embedding = Some(embedder.embed_image(&job.bytes).await?);

    if !job.skip_ocr && ocr_enabled {
        record.ocr_embedding = embedder.embed_ocr_image(&job.bytes).await?;
    }

    index.insert(record).await
}
