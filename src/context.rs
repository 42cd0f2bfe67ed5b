use std::sync::Arc;

use anyhow::Result;

use crate::config::Config;
use crate::embedding::{EmbeddingProvider, FastembedProvider};
use crate::index::{ImageIndex, MemoryIndex};
use crate::ingest::IndexingQueue;
use crate::storage::{LocalStorage, StorageBackend};

/// Application context bundling the collaborator handles every operation
/// needs. Constructed once and passed explicitly; there is no process-wide
/// shared state.
pub struct AppContext {
    pub config: Config,
    pub index: Arc<dyn ImageIndex>,
    pub storage: Arc<dyn StorageBackend>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub queue: IndexingQueue,
}

impl AppContext {
    pub fn new(
        config: Config,
        index: Arc<dyn ImageIndex>,
        storage: Arc<dyn StorageBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        queue: IndexingQueue,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            index,
            storage,
            embedder,
            queue,
        })
    }

    /// Builds the context with the bundled collaborators: local file
    /// storage, the in-memory index and the fastembed provider. Must run
    /// inside a tokio runtime (the queue worker is spawned here).
    pub fn initialize(config: Config) -> Result<Arc<Self>> {
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config.storage.root)?);
        let index: Arc<dyn ImageIndex> = Arc::new(MemoryIndex::new());
        let embedder: Arc<dyn EmbeddingProvider> =
            Arc::new(FastembedProvider::new(&config.embedding)?);

        let queue = IndexingQueue::spawn(
            index.clone(),
            storage.clone(),
            embedder.clone(),
            config.storage.enabled,
            config.ocr_search.enabled,
        );

        Ok(Self::new(config, index, storage, embedder, queue))
    }
}
