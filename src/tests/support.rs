//! Shared fixtures: a deterministic stub embedder, a write-counting index
//! wrapper and an app context over a temp storage directory.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::context::AppContext;
use crate::embedding::EmbeddingProvider;
use crate::errors::AppError;
use crate::index::{ImageIndex, MemoryIndex, VectorQuery};
use crate::ingest::IndexingQueue;
use crate::models::{ImageId, ImageRecord, Paging, SearchHit};
use crate::search::VectorField;
use crate::storage::{LocalStorage, StorageBackend};

pub const STUB_DIMENSIONS: usize = 8;

/// Unit vector derived deterministically from a seed.
pub fn seeded_vector(seed: &[u8]) -> Vec<f32> {
    let digest = Sha256::digest(seed);
    let v: Vec<f32> = digest
        .iter()
        .take(STUB_DIMENSIONS)
        .map(|b| f32::from(*b) - 127.5)
        .collect();
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.into_iter().map(|x| x / norm).collect()
}

/// Embedding stub with distinct, deterministic spaces: the same text maps
/// to different vectors under the vision and OCR encoders.
pub struct StubEmbedder;

#[async_trait]
impl EmbeddingProvider for StubEmbedder {
    async fn embed_text_vision(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(seeded_vector(format!("vision:{text}").as_bytes()))
    }

    async fn embed_text_ocr(&self, text: &str) -> Result<Vec<f32>, AppError> {
        Ok(seeded_vector(format!("ocr:{text}").as_bytes()))
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, AppError> {
        let mut seed = b"image:".to_vec();
        seed.extend_from_slice(bytes);
        Ok(seeded_vector(&seed))
    }

    async fn embed_ocr_image(&self, bytes: &[u8]) -> Result<Option<Vec<f32>>, AppError> {
        let mut seed = b"ocr-image:".to_vec();
        seed.extend_from_slice(bytes);
        Ok(Some(seeded_vector(&seed)))
    }

    async fn random_probe(&self) -> Result<Vec<f32>, AppError> {
        Ok(seeded_vector(b"random-probe"))
    }
}

/// Delegating index that counts payload writes, so tests can assert an
/// operation wrote nothing.
pub struct CountingIndex {
    inner: MemoryIndex,
    payload_writes: AtomicUsize,
}

impl CountingIndex {
    pub fn new() -> Self {
        Self {
            inner: MemoryIndex::new(),
            payload_writes: AtomicUsize::new(0),
        }
    }

    pub fn payload_writes(&self) -> usize {
        self.payload_writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ImageIndex for CountingIndex {
    async fn retrieve(&self, id: &ImageId) -> Result<ImageRecord, AppError> {
        self.inner.retrieve(id).await
    }

    async fn insert(&self, record: ImageRecord) -> Result<(), AppError> {
        self.inner.insert(record).await
    }

    async fn delete_items(&self, ids: &[ImageId]) -> Result<(), AppError> {
        self.inner.delete_items(ids).await
    }

    async fn update_payload(&self, record: &ImageRecord) -> Result<(), AppError> {
        self.payload_writes.fetch_add(1, Ordering::Relaxed);
        self.inner.update_payload(record).await
    }

    async fn validate_ids(&self, ids: &[ImageId]) -> Result<Vec<ImageId>, AppError> {
        self.inner.validate_ids(ids).await
    }

    async fn count(&self) -> Result<usize, AppError> {
        self.inner.count().await
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<SearchHit>, AppError> {
        self.inner.query(query).await
    }

    async fn query_by_id(
        &self,
        id: &ImageId,
        field: VectorField,
        paging: Paging,
    ) -> Result<Vec<SearchHit>, AppError> {
        self.inner.query_by_id(id, field, paging).await
    }
}

pub struct TestApp {
    pub ctx: Arc<AppContext>,
    pub index: Arc<CountingIndex>,
    /// Kept alive for the lifetime of the test; dropping it removes the
    /// storage root.
    pub storage_dir: tempfile::TempDir,
}

/// Builds a context over stub collaborators. Must run inside a tokio
/// runtime (the queue worker is spawned here).
pub fn build_app(ocr_enabled: bool) -> TestApp {
    build_app_with(|config| config.ocr_search.enabled = ocr_enabled)
}

/// Like [`build_app`], with full control over the config before the
/// context is assembled.
pub fn build_app_with(mutate: impl FnOnce(&mut Config)) -> TestApp {
    let storage_dir = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.storage.root = storage_dir.path().to_str().unwrap().to_string();
    mutate(&mut config);

    let index = Arc::new(CountingIndex::new());
    let storage: Arc<dyn StorageBackend> =
        Arc::new(LocalStorage::new(&config.storage.root).unwrap());
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(StubEmbedder);

    let queue = IndexingQueue::spawn(
        index.clone(),
        storage.clone(),
        embedder.clone(),
        config.storage.enabled,
        config.ocr_search.enabled,
    );

    let ctx = AppContext::new(config, index.clone(), storage, embedder, queue);
    TestApp {
        ctx,
        index,
        storage_dir,
    }
}

/// Waits until the indexing worker has processed everything submitted.
pub async fn drain_queue(ctx: &AppContext) {
    for _ in 0..500 {
        if ctx.queue.depth() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("indexing queue did not drain");
}

/// A decodable 1x1 PNG; the pixel varies the bytes so distinct uploads get
/// distinct content ids.
pub fn tiny_png(pixel: [u8; 3]) -> Vec<u8> {
    let mut img = image::RgbaImage::new(1, 1);
    img.put_pixel(0, 0, image::Rgba([pixel[0], pixel[1], pixel[2], 255]));

    let mut buf = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buf);
    img.write_to(&mut cursor, image::ImageFormat::Png).unwrap();
    buf
}

/// Inserts a ready-made record with the given vision embedding.
pub async fn seed_record(
    ctx: &AppContext,
    id: &str,
    vision: Option<Vec<f32>>,
    ocr: Option<Vec<f32>>,
) -> ImageRecord {
    let record = ImageRecord {
        id: ImageId::from(id),
        url: format!("https://img.example/{id}"),
        thumbnail_url: None,
        local: false,
        categories: Vec::new(),
        starred: false,
        format: "png".to_string(),
        index_date: chrono::Utc::now(),
        image_embedding: vision,
        ocr_embedding: ocr,
    };
    ctx.index.insert(record.clone()).await.unwrap();
    record
}
