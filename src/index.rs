//! Vector index collaborator: the trait consumed by search and ingestion,
//! plus the in-memory implementation used by the bundled server.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::errors::AppError;
use crate::models::{CombinationMode, ImageId, ImageRecord, Paging, SearchHit};
use crate::search::VectorField;

/// A multi-vector query against one embedding field.
#[derive(Clone, Debug)]
pub struct VectorQuery {
    pub positive: Vec<Vec<f32>>,
    pub negative: Vec<Vec<f32>>,
    pub field: VectorField,
    pub mode: CombinationMode,
    pub paging: Paging,
}

impl VectorQuery {
    /// An ordinary single-vector nearest-neighbor query.
    pub fn nearest(vector: Vec<f32>, field: VectorField, paging: Paging) -> Self {
        Self {
            positive: vec![vector],
            negative: Vec::new(),
            field,
            mode: CombinationMode::default(),
            paging,
        }
    }
}

/// The vector index the service reads and writes. Per-id operations are
/// atomic; cross-call sequences (check-then-act) are not serialized here.
#[async_trait]
pub trait ImageIndex: Send + Sync {
    async fn retrieve(&self, id: &ImageId) -> Result<ImageRecord, AppError>;
    async fn insert(&self, record: ImageRecord) -> Result<(), AppError>;
    async fn delete_items(&self, ids: &[ImageId]) -> Result<(), AppError>;
    /// Replaces the payload of an existing record.
    async fn update_payload(&self, record: &ImageRecord) -> Result<(), AppError>;
    /// The subset of `ids` that exist in the index.
    async fn validate_ids(&self, ids: &[ImageId]) -> Result<Vec<ImageId>, AppError>;
    async fn count(&self) -> Result<usize, AppError>;
    async fn query(&self, query: VectorQuery) -> Result<Vec<SearchHit>, AppError>;
    /// Nearest neighbors of an already-indexed record, excluding the record
    /// itself.
    async fn query_by_id(
        &self,
        id: &ImageId,
        field: VectorField,
        paging: Paging,
    ) -> Result<Vec<SearchHit>, AppError>;
}

/// Cosine similarity, or `None` when it is undefined (zero magnitude on
/// either side, or mismatched dimensions).
pub fn cosine(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let norm_a = l2_norm(a);
    let norm_b = l2_norm(b);
    if norm_a < f32::EPSILON || norm_b < f32::EPSILON {
        return None;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    Some(dot / (norm_a * norm_b))
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// In-memory index over full image records.
///
/// Scoring semantics for multi-vector queries are defined here, at the
/// collaborator boundary: the positive relevance of a record is the mean
/// (Average mode) or maximum (Best mode) cosine against the positive
/// vectors; when negative vectors are present, the maximum cosine against
/// them is subtracted. Ties break by descending score, then id, so results
/// are deterministic.
#[derive(Default)]
pub struct MemoryIndex {
    records: RwLock<HashMap<String, ImageRecord>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn field_embedding(record: &ImageRecord, field: VectorField) -> Option<&Vec<f32>> {
        match field {
            VectorField::Vision => record.image_embedding.as_ref(),
            VectorField::OcrText => record.ocr_embedding.as_ref(),
        }
    }

    fn score(record: &ImageRecord, query: &VectorQuery) -> Option<f32> {
        let embedding = Self::field_embedding(record, query.field)?;

        let similarities: Vec<f32> = query
            .positive
            .iter()
            .filter_map(|v| cosine(embedding, v))
            .collect();
        if similarities.len() != query.positive.len() {
            return None;
        }

        // a negative-only query scores every candidate from zero
        let positive = if similarities.is_empty() {
            0.0
        } else {
            match query.mode {
                CombinationMode::Average => {
                    similarities.iter().sum::<f32>() / similarities.len() as f32
                }
                CombinationMode::Best => similarities.iter().cloned().fold(f32::MIN, f32::max),
            }
        };

        let penalty = query
            .negative
            .iter()
            .filter_map(|v| cosine(embedding, v))
            .fold(None::<f32>, |acc, s| Some(acc.map_or(s, |a| a.max(s))));

        Some(positive - penalty.unwrap_or(0.0))
    }

    fn rank(
        records: &HashMap<String, ImageRecord>,
        query: &VectorQuery,
        exclude: Option<&ImageId>,
    ) -> Vec<SearchHit> {
        let mut hits: Vec<SearchHit> = records
            .values()
            .filter(|record| exclude.map_or(true, |id| record.id != *id))
            .filter_map(|record| {
                Self::score(record, query).map(|score| SearchHit {
                    img: record.clone(),
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.img.id.cmp(&b.img.id))
        });

        hits.into_iter()
            .skip(query.paging.skip)
            .take(query.paging.count)
            .collect()
    }
}

#[async_trait]
impl ImageIndex for MemoryIndex {
    async fn retrieve(&self, id: &ImageId) -> Result<ImageRecord, AppError> {
        self.records
            .read()
            .await
            .get(id.as_str())
            .cloned()
            .ok_or(AppError::NotFound)
    }

    async fn insert(&self, record: ImageRecord) -> Result<(), AppError> {
        self.records
            .write()
            .await
            .insert(record.id.to_string(), record);
        Ok(())
    }

    async fn delete_items(&self, ids: &[ImageId]) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        for id in ids {
            records.remove(id.as_str());
        }
        Ok(())
    }

    async fn update_payload(&self, record: &ImageRecord) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        match records.get_mut(record.id.as_str()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(AppError::NotFound),
        }
    }

    async fn validate_ids(&self, ids: &[ImageId]) -> Result<Vec<ImageId>, AppError> {
        let records = self.records.read().await;
        Ok(ids
            .iter()
            .filter(|id| records.contains_key(id.as_str()))
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<usize, AppError> {
        Ok(self.records.read().await.len())
    }

    async fn query(&self, query: VectorQuery) -> Result<Vec<SearchHit>, AppError> {
        let records = self.records.read().await;
        Ok(Self::rank(&records, &query, None))
    }

    async fn query_by_id(
        &self,
        id: &ImageId,
        field: VectorField,
        paging: Paging,
    ) -> Result<Vec<SearchHit>, AppError> {
        let records = self.records.read().await;
        let source = records.get(id.as_str()).ok_or(AppError::NotFound)?;
        let vector = Self::field_embedding(source, field).cloned().ok_or_else(|| {
            AppError::validation(format!("image {id} has no {field} embedding"))
        })?;

        let query = VectorQuery::nearest(vector, field, paging);
        Ok(Self::rank(&records, &query, Some(id)))
    }
}
