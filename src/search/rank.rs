//! Dual-basis rescoring for combined search.
//!
//! Results arrive ranked by the priority vector field; every result is then
//! rescored by its similarity to the independently-embedded extra prompt,
//! so the final order reflects both bases.

use crate::errors::AppError;
use crate::index::cosine;
use crate::models::SearchHit;

/// Rescores `hits` against the extra-prompt vector and returns a new
/// ordering, descending by `similarity × original score`. The product is
/// not clamped and may go negative. Equal scores keep their original
/// relative order.
///
/// Every hit must carry an image embedding or an OCR embedding (the image
/// embedding is preferred), and no embedding involved may have zero
/// magnitude: cosine is undefined there, which is an invariant violation
/// surfaced as an error, never silently skipped.
pub fn rescore(hits: Vec<SearchHit>, prompt_vector: &[f32]) -> Result<Vec<SearchHit>, AppError> {
    let mut rescored = Vec::with_capacity(hits.len());

    for mut hit in hits {
        let comparison = hit
            .img
            .image_embedding
            .as_ref()
            .or(hit.img.ocr_embedding.as_ref())
            .ok_or_else(|| {
                AppError::computation(format!("image {} has no embedding to rescore", hit.img.id))
            })?;

        let similarity = cosine(comparison, prompt_vector).ok_or_else(|| {
            AppError::computation(format!(
                "cosine similarity undefined for image {}",
                hit.img.id
            ))
        })?;

        hit.score *= similarity;
        rescored.push(hit);
    }

    // Vec::sort_by is stable, so ties keep their original relative order
    rescored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    Ok(rescored)
}
