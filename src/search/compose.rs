use crate::embedding::EmbeddingProvider;
use crate::errors::AppError;
use crate::models::{CombinationMode, SearchCriteria};
use crate::search::basis::{SearchBasis, VectorField};

/// Vector lists composed from free-text criteria, ready for query
/// execution. Composition does no similarity math; the index owns that.
#[derive(Clone, Debug)]
pub struct ComposedQuery {
    pub positive: Vec<Vec<f32>>,
    pub negative: Vec<Vec<f32>>,
    pub field: VectorField,
    pub mode: CombinationMode,
}

/// Embeds every positive and negative criterion individually, aligned to
/// the effective basis (the combined priority when the basis is combined).
/// List order is preserved; positive and negative entries are not paired.
pub async fn compose(
    embedder: &dyn EmbeddingProvider,
    criteria: &SearchCriteria,
    basis: SearchBasis,
) -> Result<ComposedQuery, AppError> {
    if criteria.criteria.is_empty() && criteria.negative_criteria.is_empty() {
        return Err(AppError::validation(
            "at least one criteria should be provided",
        ));
    }

    let field = if basis == SearchBasis::Combined {
        // a combined request is only complete with both the priority and
        // the extra prompt, validated as one precondition
        match (&criteria.combined_priority, &criteria.extra_prompt) {
            (Some(priority), Some(_)) => priority.vector_field(),
            _ => {
                return Err(AppError::validation(
                    "combined search requires both combined_priority and extra_prompt",
                ))
            }
        }
    } else {
        basis.vector_field()?
    };

    let mut positive = Vec::with_capacity(criteria.criteria.len());
    for text in &criteria.criteria {
        positive.push(embed_aligned(embedder, field, text).await?);
    }

    let mut negative = Vec::with_capacity(criteria.negative_criteria.len());
    for text in &criteria.negative_criteria {
        negative.push(embed_aligned(embedder, field, text).await?);
    }

    Ok(ComposedQuery {
        positive,
        negative,
        field,
        mode: criteria.mode,
    })
}

async fn embed_aligned(
    embedder: &dyn EmbeddingProvider,
    field: VectorField,
    text: &str,
) -> Result<Vec<f32>, AppError> {
    match field {
        VectorField::OcrText => embedder.embed_text_ocr(text).await,
        VectorField::Vision => embedder.embed_text_vision(text).await,
    }
}
