//! Per-request search coordination: resolves the basis, dispatches to the
//! right embedding space and query shape, and assembles the ordered result.

use std::fmt::Display;

use serde::Serialize;

use crate::context::AppContext;
use crate::embedding::EmbeddingProvider;
use crate::errors::AppError;
use crate::index::{ImageIndex, VectorQuery};
use crate::models::{ImageId, Paging, SearchCriteria, SearchHit};
use crate::search::basis::{CombinedPriority, SearchBasis, VectorField};
use crate::search::compose::compose;
use crate::search::query::{produce, QueryInput};
use crate::search::rank::rescore;

/// Correlation id minted fresh for every search call. It is part of the
/// wire contract but never persisted; recalling a past query by id is a
/// declared capability that is not implemented.
#[derive(Clone, Debug, Serialize)]
pub struct QueryId(String);

impl QueryId {
    pub fn mint() -> Self {
        QueryId(rusty_ulid::generate_ulid_string())
    }
}

impl Display for QueryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered result set; never longer than the requested count.
#[derive(Debug, Serialize)]
pub struct SearchOutcome {
    pub query_id: QueryId,
    pub hits: Vec<SearchHit>,
}

impl SearchOutcome {
    fn new(hits: Vec<SearchHit>) -> Self {
        Self {
            query_id: QueryId::mint(),
            hits,
        }
    }
}

/// Text prompt against the basis's own field. Combined is not a valid
/// basis here; it only exists inside advanced search.
pub async fn text_search(
    ctx: &AppContext,
    prompt: &str,
    basis: SearchBasis,
    paging: Paging,
) -> Result<SearchOutcome, AppError> {
    let basis = basis.resolve(ctx.config.ocr_search.enabled)?;
    let field = basis.vector_field()?;

    log::info!("text search, prompt: {prompt}");
    let vector = produce(ctx.embedder.as_ref(), basis, QueryInput::Text(prompt)).await?;
    let hits = ctx
        .index
        .query(VectorQuery::nearest(vector, field, paging))
        .await?;
    Ok(SearchOutcome::new(hits))
}

/// Raw image bytes against the vision field.
pub async fn image_search(
    ctx: &AppContext,
    bytes: &[u8],
    paging: Paging,
) -> Result<SearchOutcome, AppError> {
    log::info!("image search, {} bytes", bytes.len());
    let vector = produce(
        ctx.embedder.as_ref(),
        SearchBasis::Vision,
        QueryInput::Image(bytes),
    )
    .await?;
    let hits = ctx
        .index
        .query(VectorQuery::nearest(vector, VectorField::Vision, paging))
        .await?;
    Ok(SearchOutcome::new(hits))
}

/// Neighbors of an already-indexed record; no new embedding is computed and
/// the source record never appears in the result.
pub async fn similar_search(
    ctx: &AppContext,
    id: &ImageId,
    basis: SearchBasis,
    paging: Paging,
) -> Result<SearchOutcome, AppError> {
    let basis = basis.resolve(ctx.config.ocr_search.enabled)?;
    let field = basis.vector_field()?;

    log::info!("similar search, id: {id}");
    let hits = ctx.index.query_by_id(id, field, paging).await?;
    Ok(SearchOutcome::new(hits))
}

/// Multi-criteria search; under a combined basis the result set is rescored
/// by similarity to the extra prompt.
pub async fn advanced_search(
    ctx: &AppContext,
    criteria: &SearchCriteria,
    basis: SearchBasis,
    paging: Paging,
) -> Result<SearchOutcome, AppError> {
    let basis = basis.resolve(ctx.config.ocr_search.enabled)?;

    log::info!(
        "advanced search, {} positive / {} negative criteria",
        criteria.criteria.len(),
        criteria.negative_criteria.len()
    );
    let composed = compose(ctx.embedder.as_ref(), criteria, basis).await?;
    let mut hits = ctx
        .index
        .query(VectorQuery {
            positive: composed.positive,
            negative: composed.negative,
            field: composed.field,
            mode: composed.mode,
            paging,
        })
        .await?;

    if basis == SearchBasis::Combined {
        let (Some(priority), Some(prompt)) =
            (criteria.combined_priority, criteria.extra_prompt.as_deref())
        else {
            return Err(AppError::computation(
                "combined search passed composition without priority and extra prompt",
            ));
        };

        let prompt_vector = match priority {
            CombinedPriority::Vision => ctx.embedder.embed_text_vision(prompt).await?,
            CombinedPriority::Ocr => ctx.embedder.embed_text_ocr(prompt).await?,
        };
        hits = rescore(hits, &prompt_vector)?;
    }

    Ok(SearchOutcome::new(hits))
}

/// Nearest neighbors of a random probe: an approximate sample, not a
/// uniform one.
pub async fn random_search(ctx: &AppContext, paging: Paging) -> Result<SearchOutcome, AppError> {
    log::info!("random pick");
    let vector = produce(ctx.embedder.as_ref(), SearchBasis::Vision, QueryInput::None).await?;
    let hits = ctx
        .index
        .query(VectorQuery::nearest(vector, VectorField::Vision, paging))
        .await?;
    Ok(SearchOutcome::new(hits))
}

/// Recall of a past query. Declared in the interface, permanently
/// unimplemented; callers must not depend on it.
pub fn recall(_query_id: &str) -> Result<SearchOutcome, AppError> {
    Err(AppError::NotImplemented)
}
