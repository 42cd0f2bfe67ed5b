use crate::embedding::EmbeddingProvider;
use crate::errors::AppError;
use crate::search::basis::SearchBasis;

/// A search input awaiting projection into an embedding space.
pub enum QueryInput<'a> {
    Text(&'a str),
    Image(&'a [u8]),
    /// A random probe; the produced vector is a valid point in the space,
    /// not a zero vector.
    None,
}

/// Projects the input into the embedding space aligned with the basis.
///
/// The produced vector's dimensionality matching the queried field is the
/// embedding collaborator's contract and is not re-checked here.
pub async fn produce(
    embedder: &dyn EmbeddingProvider,
    basis: SearchBasis,
    input: QueryInput<'_>,
) -> Result<Vec<f32>, AppError> {
    match input {
        QueryInput::Text(text) => match basis {
            SearchBasis::Vision => embedder.embed_text_vision(text).await,
            SearchBasis::Ocr => embedder.embed_text_ocr(text).await,
            SearchBasis::Combined => Err(AppError::validation(
                "combined basis is only supported by advanced search",
            )),
        },
        QueryInput::Image(bytes) => embedder.embed_image(bytes).await,
        QueryInput::None => embedder.random_probe().await,
    }
}
