//! Embedding collaborator: text encoders aligned to the vision and OCR
//! spaces, an image encoder, and a random probe generator.
//!
//! The bundled implementation wraps fastembed. The vision space is the CLIP
//! text/image pair, so text queries and image embeddings land in the same
//! space; the OCR space uses a conventional text model.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, ImageEmbedding, ImageEmbeddingModel, ImageInitOptions, InitOptions,
    TextEmbedding,
};
use rand::Rng;
use tokio::task::block_in_place;

use crate::config::EmbeddingConfig;
use crate::errors::AppError;

/// Inference collaborator. Each method returns a fixed-dimension vector for
/// its aligned space; dimensionality is this collaborator's contract.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encodes text into the vision-aligned space.
    async fn embed_text_vision(&self, text: &str) -> Result<Vec<f32>, AppError>;
    /// Encodes text into the OCR-aligned space.
    async fn embed_text_ocr(&self, text: &str) -> Result<Vec<f32>, AppError>;
    /// Encodes raw image bytes into the vision space.
    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, AppError>;
    /// Recognizes text in the image and encodes it into the OCR space;
    /// `None` when the image carries no recognizable text.
    async fn embed_ocr_image(&self, bytes: &[u8]) -> Result<Option<Vec<f32>>, AppError>;
    /// A valid random point in the vision space (unit norm, never zero).
    async fn random_probe(&self) -> Result<Vec<f32>, AppError>;
}

/// fastembed-backed provider. Models are loaded eagerly at startup and the
/// wrappers take a Mutex because fastembed's embed() requires `&mut self`.
pub struct FastembedProvider {
    vision_text: Mutex<TextEmbedding>,
    ocr_text: Mutex<TextEmbedding>,
    image: Mutex<ImageEmbedding>,
    vision_dimensions: usize,
}

impl FastembedProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, AppError> {
        let models_dir = PathBuf::from(&config.cache_dir).join("models");
        std::fs::create_dir_all(&models_dir)?;

        let mut vision_text = TextEmbedding::try_new(
            InitOptions::new(EmbeddingModel::ClipVitB32)
                .with_cache_dir(models_dir.clone())
                .with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("failed to load the vision text model: {e}"))?;

        let ocr_text = TextEmbedding::try_new(
            InitOptions::new(parse_ocr_model(&config.ocr_model)?)
                .with_cache_dir(models_dir.clone())
                .with_show_download_progress(true),
        )
        .map_err(|e| anyhow::anyhow!("failed to load the OCR text model: {e}"))?;

        let image = ImageEmbedding::try_new(
            ImageInitOptions::new(ImageEmbeddingModel::ClipVitB32).with_cache_dir(models_dir),
        )
        .map_err(|e| anyhow::anyhow!("failed to load the image model: {e}"))?;

        let vision_dimensions = probe_dimensions(&mut vision_text)?;
        log::info!("embedding models loaded, vision space is {vision_dimensions}-dimensional");

        Ok(Self {
            vision_text: Mutex::new(vision_text),
            ocr_text: Mutex::new(ocr_text),
            image: Mutex::new(image),
            vision_dimensions,
        })
    }

    fn embed_text(model: &Mutex<TextEmbedding>, text: &str) -> Result<Vec<f32>, AppError> {
        let mut model = model
            .lock()
            .map_err(|e| AppError::computation(format!("embedding model lock poisoned: {e}")))?;

        let embeddings = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| anyhow::anyhow!("text embedding failed: {e}"))?;

        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AppError::computation("text model returned no embedding"))
    }
}

#[async_trait]
impl EmbeddingProvider for FastembedProvider {
    async fn embed_text_vision(&self, text: &str) -> Result<Vec<f32>, AppError> {
        block_in_place(|| Self::embed_text(&self.vision_text, text))
    }

    async fn embed_text_ocr(&self, text: &str) -> Result<Vec<f32>, AppError> {
        block_in_place(|| Self::embed_text(&self.ocr_text, text))
    }

    async fn embed_image(&self, bytes: &[u8]) -> Result<Vec<f32>, AppError> {
        block_in_place(|| {
            // fastembed reads images from disk, so spill the buffer into a
            // uniquely-named temp file for the duration of the call
            let path = std::env::temp_dir()
                .join(format!("glimpse-{}.img", rusty_ulid::generate_ulid_string()));
            std::fs::write(&path, bytes)?;

            let result = {
                let mut model = self.image.lock().map_err(|e| {
                    AppError::computation(format!("embedding model lock poisoned: {e}"))
                })?;
                model
                    .embed(vec![&path], None)
                    .map_err(|e| anyhow::anyhow!("image embedding failed: {e}"))
            };
            let _ = std::fs::remove_file(&path);

            result?
                .into_iter()
                .next()
                .ok_or_else(|| AppError::computation("image model returned no embedding"))
        })
    }

    async fn embed_ocr_image(&self, _bytes: &[u8]) -> Result<Option<Vec<f32>>, AppError> {
        // no local text recognizer is bundled; a deployment wanting OCR
        // indexing plugs a recognizing provider into this seam
        Ok(None)
    }

    async fn random_probe(&self) -> Result<Vec<f32>, AppError> {
        Ok(random_unit_vector(self.vision_dimensions))
    }
}

/// A uniformly-directed unit vector; retries the degenerate all-zero draw.
pub fn random_unit_vector(dimensions: usize) -> Vec<f32> {
    let mut rng = rand::rng();
    loop {
        let v: Vec<f32> = (0..dimensions)
            .map(|_| rng.random_range(-1.0f32..1.0))
            .collect();
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            return v.into_iter().map(|x| x / norm).collect();
        }
    }
}

fn parse_ocr_model(name: &str) -> Result<EmbeddingModel, AppError> {
    match name.to_lowercase().as_str() {
        "all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(EmbeddingModel::BGELargeENV15),
        _ => Err(AppError::Configuration(format!(
            "unknown OCR text model '{name}'; supported: all-MiniLM-L6-v2, \
             bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5"
        ))),
    }
}

fn probe_dimensions(model: &mut TextEmbedding) -> Result<usize, AppError> {
    let probe = model
        .embed(vec!["probe".to_string()], None)
        .map_err(|e| anyhow::anyhow!("failed to probe embedding dimensions: {e}"))?;

    probe
        .first()
        .map(|v| v.len())
        .ok_or_else(|| AppError::computation("text model returned no embedding"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_unit_vector_has_unit_norm() {
        for dimensions in [2, 8, 512] {
            let v = random_unit_vector(dimensions);
            assert_eq!(v.len(), dimensions);
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_random_unit_vectors_differ() {
        assert_ne!(random_unit_vector(16), random_unit_vector(16));
    }

    #[test]
    fn test_parse_ocr_model() {
        assert!(parse_ocr_model("bge-base-en-v1.5").is_ok());
        assert!(parse_ocr_model("BGE-Small-EN-v1.5").is_ok());
        assert!(matches!(
            parse_ocr_model("no-such-model"),
            Err(AppError::Configuration(_))
        ));
    }
}
