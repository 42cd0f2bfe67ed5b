//! Upload validation: content-addressed dedup, format resolution and a
//! decode check, in that order. Nothing here mutates the index.

use std::collections::HashMap;

use chrono::Utc;
use once_cell::sync::Lazy;

use crate::errors::AppError;
use crate::index::ImageIndex;
use crate::models::{ImageId, ImageRecord};

/// Declared content-type to canonical format tag.
static CONTENT_TYPE_FORMATS: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("image/jpeg", "jpeg"),
        ("image/png", "png"),
        ("image/webp", "webp"),
        ("image/gif", "gif"),
    ])
});

/// Filename extension fallback, consulted only when the content-type is
/// unrecognized.
static EXTENSION_FORMATS: Lazy<HashMap<&str, &str>> = Lazy::new(|| {
    HashMap::from([
        ("jpg", "jpeg"),
        ("jpeg", "jpeg"),
        ("jfif", "jpeg"),
        ("png", "png"),
        ("webp", "webp"),
        ("gif", "gif"),
    ])
});

/// Caller-provided payload fields accompanying an upload.
#[derive(Clone, Debug, Default)]
pub struct UploadFields {
    pub url: String,
    pub thumbnail_url: Option<String>,
    pub local: bool,
    pub categories: Vec<String>,
    pub starred: bool,
}

/// Maps the declared content-type through the allow-list, falling back to
/// the filename extension. Runs before any decode attempt.
pub fn resolve_format(
    content_type: Option<&str>,
    filename: Option<&str>,
) -> Result<&'static str, AppError> {
    if let Some(content_type) = content_type {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();
        if let Some(format) = CONTENT_TYPE_FORMATS.get(mime.as_str()) {
            return Ok(*format);
        }
    }

    if let Some(filename) = filename {
        if let Some((_, extension)) = filename.rsplit_once('.') {
            if let Some(format) = EXTENSION_FORMATS.get(extension.to_lowercase().as_str()) {
                return Ok(*format);
            }
        }
    }

    Err(AppError::UnsupportedFormat)
}

/// Validates an upload and builds the record to enqueue.
///
/// The id is derived from the bytes, so the duplicate check is idempotent
/// across retries; a duplicate fails with the existing id in the error so
/// the caller can resolve it without a second lookup. The decode check runs
/// last and catches corrupt payloads whose declared format passed.
pub async fn prepare(
    index: &dyn ImageIndex,
    bytes: &[u8],
    content_type: Option<&str>,
    filename: Option<&str>,
    fields: UploadFields,
) -> Result<ImageRecord, AppError> {
    let id = ImageId::from_bytes(bytes);

    if !index.validate_ids(&[id.clone()]).await?.is_empty() {
        return Err(AppError::Duplicate(id));
    }

    let format = resolve_format(content_type, filename)?;

    image::load_from_memory(bytes).map_err(|_| AppError::InvalidPayload)?;

    Ok(ImageRecord {
        id,
        url: fields.url,
        thumbnail_url: fields.thumbnail_url,
        local: fields.local,
        categories: fields.categories,
        starred: fields.starred,
        format: format.to_string(),
        index_date: Utc::now(),
        image_embedding: None,
        ocr_embedding: None,
    })
}
