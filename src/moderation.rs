//! Single-record lifecycle: retrieve, partial update, delete.
//!
//! Deletion removes the index entry before touching storage, so a storage
//! failure leaves an orphaned file rather than an index entry pointing at
//! missing bytes. The stored original is soft-deleted (moved under
//! `_deleted/`, recoverable); the thumbnail is hard-deleted.

use crate::context::AppContext;
use crate::errors::AppError;
use crate::index::ImageIndex;
use crate::models::{ImageId, ImageOptUpdate, ImageRecord};
use crate::storage::StorageBackend;

pub const DELETED_DIR: &str = "_deleted";
pub const THUMBNAILS_DIR: &str = "thumbnails";

pub async fn retrieve_image(ctx: &AppContext, id: &ImageId) -> Result<ImageRecord, AppError> {
    ctx.index.retrieve(id).await
}

/// Applies only the fields present in `update`. An update with no fields at
/// all is rejected before anything is read or written.
pub async fn update_image(
    ctx: &AppContext,
    id: &ImageId,
    update: ImageOptUpdate,
) -> Result<(), AppError> {
    if update.is_empty() {
        return Err(AppError::validation("nothing to update"));
    }

    let mut record = ctx.index.retrieve(id).await?;
    if let Some(starred) = update.starred {
        record.starred = starred;
    }
    if let Some(categories) = update.categories {
        record.categories = categories;
    }

    ctx.index.update_payload(&record).await?;
    log::info!("image {id} updated");
    Ok(())
}

pub async fn delete_image(ctx: &AppContext, id: &ImageId) -> Result<(), AppError> {
    let record = ctx.index.retrieve(id).await?;

    ctx.index.delete_items(std::slice::from_ref(id)).await?;
    log::info!("image {id} deleted from the index");

    if record.local && ctx.config.storage.enabled {
        let matches = ctx.storage.list_prefix(&format!("{id}.")).await?;
        match matches.as_slice() {
            [] => log::warn!("image {id} is local but has no stored file"),
            [name] => {
                ctx.storage
                    .rename(name, &format!("{DELETED_DIR}/{name}"))
                    .await?;
                log::info!("stored file {name} moved to {DELETED_DIR}");
            }
            // two files claiming the same id is a consistency violation;
            // picking one silently would hide it
            _ => {
                return Err(AppError::computation(format!(
                    "image {id} matches {} stored files, expected at most one",
                    matches.len()
                )))
            }
        }

        if record.thumbnail_url.is_some() {
            let thumbnail = format!("{THUMBNAILS_DIR}/{id}.webp");
            if ctx.storage.exists(&thumbnail).await {
                ctx.storage.delete(&thumbnail).await?;
                log::info!("thumbnail {thumbnail} removed");
            } else {
                log::warn!("thumbnail {thumbnail} not found");
            }
        }
    }

    Ok(())
}
