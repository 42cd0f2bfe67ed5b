use std::path::PathBuf;

use async_trait::async_trait;

use crate::errors::AppError;

/// File storage collaborator. Identifiers are paths relative to the storage
/// root, e.g. `"<id>.png"`, `"thumbnails/<id>.webp"` or `"_deleted/<id>.png"`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    async fn write(&self, ident: &str, data: &[u8]) -> Result<(), AppError>;
    async fn exists(&self, ident: &str) -> bool;
    /// Names of the files directly under the root whose name starts with
    /// `prefix`, in unspecified order.
    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError>;
    /// Moves a file inside the storage, creating the target directory when
    /// needed.
    async fn rename(&self, from: &str, to: &str) -> Result<(), AppError>;
    async fn delete(&self, ident: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct LocalStorage {
    base_dir: PathBuf,
}

impl LocalStorage {
    pub fn new(storage_dir: &str) -> std::io::Result<Self> {
        let path = PathBuf::from(storage_dir);
        std::fs::create_dir_all(&path)?;
        Ok(LocalStorage { base_dir: path })
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn write(&self, ident: &str, data: &[u8]) -> Result<(), AppError> {
        let path = self.base_dir.join(ident);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // temp write, then rename into place
        let temp_path = self
            .base_dir
            .join(format!("{}.part", rusty_ulid::generate_ulid_string()));
        tokio::fs::write(&temp_path, data).await?;
        tokio::fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn exists(&self, ident: &str) -> bool {
        tokio::fs::metadata(self.base_dir.join(ident)).await.is_ok()
    }

    async fn list_prefix(&self, prefix: &str) -> Result<Vec<String>, AppError> {
        let mut names = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) {
                    names.push(name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), AppError> {
        let target = self.base_dir.join(to);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(self.base_dir.join(from), target).await?;
        Ok(())
    }

    async fn delete(&self, ident: &str) -> Result<(), AppError> {
        tokio::fs::remove_file(self.base_dir.join(ident)).await?;
        Ok(())
    }
}
