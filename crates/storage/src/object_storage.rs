//! Blob storage for uploaded and annotated images.
//!
//! Images are written under a configured root with freshly generated
//! uuid filenames, so concurrent uploads never collide, and are addressed
//! back through a public base URL that the API server maps onto the same
//! directory.

use crate::StorageResult;
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::debug;
use uuid::Uuid;

/// Blob storage trait
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Persist a blob under a generated name and return its public URL.
    ///
    /// `prefix` distinguishes blob kinds (e.g. `detection_`, `processed_`);
    /// `extension` is normalized to lowercase and defaults to `jpg`.
    async fn save(&self, data: &[u8], prefix: &str, extension: &str) -> StorageResult<String>;
}

/// Filesystem-backed blob storage.
pub struct FsObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl FsObjectStorage {
    /// Create storage rooted at `root`, addressed under `public_base_url`.
    #[must_use]
    pub fn new(root: PathBuf, public_base_url: String) -> Self {
        Self {
            root,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn save(&self, data: &[u8], prefix: &str, extension: &str) -> StorageResult<String> {
        tokio::fs::create_dir_all(&self.root).await?;

        let file_name = format!("{prefix}{}.{}", Uuid::new_v4(), normalize_extension(extension));
        let path = self.root.join(&file_name);

        tokio::fs::write(&path, data).await?;
        debug!(path = %path.display(), bytes = data.len(), "stored image blob");

        Ok(format!("{}/{file_name}", self.public_base_url))
    }
}

/// Lowercase, no leading dot, `jpg` when missing.
fn normalize_extension(extension: &str) -> String {
    let trimmed = extension.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        "jpg".to_string()
    } else {
        trimmed.to_lowercase()
    }
}
