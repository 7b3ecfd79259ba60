//! Filesystem artifact storage for single-host deployments.
//!
//! Production deployments point the engine at object storage instead;
//! this implementation keeps the same opaque-reference contract with
//! UUID file names under a configured directory.

use std::path::PathBuf;

use async_trait::async_trait;
use atelier_core::ports::{ArtifactStore, StorageError};
use uuid::Uuid;

/// Stores artifacts as files under a base directory.
pub struct FsArtifactStore {
    base_dir: PathBuf,
}

impl FsArtifactStore {
    /// Create the store, ensuring the base directory exists.
    pub async fn new(base_dir: PathBuf) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(&base_dir)
            .await
            .map_err(|e| StorageError(format!("creating {}: {e}", base_dir.display())))?;
        Ok(Self { base_dir })
    }

    fn extension_for(mime_type: &str) -> &'static str {
        match mime_type {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "image/webp" => "webp",
            _ => "bin",
        }
    }
}

#[async_trait]
impl ArtifactStore for FsArtifactStore {
    async fn store(&self, bytes: &[u8], mime_type: &str) -> Result<String, StorageError> {
        let name = format!("{}.{}", Uuid::new_v4(), Self::extension_for(mime_type));
        let path = self.base_dir.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| StorageError(format!("writing {}: {e}", path.display())))?;
        Ok(path.display().to_string())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
