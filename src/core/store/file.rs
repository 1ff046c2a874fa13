//! Filesystem-backed blob store.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::debug;

use super::BlobStore;
use crate::error::{Error, Result};

/// Blob store writing files under `<root>/<store_id>/`.
///
/// The store id scopes one deployment's state so multiple instances can
/// share a root directory without clobbering each other.
#[derive(Debug, Clone)]
pub struct FsStore {
    dir: PathBuf,
}

impl FsStore {
    /// Create a store scoped to `store_id` under `root`.
    ///
    /// The directory is created on first save, not here.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, store_id: &str) -> Self {
        Self {
            dir: root.into().join(store_id),
        }
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        // Filenames are fixed by the callers; reject separators anyway so a
        // bad config value cannot escape the store directory.
        if name.contains('/') || name.contains('\\') {
            return Err(Error::Store(format!("invalid blob name: {name}")));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl BlobStore for FsStore {
    async fn load_text(&self, name: &str) -> Result<Option<String>> {
        let path = self.path_for(name)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save_text(&self, name: &str, contents: &str) -> Result<()> {
        let path = self.path_for(name)?;
        tokio::fs::create_dir_all(&self.dir).await?;

        // Write-then-rename so a crash mid-save never truncates prior state.
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, contents).await?;
        tokio::fs::rename(&tmp, &path).await?;

        debug!(file = name, bytes = contents.len(), "Saved blob");
        Ok(())
    }
}
