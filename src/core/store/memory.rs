//! In-memory store implementation for testing.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::BlobStore;
use crate::error::Result;

/// In-memory blob store for testing purposes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    /// Create a new empty memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Whether the store holds no blobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryStore {
    async fn load_text(&self, name: &str) -> Result<Option<String>> {
        Ok(self.blobs.lock().get(name).cloned())
    }

    async fn save_text(&self, name: &str, contents: &str) -> Result<()> {
        self.blobs.lock().insert(name.to_string(), contents.to_string());
        Ok(())
    }
}
