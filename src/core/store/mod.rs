//! Persistence port: load/save blobs by filename.
//!
//! All derived state in polywatch is best-effort and rebuildable, so the
//! store contract is deliberately small: text or JSON blobs, keyed by
//! filename, scoped by an opaque store id. Backends must tolerate missing
//! files (`Ok(None)`) so a fresh deployment starts clean.

mod file;
mod memory;

pub use file::FsStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Blob persistence backend.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Load a text blob; `Ok(None)` when the file does not exist.
    async fn load_text(&self, name: &str) -> Result<Option<String>>;

    /// Save a text blob, replacing any previous contents.
    async fn save_text(&self, name: &str, contents: &str) -> Result<()>;
}

/// Load and deserialize a JSON blob; `Ok(None)` when the file is absent.
///
/// A present-but-unparsable file is treated as no prior state: the content
/// is logged at warn with its length and `Ok(None)` is returned.
pub async fn load_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    name: &str,
) -> Result<Option<T>> {
    let Some(text) = store.load_text(name).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&text) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!(
                file = name,
                len = text.len(),
                error = %e,
                "Discarding unparsable persisted state"
            );
            Ok(None)
        }
    }
}

/// Serialize a value and save it as a JSON blob.
pub async fn save_json<T: Serialize>(store: &dyn BlobStore, name: &str, value: &T) -> Result<()> {
    let text = serde_json::to_string(value)?;
    store.save_text(name, &text).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        version: u32,
        names: Vec<String>,
    }

    #[tokio::test]
    async fn json_round_trip() {
        let store = MemoryStore::new();
        let value = Sample {
            version: 1,
            names: vec!["a".into(), "b".into()],
        };

        save_json(&store, "sample.json", &value).await.unwrap();
        let loaded: Sample = load_json(&store, "sample.json").await.unwrap().unwrap();
        assert_eq!(loaded, value);
    }

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let store = MemoryStore::new();
        let loaded: Option<Sample> = load_json(&store, "absent.json").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_loads_as_none() {
        let store = MemoryStore::new();
        store.save_text("bad.json", "{not json").await.unwrap();
        let loaded: Option<Sample> = load_json(&store, "bad.json").await.unwrap();
        assert!(loaded.is_none());
    }
}
