//! In-memory artifact store for tests and local development.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{ObjectStore, StorageError, StoredObject};

/// Artifact store over a mutex-guarded map.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<String, StoredObject>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.objects.lock().unwrap().insert(
            key.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(key.to_string())
    }

    async fn get(&self, key: &str) -> Result<StoredObject, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = MemoryObjectStore::new();
        let key = store
            .put("jobs/abc/0.png", b"png bytes".to_vec(), "image/png")
            .await
            .unwrap();
        assert_eq!(key, "jobs/abc/0.png");

        let object = store.get(&key).await.unwrap();
        assert_eq!(object.bytes, b"png bytes");
        assert_eq!(object.content_type, "image/png");
    }

    #[tokio::test]
    async fn missing_key_is_not_found() {
        let store = MemoryObjectStore::new();
        assert_matches!(
            store.get("jobs/missing/0.png").await,
            Err(StorageError::NotFound(_))
        );
    }

    #[tokio::test]
    async fn put_overwrites() {
        let store = MemoryObjectStore::new();
        store
            .put("k", b"first".to_vec(), "image/png")
            .await
            .unwrap();
        store
            .put("k", b"second".to_vec(), "image/png")
            .await
            .unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("k").await.unwrap().bytes, b"second");
    }
}
