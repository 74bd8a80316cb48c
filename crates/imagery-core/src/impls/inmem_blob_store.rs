//! InMemoryBlobStore - 開発・テスト用の BlobStore
//!
//! MinIO/S3 の代わりに HashMap にキーごとの payload を保持する。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::ports::{Blob, BlobError, BlobStore};

#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: Mutex<HashMap<String, Blob>>,
    unavailable: AtomicBool,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with `BlobError::Backend`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Stored keys, sorted.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.lock().await.is_empty()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.blobs.lock().await.contains_key(key)
    }

    fn check_available(&self) -> Result<(), BlobError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BlobError::Backend("blob store unavailable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), BlobError> {
        self.check_available()?;
        self.blobs.lock().await.insert(
            key.to_string(),
            Blob {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Blob, BlobError> {
        self.check_available()?;
        self.blobs
            .lock()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| BlobError::NotFound(key.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.check_available()?;
        self.blobs.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_delete() {
        let store = InMemoryBlobStore::new();
        store
            .put("source/a.png", "image/png", vec![1, 2, 3])
            .await
            .unwrap();

        let blob = store.get("source/a.png").await.unwrap();
        assert_eq!(blob.bytes, vec![1, 2, 3]);
        assert_eq!(blob.content_type, "image/png");

        store.delete("source/a.png").await.unwrap();
        assert_eq!(
            store.get("source/a.png").await,
            Err(BlobError::NotFound("source/a.png".to_string()))
        );
    }

    #[tokio::test]
    async fn deleting_missing_key_is_ok() {
        let store = InMemoryBlobStore::new();
        assert!(store.delete("nope").await.is_ok());
    }

    #[tokio::test]
    async fn outage_fails_calls() {
        let store = InMemoryBlobStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.put("k", "image/png", vec![]).await,
            Err(BlobError::Backend(_))
        ));
        assert!(store.is_empty().await);
    }
}
