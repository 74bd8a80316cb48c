//! BlobStore port - バイナリペイロードの保存先（MinIO/S3/InMemory）
//!
//! ソース画像・ウォーターマーク・結果画像をキーで保存する。
//! キーの組み立ては [`crate::app::KeyLayout`] の責務で、ストアは中身を解釈しない。

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobError {
    #[error("blob {0:?} not found")]
    NotFound(String),

    #[error("backend failure: {0}")]
    Backend(String),
}

/// A stored payload together with its content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`; the size hint is `bytes.len()`.
    async fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<(), BlobError>;

    async fn get(&self, key: &str) -> Result<Blob, BlobError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), BlobError>;
}
