//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **InMemoryTaskStore**: テスト用の正本
//! - **InMemoryBlobStore**: MinIO/S3 の代わり
//! - **InMemoryTaskQueue**: Kafka の代わり（offset + commit を再現）
//! - **ImageTransformer**: `image` クレートによるピクセル処理
//!
//! # 本番用実装
//! PostgreSQL / MinIO / Kafka のアダプタは別クレートに置く想定。

pub mod image_transform;
pub mod inmem_blob_store;
pub mod inmem_queue;
pub mod inmem_task_store;

pub use self::image_transform::ImageTransformer;
pub use self::inmem_blob_store::InMemoryBlobStore;
pub use self::inmem_queue::InMemoryTaskQueue;
pub use self::inmem_task_store::InMemoryTaskStore;
