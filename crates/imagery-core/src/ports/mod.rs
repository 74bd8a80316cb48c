//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（PostgreSQL, Kafka, オブジェクトストレージ, 画像ライブラリ）への
//! 狭いインターフェースで、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - TaskStore が source of truth（正本）
//! - TaskQueue は task_id だけを運ぶ
//! - BlobStore は画像そのものの保存先

pub mod blob_store;
pub mod clock;
pub mod id_generator;
pub mod task_queue;
pub mod task_store;
pub mod transform;

pub use self::blob_store::{Blob, BlobError, BlobStore};
pub use self::clock::{Clock, FixedClock, ManualClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::task_queue::{Delivery, QueueError, TaskConsumer, TaskPublisher};
pub use self::task_store::{StoreError, TaskStore};
pub use self::transform::{
    EncodedImage, TransformError, TransformParams, Transformer, decode_image,
};
