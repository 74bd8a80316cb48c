//! imagery-core
//!
//! Core building blocks for the asynchronous image-transformation service.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, task, image_kind, request, list, retry, errors, normalize）
//! - **ports**: 抽象化レイヤー（TaskStore, BlobStore, TaskPublisher/TaskConsumer, Transformer, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（intake, processor, worker_loop, reaper_loop, query, builder）
//! - **impls**: 実装（InMemory アダプタ、`image` クレートによる変換）
//! - **config**: 起動時設定（`config` クレート）
//! - **observability**: tracing subscriber の初期化

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
