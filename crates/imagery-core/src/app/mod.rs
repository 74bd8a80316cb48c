//! App - アプリケーション層
//!
//! ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **IntakeService**: 検証 → Blob 保存 → レコード作成 → publish
//! - **TaskProcessor**: 配送された task_id を冪等に処理
//! - **WorkerLoop**: キューの逐次消費
//! - **OrphanRecovery / ReaperLoop**: 放置タスクの定期再配送
//! - **QueryService**: 一覧・取得・結果取得・削除
//! - **AppBuilder**: 上記のワイヤリング

pub mod builder;
pub mod intake;
pub mod keys;
pub mod processor;
pub mod query;
pub mod reaper_loop;
pub mod worker_group;
pub mod worker_loop;

#[cfg(test)]
pub(crate) mod testkit;

pub use self::builder::{App, AppBuilder, BuildError};
pub use self::intake::IntakeService;
pub use self::keys::KeyLayout;
pub use self::processor::{Disposition, Outcome, ProcessError, TaskProcessor};
pub use self::query::QueryService;
pub use self::reaper_loop::{OrphanRecovery, RecoveryReport, ReaperLoop};
pub use self::worker_group::WorkerGroup;
pub use self::worker_loop::WorkerLoop;
