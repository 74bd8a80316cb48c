//! TaskStore port - タスクレコードの正本（source of truth）
//!
//! TaskStore は以下を管理します：
//! - 状態（TaskStatus）と結果キー
//! - 正規化時の診断メッセージ（append-only）
//! - 作成・更新時刻（orphan 検出に使う）
//!
//! # 設計原則
//! - プロセス間の調整点はこの行だけ（インメモリのロックは使わない）
//! - `updated_at` はストア側で status / result の更新ごとに進める
//! - 不正な状態遷移はストアが拒否する

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::{ImageTask, ListQuery, TaskId, TaskResult, TaskStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("task {0} not found")]
    NotFound(TaskId),

    #[error("task {id} already exists")]
    AlreadyExists { id: TaskId },

    /// Compare-and-set lost: the row was not in the expected status.
    #[error("task {id} is {actual}, expected {expected}")]
    Conflict {
        id: TaskId,
        expected: TaskStatus,
        actual: TaskStatus,
    },

    /// Compare-and-set lost: the row was written after the caller read it.
    #[error("task {id} was updated at {actual}, after it was read at {seen}")]
    Modified {
        id: TaskId,
        seen: DateTime<Utc>,
        actual: DateTime<Utc>,
    },

    #[error("task {id}: transition {from} -> {to} is not allowed")]
    InvalidTransition {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("backend failure: {0}")]
    Backend(String),
}

/// Persistence contract for task records.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: &ImageTask) -> Result<(), StoreError>;

    async fn get(&self, id: TaskId) -> Result<ImageTask, StoreError>;

    async fn list(&self, query: &ListQuery) -> Result<Vec<ImageTask>, StoreError>;

    async fn delete(&self, id: TaskId) -> Result<(), StoreError>;

    /// Unconditional status write (still subject to the transition table).
    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<(), StoreError>;

    /// Conditional status write: succeeds only if the row is still `from` and its
    /// `updated_at` still equals `seen_at`, the value the caller read.
    ///
    /// The processor claims work through this. Checking `updated_at` as well as the
    /// status makes an `in_progress -> in_progress` takeover exclusive too.
    async fn transition_status(
        &self,
        id: TaskId,
        from: TaskStatus,
        seen_at: DateTime<Utc>,
        to: TaskStatus,
    ) -> Result<(), StoreError>;

    /// Move to `Failed` and append `reason` to the task diagnostics.
    async fn mark_failed(&self, id: TaskId, reason: &str) -> Result<(), StoreError>;

    /// Set the result key and move to `Done` in a single write.
    async fn update_result(&self, result: &TaskResult) -> Result<(), StoreError>;

    /// Ids of up to `limit` tasks in one of `statuses` not updated since `older_than`,
    /// oldest first.
    async fn find_stale(
        &self,
        statuses: &[TaskStatus],
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskId>, StoreError>;
}
