//! TaskProcessor - 配送された task_id を 1 件処理する
//!
//! # フロー
//! 1. レコードを取得（無ければ commit して終わり）
//! 2. `done` なら何もしない（重複配送）
//! 3. `in_progress` なら conflict（ただし stale なら奪い取る）
//! 4. result_key が既にあるのに `done` でない → `done` に直して終わり
//! 5. `in_progress` へ compare-and-set で遷移（これが唯一の排他）。
//!    status に加えて読んだ時点の `updated_at` も比較するので、stale claim の奪取も 1 件だけが勝つ
//! 6. Blob を取得し、実バイトからフォーマットを判定
//! 7. デコード + 変換（`spawn_blocking`）
//! 8. 結果を保存し、`done` + result_key を書く
//!
//! 6〜8 の失敗はレコードを `failed` にしたうえで、[`Disposition`] で
//! メッセージを commit するか残すかを呼び出し側に伝える。
//!
//! # 設計原則
//! - 正本は TaskStore の行。キューのメッセージは「見に行け」という合図でしかない
//! - インメモリのロックは使わない

use std::sync::Arc;

use chrono::Duration;
use thiserror::Error;
use tracing::{Instrument, Span, debug, info, warn};

use crate::app::KeyLayout;
use crate::domain::{ErrorKind, ImageKind, ImageTask, TaskId, TaskResult, TaskStatus};
use crate::ports::{
    BlobError, BlobStore, Clock, StoreError, TaskStore, TransformError, TransformParams,
    Transformer, decode_image,
};

/// How a successfully handled dispatch ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Transformed and stored under `result_key`.
    Completed { result_key: String },
    /// Already `done`; duplicate delivery.
    AlreadyDone,
    /// Result was already stored but the status lagged behind; status fixed.
    Repaired,
    /// The record no longer exists.
    Missing,
}

/// What the consumer should do with the message after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Acknowledge: redelivery cannot help.
    Commit,
    /// Leave uncommitted so the message is delivered again.
    Retain,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("task {0} is already being processed")]
    Conflict(TaskId),

    #[error("{what} payload is not a supported image: {reason}")]
    UnsupportedFormat { what: &'static str, reason: String },

    #[error("watermark must be image/png, got {0}")]
    WatermarkNotPng(ImageKind),

    #[error("task {0} has no watermark key")]
    MissingWatermark(TaskId),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error("transform panicked: {0}")]
    TransformPanicked(String),

    #[error("task store: {0}")]
    Store(#[from] StoreError),

    #[error("blob store: {0}")]
    Blob(#[from] BlobError),

    #[error("task handling panicked: {0}")]
    Panicked(String),
}

impl ProcessError {
    pub fn disposition(&self) -> Disposition {
        match self {
            ProcessError::Conflict(_)
            | ProcessError::Panicked(_)
            | ProcessError::Store(StoreError::Backend(_))
            | ProcessError::Store(StoreError::Conflict { .. })
            | ProcessError::Store(StoreError::Modified { .. })
            | ProcessError::Blob(BlobError::Backend(_)) => Disposition::Retain,
            ProcessError::UnsupportedFormat { .. }
            | ProcessError::WatermarkNotPng(_)
            | ProcessError::MissingWatermark(_)
            | ProcessError::Transform(_)
            | ProcessError::TransformPanicked(_)
            | ProcessError::Store(_)
            | ProcessError::Blob(BlobError::NotFound(_)) => Disposition::Commit,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessError::Conflict(_) => ErrorKind::Conflict,
            ProcessError::UnsupportedFormat { .. } | ProcessError::WatermarkNotPng(_) => {
                ErrorKind::UnsupportedFormat
            }
            ProcessError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            ProcessError::Store(StoreError::Backend(_)) | ProcessError::Blob(_) => {
                ErrorKind::Transient
            }
            ProcessError::Store(StoreError::Conflict { .. })
            | ProcessError::Store(StoreError::Modified { .. }) => ErrorKind::Conflict,
            ProcessError::MissingWatermark(_)
            | ProcessError::Transform(_)
            | ProcessError::TransformPanicked(_)
            | ProcessError::Store(_)
            | ProcessError::Panicked(_) => ErrorKind::Terminal,
        }
    }
}

pub struct TaskProcessor {
    tasks: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    transformer: Arc<dyn Transformer>,
    clock: Arc<dyn Clock>,
    keys: KeyLayout,
    stale_after: Duration,
    span: Span,
}

impl TaskProcessor {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        transformer: Arc<dyn Transformer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            blobs,
            transformer,
            clock,
            keys: KeyLayout::default(),
            stale_after: Duration::minutes(10),
            span: tracing::info_span!("processor"),
        }
    }

    pub fn with_keys(mut self, keys: KeyLayout) -> Self {
        self.keys = keys;
        self
    }

    /// An `in_progress` claim older than this is considered abandoned.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub async fn handle_dispatched_task(&self, id: TaskId) -> Result<Outcome, ProcessError> {
        let span = tracing::info_span!(parent: &self.span, "task", task_id = %id);
        self.handle_inner(id).instrument(span).await
    }

    async fn handle_inner(&self, id: TaskId) -> Result<Outcome, ProcessError> {
        let task = match self.tasks.get(id).await {
            Ok(task) => task,
            Err(StoreError::NotFound(_)) => {
                warn!("dispatched task does not exist");
                return Ok(Outcome::Missing);
            }
            Err(e) => return Err(e.into()),
        };

        match task.status {
            TaskStatus::Done => {
                debug!("task already done");
                return Ok(Outcome::AlreadyDone);
            }
            TaskStatus::InProgress if !self.is_abandoned(&task) => {
                return Err(ProcessError::Conflict(id));
            }
            TaskStatus::InProgress => {
                warn!(updated_at = %task.updated_at, "taking over abandoned claim");
            }
            TaskStatus::Created | TaskStatus::Failed => {}
        }

        if task.result_key.is_some() {
            self.tasks.update_status(id, TaskStatus::Done).await?;
            info!("result already stored, status repaired");
            return Ok(Outcome::Repaired);
        }

        self.tasks
            .transition_status(id, task.status, task.updated_at, TaskStatus::InProgress)
            .await
            .map_err(|e| match e {
                StoreError::Conflict { .. } | StoreError::Modified { .. } => {
                    debug!(error = %e, "claim lost to another delivery");
                    ProcessError::Conflict(id)
                }
                other => other.into(),
            })?;

        match self.run(&task).await {
            Ok(result_key) => {
                info!(result_key = %result_key, "task done");
                Ok(Outcome::Completed { result_key })
            }
            Err(err) => {
                warn!(error = %err, "task failed");
                if let Err(e) = self.tasks.mark_failed(id, &err.to_string()).await {
                    warn!(error = %e, "could not record failure");
                }
                Err(err)
            }
        }
    }

    fn is_abandoned(&self, task: &ImageTask) -> bool {
        self.clock.now() - task.updated_at >= self.stale_after
    }

    async fn run(&self, task: &ImageTask) -> Result<String, ProcessError> {
        let source = self.blobs.get(&task.source_key).await?;
        let watermark = if task.operation.needs_watermark() {
            let key = task
                .watermark_key
                .as_deref()
                .ok_or(ProcessError::MissingWatermark(task.id))?;
            Some(self.blobs.get(key).await?)
        } else {
            None
        };

        let source_kind =
            ImageKind::sniff(&source.bytes).map_err(|e| ProcessError::UnsupportedFormat {
                what: "source",
                reason: e.to_string(),
            })?;
        if let Some(mark) = &watermark {
            let kind =
                ImageKind::sniff(&mark.bytes).map_err(|e| ProcessError::UnsupportedFormat {
                    what: "watermark",
                    reason: e.to_string(),
                })?;
            if kind != ImageKind::Png {
                return Err(ProcessError::WatermarkNotPng(kind));
            }
        }

        let params = TransformParams {
            operation: task.operation,
            x: task.x,
            y: task.y,
        };
        let transformer = Arc::clone(&self.transformer);
        let encoded = tokio::task::spawn_blocking(move || {
            let source = decode_image(&source.bytes, source_kind, "source")?;
            let watermark = watermark
                .map(|mark| decode_image(&mark.bytes, ImageKind::Png, "watermark"))
                .transpose()?;
            transformer.apply(&params, &source, watermark.as_ref(), source_kind)
        })
        .await
        .map_err(|e| ProcessError::TransformPanicked(e.to_string()))??;

        let result_key = self.keys.result_key(task.id, encoded.kind);
        debug!(result_key = %result_key, size = encoded.size(), "storing result");
        self.blobs
            .put(&result_key, encoded.kind.content_type(), encoded.bytes)
            .await?;
        self.tasks
            .update_result(&TaskResult {
                id: task.id,
                result_key: result_key.clone(),
            })
            .await?;
        Ok(result_key)
    }
}
