//! IntakeService - タスクの受付
//!
//! # フロー
//! 1. リクエストを検証・正規化（ここで失敗すれば何も書かない）
//! 2. ソース画像（とウォーターマーク）を BlobStore に保存
//! 3. TaskStore に `created` でレコードを作成
//! 4. task_id をキューに publish（リトライ付き）
//!
//! # 失敗時の扱い
//! - Blob 書き込み失敗: 既に書いた Blob を消してから返す（レコードは作らない）
//! - レコード作成失敗: 書いた Blob を消してから返す
//! - publish 失敗: レコードは `created` のまま残る。OrphanRecovery が後で拾う

use std::sync::Arc;

use tracing::{Instrument, Span, error, info, warn};

use crate::app::KeyLayout;
use crate::domain::{
    CreateRequest, DEFAULT_MAX_DIMENSION, ImageTask, RetryStrategy, ServiceError, Upload, normalize,
};
use crate::ports::{BlobStore, Clock, IdGenerator, TaskPublisher, TaskStore};

pub struct IntakeService {
    tasks: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    publisher: Arc<dyn TaskPublisher>,
    ids: Arc<dyn IdGenerator>,
    clock: Arc<dyn Clock>,
    keys: KeyLayout,
    retry: RetryStrategy,
    max_dimension: u32,
    span: Span,
}

impl IntakeService {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        blobs: Arc<dyn BlobStore>,
        publisher: Arc<dyn TaskPublisher>,
        ids: Arc<dyn IdGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            blobs,
            publisher,
            ids,
            clock,
            keys: KeyLayout::default(),
            retry: RetryStrategy::default(),
            max_dimension: DEFAULT_MAX_DIMENSION,
            span: tracing::info_span!("intake"),
        }
    }

    pub fn with_keys(mut self, keys: KeyLayout) -> Self {
        self.keys = keys;
        self
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    /// Largest width or height a request may ask for.
    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Validate the request, store its payloads, record the task and dispatch it.
    pub async fn create(&self, request: CreateRequest) -> Result<ImageTask, ServiceError> {
        self.create_inner(request)
            .instrument(self.span.clone())
            .await
    }

    async fn create_inner(&self, request: CreateRequest) -> Result<ImageTask, ServiceError> {
        let normalized = normalize(&request, self.max_dimension).inspect_err(|e| {
            info!(error = %e, "rejected creation request");
        })?;
        let CreateRequest {
            source, watermark, ..
        } = request;
        let source = source.ok_or(ServiceError::InvalidSource)?;

        let id = self.ids.generate_task_id();
        let source_key = self.keys.source_key(id, normalized.source_kind);
        self.put_upload(&source_key, normalized.source_kind.content_type(), source)
            .await?;

        let watermark_key = match (normalized.watermark_kind, watermark) {
            (Some(kind), Some(upload)) => {
                let key = self.keys.watermark_key(id, kind);
                if let Err(e) = self.put_upload(&key, kind.content_type(), upload).await {
                    self.discard(&[source_key.as_str()]).await;
                    return Err(e);
                }
                Some(key)
            }
            _ => None,
        };

        let task = ImageTask::new(
            id,
            normalized.operation,
            source_key,
            watermark_key,
            self.clock.now(),
        )
        .with_axes(normalized.x, normalized.y)
        .with_diagnostics(normalized.diagnostics);

        if let Err(e) = self.tasks.create(&task).await {
            error!(task_id = %id, error = %e, "failed to create task record");
            let keys: Vec<&str> = task.blob_keys();
            self.discard(&keys).await;
            return Err(e.into());
        }

        if let Err(e) = self
            .publisher
            .send_with_retry(&self.retry, id.key().as_bytes(), &[])
            .await
        {
            error!(task_id = %id, error = %e, "failed to dispatch task, left for recovery");
            return Err(e.into());
        }

        info!(
            task_id = %id,
            operation = %task.operation,
            diagnostics = task.diagnostics.len(),
            "task created"
        );
        Ok(task)
    }

    async fn put_upload(
        &self,
        key: &str,
        content_type: &str,
        upload: Upload,
    ) -> Result<(), ServiceError> {
        self.blobs
            .put(key, content_type, upload.bytes)
            .await
            .map_err(|e| {
                error!(key, error = %e, "failed to store payload");
                ServiceError::from(e)
            })
    }

    /// Best-effort removal of payloads that no record will ever reference.
    async fn discard(&self, keys: &[&str]) {
        for key in keys {
            if let Err(e) = self.blobs.delete(key).await {
                warn!(key, error = %e, "failed to discard unreferenced payload");
            }
        }
    }
}
