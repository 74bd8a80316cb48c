//! QueryService - 一覧・取得・結果取得・削除
//!
//! ID は文字列で受け取り、ここでパースする（壊れた ID は ClientFault）。
//! 削除はレコードを先に消し、その後に Blob をベストエフォートで消す。

use std::sync::Arc;

use tracing::{Instrument, Span, info, warn};

use crate::domain::{
    ImageTask, ListQuery, ListRequest, ListingLimits, ServiceError, TaskId, TaskStatus,
};
use crate::ports::{Blob, BlobError, BlobStore, StoreError, TaskStore};

pub struct QueryService {
    tasks: Arc<dyn TaskStore>,
    blobs: Arc<dyn BlobStore>,
    limits: ListingLimits,
    span: Span,
}

impl QueryService {
    pub fn new(tasks: Arc<dyn TaskStore>, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            tasks,
            blobs,
            limits: ListingLimits::default(),
            span: tracing::info_span!("query"),
        }
    }

    pub fn with_limits(mut self, limits: ListingLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// List tasks; garbled paging or sort hints fall back to defaults.
    pub async fn list(&self, request: &ListRequest) -> Result<Vec<ImageTask>, ServiceError> {
        let query = ListQuery::normalize(request, self.limits);
        Ok(self
            .tasks
            .list(&query)
            .instrument(self.span.clone())
            .await?)
    }

    pub async fn get(&self, raw_id: &str) -> Result<ImageTask, ServiceError> {
        let id = parse_id(raw_id)?;
        self.fetch(id).instrument(self.span.clone()).await
    }

    /// Result payload of a finished task.
    pub async fn load_result(&self, raw_id: &str) -> Result<Blob, ServiceError> {
        let id = parse_id(raw_id)?;
        async {
            let task = self.fetch(id).await?;
            let key = match (task.status, task.result_key) {
                (TaskStatus::Done, Some(key)) => key,
                _ => return Err(ServiceError::NotReady(id)),
            };
            Ok(self.blobs.get(&key).await?)
        }
        .instrument(self.span.clone())
        .await
    }

    /// Remove the record, then every blob it owns.
    ///
    /// All blob deletions are attempted; the first failure is returned. The record
    /// stays deleted either way.
    pub async fn delete(&self, raw_id: &str) -> Result<(), ServiceError> {
        let id = parse_id(raw_id)?;
        async {
            let task = self.fetch(id).await?;
            self.tasks.delete(id).await.map_err(|e| match e {
                StoreError::NotFound(id) => ServiceError::NotFound(id),
                other => other.into(),
            })?;

            let mut first_error: Option<BlobError> = None;
            for key in task.blob_keys() {
                if let Err(e) = self.blobs.delete(key).await {
                    warn!(task_id = %id, key, error = %e, "failed to delete payload");
                    first_error.get_or_insert(e);
                }
            }
            info!(task_id = %id, "task deleted");
            match first_error {
                Some(e) => Err(e.into()),
                None => Ok(()),
            }
        }
        .instrument(self.span.clone())
        .await
    }

    async fn fetch(&self, id: TaskId) -> Result<ImageTask, ServiceError> {
        self.tasks.get(id).await.map_err(|e| match e {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            other => other.into(),
        })
    }
}

fn parse_id(raw: &str) -> Result<TaskId, ServiceError> {
    raw.parse()
        .map_err(|_| ServiceError::MalformedId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::testkit::{Harness, jpeg_bytes, png_bytes};
    use crate::domain::{CreateRequest, ErrorKind, Upload};

    async fn created(h: &Harness, request: CreateRequest) -> ImageTask {
        h.intake.create(request).await.unwrap()
    }

    fn resize() -> CreateRequest {
        CreateRequest::new("resize", Upload::new("image/jpeg", jpeg_bytes(40, 20)))
            .axes(Some(20), None)
    }

    fn watermark() -> CreateRequest {
        CreateRequest::new("watermark", Upload::new("image/jpeg", jpeg_bytes(40, 40)))
            .watermark(Upload::new("image/png", png_bytes(8, 8)))
    }

    #[tokio::test]
    async fn get_accepts_prefixed_and_bare_ids() {
        let h = Harness::new();
        let task = created(&h, resize()).await;

        assert_eq!(h.query.get(&task.id.to_string()).await.unwrap(), task);
        assert_eq!(h.query.get(&task.id.key()).await.unwrap(), task);
    }

    #[tokio::test]
    async fn get_classifies_bad_and_unknown_ids() {
        let h = Harness::new();

        let err = h.query.get("garbage").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ClientFault);

        let err = h
            .query
            .get(&TaskId::from_ulid(ulid::Ulid::new()).to_string())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn result_is_not_ready_until_done() {
        let h = Harness::new();
        let task = created(&h, resize()).await;
        let id = task.id.to_string();

        let err = h.query.load_result(&id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotReady(_)));
        assert_eq!(err.kind().status_code(), 404);

        h.processor.handle_dispatched_task(task.id).await.unwrap();
        let blob = h.query.load_result(&id).await.unwrap();
        assert_eq!(blob.content_type, "image/jpeg");
        assert!(!blob.bytes.is_empty());
    }

    #[tokio::test]
    async fn list_falls_back_to_defaults() {
        let h = Harness::new();
        for _ in 0..3 {
            created(&h, resize()).await;
            h.clock.advance(chrono::Duration::seconds(1));
        }

        let garbled = ListRequest {
            page: Some(-4),
            limit: Some(1000),
            sort: Some("???".to_string()),
            order: Some("sideways".to_string()),
        };
        let listed = h.query.list(&garbled).await.unwrap();

        assert_eq!(listed.len(), 3);
        assert!(listed.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }

    #[tokio::test]
    async fn delete_done_watermark_task_removes_everything() {
        let h = Harness::new();
        let task = created(&h, watermark()).await;
        h.processor.handle_dispatched_task(task.id).await.unwrap();
        assert_eq!(h.blobs.len().await, 3);

        h.query.delete(&task.id.to_string()).await.unwrap();

        assert!(h.tasks.is_empty().await);
        assert!(h.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn delete_unknown_task_is_not_found() {
        let h = Harness::new();
        let err = h
            .query
            .delete(&TaskId::from_ulid(ulid::Ulid::new()).key())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn blob_failure_after_record_removal_is_server_fault() {
        let h = Harness::new();
        let task = created(&h, resize()).await;
        h.blobs.set_unavailable(true);

        let err = h.query.delete(&task.id.to_string()).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Transient);
        assert!(h.tasks.is_empty().await);
    }
}
