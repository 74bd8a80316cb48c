//! InMemoryTaskStore - 開発・テスト用の TaskStore
//!
//! # 実装詳細
//! - HashMap<TaskId, ImageTask> を tokio::sync::Mutex で保護
//! - `updated_at` は注入された Clock で進める
//! - `set_unavailable(true)` で全操作を Backend エラーにできる（障害注入）

use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::domain::{ImageTask, ListQuery, SortBy, SortOrder, TaskId, TaskResult, TaskStatus};
use crate::ports::{Clock, StoreError, TaskStore};

pub struct InMemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, ImageTask>>,
    clock: Arc<dyn Clock>,
    unavailable: AtomicBool,
}

impl InMemoryTaskStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            clock,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage: every call fails with `StoreError::Backend`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.lock().await.is_empty()
    }

    /// Overwrite a record as-is (seeding inconsistent rows in tests).
    pub async fn put_raw(&self, task: ImageTask) {
        self.tasks.lock().await.insert(task.id, task);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("task store unavailable".to_string()));
        }
        Ok(())
    }

    fn apply_status(
        &self,
        task: &mut ImageTask,
        status: TaskStatus,
    ) -> Result<(), StoreError> {
        if !task.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                id: task.id,
                from: task.status,
                to: status,
            });
        }
        task.status = status;
        task.updated_at = self.clock.now();
        Ok(())
    }
}

fn compare(a: &ImageTask, b: &ImageTask, query: &ListQuery) -> CmpOrdering {
    let ord = match query.by {
        SortBy::Id => a.id.cmp(&b.id),
        SortBy::CreatedAt => a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)),
    };
    match query.order {
        SortOrder::Asc => ord,
        SortOrder::Desc => ord.reverse(),
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: &ImageTask) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.lock().await;
        if tasks.contains_key(&task.id) {
            return Err(StoreError::AlreadyExists { id: task.id });
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> Result<ImageTask, StoreError> {
        self.check_available()?;
        let tasks = self.tasks.lock().await;
        tasks.get(&id).cloned().ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<ImageTask>, StoreError> {
        self.check_available()?;
        let tasks = self.tasks.lock().await;
        let mut all: Vec<&ImageTask> = tasks.values().collect();
        all.sort_by(|a, b| compare(a, b, query));
        Ok(all
            .into_iter()
            .skip(query.offset())
            .take(query.limit as usize)
            .cloned()
            .collect())
    }

    async fn delete(&self, id: TaskId) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.lock().await;
        tasks.remove(&id).map(|_| ()).ok_or(StoreError::NotFound(id))
    }

    async fn update_status(&self, id: TaskId, status: TaskStatus) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        self.apply_status(task, status)
    }

    async fn transition_status(
        &self,
        id: TaskId,
        from: TaskStatus,
        seen_at: DateTime<Utc>,
        to: TaskStatus,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if task.status != from {
            return Err(StoreError::Conflict {
                id,
                expected: from,
                actual: task.status,
            });
        }
        if task.updated_at != seen_at {
            return Err(StoreError::Modified {
                id,
                seen: seen_at,
                actual: task.updated_at,
            });
        }
        self.apply_status(task, to)
    }

    async fn mark_failed(&self, id: TaskId, reason: &str) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        self.apply_status(task, TaskStatus::Failed)?;
        task.diagnostics.push(reason.to_string());
        Ok(())
    }

    async fn update_result(&self, result: &TaskResult) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tasks = self.tasks.lock().await;
        let task = tasks
            .get_mut(&result.id)
            .ok_or(StoreError::NotFound(result.id))?;
        self.apply_status(task, TaskStatus::Done)?;
        task.result_key = Some(result.result_key.clone());
        Ok(())
    }

    async fn find_stale(
        &self,
        statuses: &[TaskStatus],
        older_than: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<TaskId>, StoreError> {
        self.check_available()?;
        let tasks = self.tasks.lock().await;
        let mut stale: Vec<&ImageTask> = tasks
            .values()
            .filter(|t| statuses.contains(&t.status) && t.updated_at < older_than)
            .collect();
        stale.sort_by_key(|t| (t.updated_at, t.id));
        Ok(stale.into_iter().take(limit).map(|t| t.id).collect())
    }
}
