//! AppBuilder - アプリケーションの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - ストア・キューは必須。足りなければ `build()` が [`BuildError`] を返す
//! - Clock / IdGenerator / Transformer は省略時にデフォルト実装を使う
//! - [`ServiceConfig`] の値は各コンポーネントに構築時に注入する
//!
//! # 使用例
//! ```ignore
//! let app = AppBuilder::new()
//!     .task_store(store)
//!     .blob_store(blobs)
//!     .queue(queue)
//!     .config(config)
//!     .build()?;
//! let group = app.spawn_background();
//! ```

use std::sync::Arc;

use crate::app::{
    IntakeService, OrphanRecovery, QueryService, ReaperLoop, TaskProcessor, WorkerGroup,
    WorkerLoop,
};
use crate::config::ServiceConfig;
use crate::impls::ImageTransformer;
use crate::ports::{
    BlobStore, Clock, IdGenerator, SystemClock, TaskConsumer, TaskPublisher, TaskStore,
    Transformer, UlidGenerator,
};

#[derive(Default)]
pub struct AppBuilder {
    task_store: Option<Arc<dyn TaskStore>>,
    blob_store: Option<Arc<dyn BlobStore>>,
    publisher: Option<Arc<dyn TaskPublisher>>,
    consumer: Option<Arc<dyn TaskConsumer>>,
    transformer: Option<Arc<dyn Transformer>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    config: ServiceConfig,
}

/// BuildError はアプリケーション構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing components: {0:?}. These must be provided before build().")]
    MissingComponents(Vec<&'static str>),
}

impl AppBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.task_store = Some(store);
        self
    }

    pub fn blob_store(mut self, store: Arc<dyn BlobStore>) -> Self {
        self.blob_store = Some(store);
        self
    }

    pub fn publisher(mut self, publisher: Arc<dyn TaskPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn consumer(mut self, consumer: Arc<dyn TaskConsumer>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    /// Use one queue as both publisher and consumer.
    pub fn queue<Q>(self, queue: Arc<Q>) -> Self
    where
        Q: TaskPublisher + TaskConsumer + 'static,
    {
        self.publisher(queue.clone()).consumer(queue)
    }

    pub fn transformer(mut self, transformer: Arc<dyn Transformer>) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<App, BuildError> {
        let mut missing = Vec::new();
        if self.task_store.is_none() {
            missing.push("task_store");
        }
        if self.blob_store.is_none() {
            missing.push("blob_store");
        }
        if self.publisher.is_none() {
            missing.push("publisher");
        }
        if self.consumer.is_none() {
            missing.push("consumer");
        }
        let (Some(tasks), Some(blobs), Some(publisher), Some(consumer)) =
            (self.task_store, self.blob_store, self.publisher, self.consumer)
        else {
            return Err(BuildError::MissingComponents(missing));
        };

        let config = self.config;
        let clock: Arc<dyn Clock> = match self.clock {
            Some(clock) => clock,
            None => Arc::new(SystemClock),
        };
        let ids: Arc<dyn IdGenerator> = match self.ids {
            Some(ids) => ids,
            None => Arc::new(UlidGenerator::new(clock.clone())),
        };
        let transformer: Arc<dyn Transformer> = match self.transformer {
            Some(transformer) => transformer,
            None => Arc::new(ImageTransformer::new().with_max_dimension(config.max_dimension)),
        };
        let stale_after = config.recovery.stale_after();

        let intake = IntakeService::new(
            tasks.clone(),
            blobs.clone(),
            publisher.clone(),
            ids,
            clock.clone(),
        )
        .with_keys(config.keys.clone())
        .with_retry(config.retry.clone())
        .with_max_dimension(config.max_dimension);
        let processor = TaskProcessor::new(tasks.clone(), blobs.clone(), transformer, clock.clone())
            .with_keys(config.keys.clone())
            .with_stale_after(stale_after);
        let query = QueryService::new(tasks.clone(), blobs).with_limits(config.listing);
        let recovery = OrphanRecovery::new(tasks, publisher, clock)
            .with_retry(config.retry.clone())
            .with_stale_after(stale_after);

        Ok(App {
            intake: Arc::new(intake),
            processor: Arc::new(processor),
            query: Arc::new(query),
            recovery: Arc::new(recovery),
            consumer,
            config,
        })
    }
}

/// Wired services plus what the background loops need.
pub struct App {
    pub intake: Arc<IntakeService>,
    pub processor: Arc<TaskProcessor>,
    pub query: Arc<QueryService>,
    pub recovery: Arc<OrphanRecovery>,
    consumer: Arc<dyn TaskConsumer>,
    config: ServiceConfig,
}

impl App {
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn worker_loop(&self) -> WorkerLoop {
        WorkerLoop::new(self.consumer.clone(), self.processor.clone())
            .with_retry(self.config.retry.clone())
    }

    pub fn reaper_loop(&self) -> ReaperLoop {
        ReaperLoop::new(
            self.recovery.clone(),
            self.config.recovery.interval(),
            self.config.recovery.batch_limit,
        )
    }

    /// Start the consumption and recovery loops.
    pub fn spawn_background(&self) -> WorkerGroup {
        WorkerGroup::spawn(self.worker_loop(), self.reaper_loop())
    }
}
