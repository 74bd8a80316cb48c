//! WorkerLoop - 配送メッセージの逐次消費
//!
//! # フロー
//! 1. `TaskConsumer::recv()` でメッセージを 1 件受け取る（shutdown と select）
//! 2. key を task_id としてデコード（壊れていれば commit して捨てる）
//! 3. `TaskProcessor` で処理（別タスクで実行し、panic をループに伝播させない）
//! 4. 成功 or 終端失敗なら commit
//! 5. 一時的な失敗なら [`RetryStrategy`] のバックオフ付きで release（再配送）。
//!    試行回数を使い切ったら commit して諦める（レコードは `failed` のまま）
//!
//! 1 件を commit / release まで終えてから次を受け取る。

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::app::processor::{Disposition, ProcessError, TaskProcessor};
use crate::domain::RetryStrategy;
use crate::ports::{Delivery, TaskConsumer};

pub struct WorkerLoop {
    consumer: Arc<dyn TaskConsumer>,
    processor: Arc<TaskProcessor>,
    retry: RetryStrategy,
    span: Span,
}

impl WorkerLoop {
    pub fn new(consumer: Arc<dyn TaskConsumer>, processor: Arc<TaskProcessor>) -> Self {
        Self {
            consumer,
            processor,
            retry: RetryStrategy::default(),
            span: tracing::info_span!("worker"),
        }
    }

    /// Backoff and attempt budget for redelivering transient failures.
    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Consume until shutdown is requested or the queue is closed.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let span = self.span.clone();
        async move {
            info!("worker started");
            loop {
                if *shutdown.borrow() {
                    break;
                }

                let delivery = tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    delivery = self.consumer.recv() => delivery,
                };

                let Some(delivery) = delivery else {
                    info!("queue closed");
                    break;
                };
                self.handle(&delivery).await;
            }
            info!("worker stopped");
        }
        .instrument(span)
        .await
    }

    /// Process one message, then commit it or release it for a later attempt.
    ///
    /// Returns what happened to the message.
    pub async fn handle(&self, delivery: &Delivery) -> Disposition {
        let id = match delivery.task_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(offset = delivery.offset(), error = %e, "dropping message with malformed key");
                self.commit(delivery).await;
                return Disposition::Commit;
            }
        };
        if !delivery.payload().is_empty() {
            debug!(task_id = %id, len = delivery.payload().len(), "ignoring message value");
        }

        let processor = Arc::clone(&self.processor);
        let result = tokio::spawn(async move { processor.handle_dispatched_task(id).await })
            .await
            .unwrap_or_else(|e| Err(ProcessError::Panicked(e.to_string())));

        let err = match result {
            Ok(outcome) => {
                debug!(task_id = %id, ?outcome, "message handled");
                self.commit(delivery).await;
                return Disposition::Commit;
            }
            Err(err) => err,
        };

        let attempt = delivery.attempt();
        let max_attempts = self.retry.max_attempts();
        match err.disposition() {
            Disposition::Commit => {
                warn!(task_id = %id, error = %err, kind = ?err.kind(), "task failed terminally");
            }
            Disposition::Retain if attempt >= max_attempts => {
                error!(task_id = %id, attempt, error = %err, kind = ?err.kind(), "giving up after repeated failures");
            }
            Disposition::Retain => {
                let delay = self.retry.delay_after(attempt);
                warn!(
                    task_id = %id,
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    kind = ?err.kind(),
                    "releasing message for redelivery"
                );
                if let Err(e) = self.consumer.release(delivery, delay).await {
                    error!(offset = delivery.offset(), error = %e, "release failed, message stays uncommitted");
                }
                return Disposition::Retain;
            }
        }
        self.commit(delivery).await;
        Disposition::Commit
    }

    async fn commit(&self, delivery: &Delivery) {
        if let Err(e) = self.consumer.commit(delivery).await {
            error!(offset = delivery.offset(), error = %e, "commit failed");
        }
    }
}
