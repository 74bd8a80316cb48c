//! TaskQueue port - 配送キュー（Kafka または InMemory）
//!
//! キューに流すのは task_id だけ（状態・payload は TaskStore / BlobStore にある）。
//! メッセージの key が task_id、value は空（consumer は value を見ない）。
//!
//! # 設計原則
//! - publish は有限回のリトライ付き（[`TaskPublisher::send_with_retry`]）
//! - consumer は commit されなかったメッセージを再配送し得る（at-least-once）
//! - 一時的な失敗は [`TaskConsumer::release`] で遅延付きで戻す
//! - 重複配送は worker 側の冪等性チェックで吸収する

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;

use crate::domain::{ParseTaskIdError, RetryStrategy, TaskId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("queue operation failed: {0}")]
    OperationFailed(String),

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

/// One consumed message. Must be committed (or released) for the broker to forget it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    offset: u64,
    key: Vec<u8>,
    payload: Vec<u8>,
    redeliveries: u32,
}

impl Delivery {
    pub fn new(offset: u64, key: Vec<u8>, payload: Vec<u8>) -> Self {
        Self {
            offset,
            key,
            payload,
            redeliveries: 0,
        }
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// 1 on the first delivery, then one more per release.
    pub fn attempt(&self) -> u32 {
        self.redeliveries.saturating_add(1)
    }

    /// The same message, counted as delivered once more.
    pub fn redelivered(mut self) -> Self {
        self.redeliveries = self.redeliveries.saturating_add(1);
        self
    }

    /// Decode the message key as a task id.
    pub fn task_id(&self) -> Result<TaskId, ParseTaskIdError> {
        let raw = String::from_utf8_lossy(&self.key);
        raw.parse()
    }
}

#[async_trait]
pub trait TaskPublisher: Send + Sync {
    /// Single publish attempt.
    async fn send(&self, key: &[u8], payload: &[u8]) -> Result<(), QueueError>;

    /// Publish with bounded retries and exponential backoff.
    async fn send_with_retry(
        &self,
        strategy: &RetryStrategy,
        key: &[u8],
        payload: &[u8],
    ) -> Result<(), QueueError> {
        let attempts = strategy.max_attempts();
        let mut failed = 0;
        loop {
            match self.send(key, payload).await {
                Ok(()) => return Ok(()),
                Err(QueueError::Closed) => return Err(QueueError::Closed),
                Err(err) => {
                    failed += 1;
                    if failed >= attempts {
                        return Err(QueueError::RetriesExhausted {
                            attempts,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = strategy.delay_after(failed);
                    warn!(
                        attempt = failed,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "publish failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
pub trait TaskConsumer: Send + Sync {
    /// Wait for the next message. `None` once the queue is closed and drained.
    async fn recv(&self) -> Option<Delivery>;

    async fn commit(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Hand an uncommitted message back; it is received again once `delay` has passed,
    /// with [`Delivery::attempt`] one higher.
    async fn release(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError>;
}
