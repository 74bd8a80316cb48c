//! InMemoryTaskQueue - 開発用の配送キュー
//!
//! Kafka の consumer group を単一プロセス内で真似る。
//!
//! # 実装詳細
//! - 送信されたメッセージに単調増加の offset を振る
//! - `recv()` で取り出したメッセージは commit / release されるまで「未確定」として保持
//! - `release()` されたメッセージは期限付きで待機し、期限が来たら末尾に戻る
//! - `redeliver_uncommitted()` で未確定分を先頭に戻す（consumer 再起動の再現）
//! - `close()` 後は送信を拒否し、受信可能な分を吐き出した後 `recv()` が `None` を返す
//! - commit 済み offset は直近 [`COMMIT_HISTORY`] 件だけ覚えておく
//!
//! ロックは同期 Mutex で、await を跨いで保持しない。

use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::ports::{Delivery, QueueError, TaskConsumer, TaskPublisher};

/// How many committed offsets `committed_offsets()` can report.
pub const COMMIT_HISTORY: usize = 1024;

#[derive(Default)]
struct QueueState {
    next_offset: u64,
    pending: VecDeque<Delivery>,
    /// Released messages keyed by (due time, offset).
    delayed: BTreeMap<(Instant, u64), Delivery>,
    uncommitted: BTreeMap<u64, Delivery>,
    committed: VecDeque<u64>,
    closed: bool,
}

impl QueueState {
    fn promote_due(&mut self, now: Instant) {
        while let Some(entry) = self.delayed.first_entry() {
            if entry.key().0 > now {
                break;
            }
            let delivery = entry.remove();
            self.pending.push_back(delivery);
        }
    }

    fn next_due(&self) -> Option<Instant> {
        self.delayed.keys().next().map(|(at, _)| *at)
    }
}

enum Take {
    Ready(Delivery),
    Wait(Option<Instant>),
    Closed,
}

#[derive(Default)]
pub struct InMemoryTaskQueue {
    state: Mutex<QueueState>,
    notify: Notify,
    failing_sends: AtomicU32,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `n` sends fail with `OperationFailed`.
    pub fn fail_next_sends(&self, n: u32) {
        self.failing_sends.store(n, Ordering::SeqCst);
    }

    /// Stop accepting messages and wake every waiting consumer.
    ///
    /// Released messages that are not due yet are dropped with the queue.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Put every received-but-uncommitted message back at the head, in offset order.
    pub fn redeliver_uncommitted(&self) -> usize {
        let count = {
            let mut state = self.lock();
            let uncommitted = std::mem::take(&mut state.uncommitted);
            let count = uncommitted.len();
            for delivery in uncommitted.into_values().rev() {
                state.pending.push_front(delivery.redelivered());
            }
            count
        };
        if count > 0 {
            self.notify.notify_one();
        }
        count
    }

    /// Most recent committed offsets, oldest first.
    pub fn committed_offsets(&self) -> Vec<u64> {
        self.lock().committed.iter().copied().collect()
    }

    pub fn uncommitted_count(&self) -> usize {
        self.lock().uncommitted.len()
    }

    /// Released messages still waiting for their delay to pass.
    pub fn delayed_count(&self) -> usize {
        self.lock().delayed.len()
    }

    /// Messages ready to be received.
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    fn try_take(&self) -> Take {
        let mut state = self.lock();
        state.promote_due(Instant::now());
        if let Some(delivery) = state.pending.pop_front() {
            state
                .uncommitted
                .insert(delivery.offset(), delivery.clone());
            return Take::Ready(delivery);
        }
        if state.closed {
            return Take::Closed;
        }
        Take::Wait(state.next_due())
    }

    fn take_uncommitted(&self, delivery: &Delivery) -> Result<Delivery, QueueError> {
        self.lock()
            .uncommitted
            .remove(&delivery.offset())
            .ok_or_else(|| {
                QueueError::OperationFailed(format!(
                    "offset {} is not awaiting commit",
                    delivery.offset()
                ))
            })
    }
}

#[async_trait]
impl TaskPublisher for InMemoryTaskQueue {
    async fn send(&self, key: &[u8], payload: &[u8]) -> Result<(), QueueError> {
        let injected = self
            .failing_sends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(QueueError::OperationFailed(
                "broker unavailable".to_string(),
            ));
        }

        {
            let mut state = self.lock();
            if state.closed {
                return Err(QueueError::Closed);
            }
            let offset = state.next_offset;
            state.next_offset += 1;
            state
                .pending
                .push_back(Delivery::new(offset, key.to_vec(), payload.to_vec()));
        }
        self.notify.notify_one();
        Ok(())
    }
}

#[async_trait]
impl TaskConsumer for InMemoryTaskQueue {
    async fn recv(&self) -> Option<Delivery> {
        loop {
            let notified = self.notify.notified();
            match self.try_take() {
                Take::Ready(delivery) => return Some(delivery),
                Take::Wait(Some(due)) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                Take::Wait(None) => notified.await,
                Take::Closed => return None,
            }
        }
    }

    async fn commit(&self, delivery: &Delivery) -> Result<(), QueueError> {
        self.take_uncommitted(delivery)?;
        let mut state = self.lock();
        state.committed.push_back(delivery.offset());
        if state.committed.len() > COMMIT_HISTORY {
            state.committed.pop_front();
        }
        Ok(())
    }

    async fn release(&self, delivery: &Delivery, delay: Duration) -> Result<(), QueueError> {
        let held = self.take_uncommitted(delivery)?;
        {
            let mut state = self.lock();
            let due = Instant::now() + delay;
            state
                .delayed
                .insert((due, held.offset()), held.redelivered());
        }
        // a waiting consumer has to re-arm its timer for the new due time
        self.notify.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RetryStrategy;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn send_recv_commit_roundtrip() {
        let queue = InMemoryTaskQueue::new();
        queue.send(b"abc", b"").await.unwrap();

        let delivery = queue.recv().await.unwrap();
        assert_eq!(delivery.key(), b"abc");
        assert_eq!(queue.uncommitted_count(), 1);

        queue.commit(&delivery).await.unwrap();
        assert_eq!(queue.committed_offsets(), vec![0]);
        assert_eq!(queue.uncommitted_count(), 0);
        assert!(queue.commit(&delivery).await.is_err());
    }

    #[tokio::test]
    async fn uncommitted_messages_are_redelivered() {
        let queue = InMemoryTaskQueue::new();
        queue.send(b"a", b"").await.unwrap();
        queue.send(b"b", b"").await.unwrap();

        let first = queue.recv().await.unwrap();
        let second = queue.recv().await.unwrap();
        queue.commit(&second).await.unwrap();

        assert_eq!(queue.redeliver_uncommitted(), 1);
        let again = queue.recv().await.unwrap();
        assert_eq!(again.key(), first.key());
        assert_eq!(again.offset(), first.offset());
        assert_eq!(again.attempt(), 2);
    }

    #[tokio::test]
    async fn released_message_comes_back_after_delay() {
        let queue = InMemoryTaskQueue::new();
        queue.send(b"k", b"").await.unwrap();
        let first = queue.recv().await.unwrap();
        assert_eq!(first.attempt(), 1);

        queue
            .release(&first, Duration::from_millis(30))
            .await
            .unwrap();
        assert_eq!(queue.uncommitted_count(), 0);
        assert_eq!(queue.delayed_count(), 1);
        assert!(queue.is_empty());

        let again = tokio::time::timeout(Duration::from_secs(1), queue.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.offset(), first.offset());
        assert_eq!(again.attempt(), 2);
        assert_eq!(queue.delayed_count(), 0);
    }

    #[tokio::test]
    async fn release_requires_an_uncommitted_message() {
        let queue = InMemoryTaskQueue::new();
        queue.send(b"k", b"").await.unwrap();
        let delivery = queue.recv().await.unwrap();
        queue.commit(&delivery).await.unwrap();

        assert!(queue.release(&delivery, Duration::ZERO).await.is_err());
        assert_eq!(queue.delayed_count(), 0);
    }

    #[tokio::test]
    async fn commit_history_is_bounded() {
        let queue = InMemoryTaskQueue::new();
        for _ in 0..COMMIT_HISTORY + 10 {
            queue.send(b"k", b"").await.unwrap();
            let delivery = queue.recv().await.unwrap();
            queue.commit(&delivery).await.unwrap();
        }

        let committed = queue.committed_offsets();
        assert_eq!(committed.len(), COMMIT_HISTORY);
        assert_eq!(committed.first(), Some(&10));
    }

    #[tokio::test]
    async fn send_wakes_waiting_consumer() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let waiter = tokio::spawn({
            let queue = queue.clone();
            async move { queue.recv().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.send(b"k", b"").await.unwrap();

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.key(), b"k");
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = InMemoryTaskQueue::new();
        queue.send(b"k", b"").await.unwrap();
        queue.close();

        assert_eq!(queue.send(b"x", b"").await, Err(QueueError::Closed));
        assert!(queue.recv().await.is_some());
        assert!(queue.recv().await.is_none());
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let queue = InMemoryTaskQueue::new();
        queue.fail_next_sends(2);

        queue
            .send_with_retry(&RetryStrategy::immediate(3), b"k", b"")
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let queue = InMemoryTaskQueue::new();
        queue.fail_next_sends(5);

        let err = queue
            .send_with_retry(&RetryStrategy::immediate(3), b"k", b"")
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::RetriesExhausted { attempts: 3, .. }));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn retry_stops_on_closed_queue() {
        let queue = InMemoryTaskQueue::new();
        queue.close();

        let err = queue
            .send_with_retry(&RetryStrategy::immediate(5), b"k", b"")
            .await
            .unwrap_err();
        assert_eq!(err, QueueError::Closed);
    }
}
