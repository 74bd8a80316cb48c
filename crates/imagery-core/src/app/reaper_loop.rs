//! ReaperLoop - 放置されたタスクの再配送
//!
//! # フロー
//! 1. `created` / `in_progress` のまま `stale_after` 以上更新されていないタスクを探す
//! 2. それぞれの task_id を intake と同じリトライ方針で再 publish
//!
//! ステータスは一切書き換えない。重複配送は TaskProcessor の冪等性チェックで吸収される。
//! 1 件の publish 失敗でバッチは止めない。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::domain::{RetryStrategy, TaskStatus};
use crate::ports::{Clock, StoreError, TaskPublisher, TaskStore};

const STUCK_STATUSES: [TaskStatus; 2] = [TaskStatus::Created, TaskStatus::InProgress];

/// Result of one recovery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub found: usize,
    pub republished: usize,
    pub failed: usize,
}

pub struct OrphanRecovery {
    tasks: Arc<dyn TaskStore>,
    publisher: Arc<dyn TaskPublisher>,
    clock: Arc<dyn Clock>,
    retry: RetryStrategy,
    stale_after: chrono::Duration,
    span: Span,
}

impl OrphanRecovery {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        publisher: Arc<dyn TaskPublisher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tasks,
            publisher,
            clock,
            retry: RetryStrategy::default(),
            stale_after: chrono::Duration::minutes(10),
            span: tracing::info_span!("recovery"),
        }
    }

    pub fn with_retry(mut self, retry: RetryStrategy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stale_after(mut self, stale_after: chrono::Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Re-dispatch up to `limit` tasks stuck in a non-terminal status.
    pub async fn revive_stuck(&self, limit: usize) -> Result<RecoveryReport, StoreError> {
        self.revive_inner(limit)
            .instrument(self.span.clone())
            .await
    }

    async fn revive_inner(&self, limit: usize) -> Result<RecoveryReport, StoreError> {
        let cutoff = self.clock.now() - self.stale_after;
        let stuck = self.tasks.find_stale(&STUCK_STATUSES, cutoff, limit).await?;

        let mut report = RecoveryReport {
            found: stuck.len(),
            ..RecoveryReport::default()
        };
        for id in stuck {
            match self
                .publisher
                .send_with_retry(&self.retry, id.key().as_bytes(), &[])
                .await
            {
                Ok(()) => {
                    debug!(task_id = %id, "re-dispatched stuck task");
                    report.republished += 1;
                }
                Err(e) => {
                    warn!(task_id = %id, error = %e, "failed to re-dispatch stuck task");
                    report.failed += 1;
                }
            }
        }

        if report.found > 0 {
            info!(
                found = report.found,
                republished = report.republished,
                failed = report.failed,
                "recovery pass finished"
            );
        }
        Ok(report)
    }
}

/// Runs [`OrphanRecovery::revive_stuck`] on a fixed interval.
pub struct ReaperLoop {
    recovery: Arc<OrphanRecovery>,
    interval: Duration,
    batch_limit: usize,
}

impl ReaperLoop {
    pub fn new(recovery: Arc<OrphanRecovery>, interval: Duration, batch_limit: usize) -> Self {
        Self {
            recovery,
            interval,
            batch_limit,
        }
    }

    /// Tick until shutdown. The first pass runs one interval after start.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.recovery.revive_stuck(self.batch_limit).await {
                        error!(error = %e, "stale task scan failed");
                    }
                }
            }
        }
        debug!("reaper stopped");
    }
}
