use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::{ReaperLoop, WorkerLoop};

/// Background loops handle.
/// - `request_shutdown()` で worker / reaper の両方が止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn the consumption loop and the recovery loop.
    pub fn spawn(worker: WorkerLoop, reaper: ReaperLoop) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let joins = vec![
            tokio::spawn({
                let rx = shutdown_rx.clone();
                async move { worker.run(rx).await }
            }),
            tokio::spawn(async move { reaper.run(shutdown_rx).await }),
        ];

        Self { shutdown_tx, joins }
    }

    /// Request shutdown for both loops.
    /// In-flight task handling is not cancelled; loops stop before taking the next message.
    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for both loops.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}
