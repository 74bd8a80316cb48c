//! Image task record and its state machine.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// Requested transformation. Immutable after creation.
///
/// The serialized names are persisted vocabulary; do not rename them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Resize,
    Thumbnail,
    Watermark,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Resize => "resize",
            Operation::Thumbnail => "thumbnail",
            Operation::Watermark => "watermark",
        }
    }

    /// Does this operation need a second (watermark) payload?
    pub fn needs_watermark(self) -> bool {
        matches!(self, Operation::Watermark)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resize" => Ok(Operation::Resize),
            "thumbnail" => Ok(Operation::Thumbnail),
            "watermark" => Ok(Operation::Watermark),
            other => Err(other.to_string()),
        }
    }
}

/// Task status.
///
/// State transitions:
/// - Created -> InProgress -> Done
/// - Created -> InProgress -> Failed -> InProgress (re-dispatch)
/// - InProgress -> InProgress (stale claim taken over by another delivery)
/// - Created | Failed -> Done (result already persisted, status write was lost)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Created,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Created => "created",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    /// Terminal from the processor's point of view.
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Created, InProgress)
                | (Failed, InProgress)
                | (InProgress, InProgress)
                | (InProgress, Done)
                | (InProgress, Failed)
                | (Created, Done)
                | (Failed, Done)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(TaskStatus::Created),
            "in_progress" => Ok(TaskStatus::InProgress),
            "done" => Ok(TaskStatus::Done),
            "failed" => Ok(TaskStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// One image-transformation job and its current state.
///
/// Invariants (kept by intake and the task store):
/// - `result_key.is_some()` iff `status == Done`
/// - `watermark_key.is_some()` iff `operation == Watermark`
/// - `x == y` for thumbnails
/// - `diagnostics` is append-only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageTask {
    pub id: TaskId,
    pub source_key: String,
    pub watermark_key: Option<String>,
    pub result_key: Option<String>,
    pub operation: Operation,
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub status: TaskStatus,
    pub diagnostics: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImageTask {
    /// Fresh record in `Created` state.
    pub fn new(
        id: TaskId,
        operation: Operation,
        source_key: String,
        watermark_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            source_key,
            watermark_key,
            result_key: None,
            operation,
            x: None,
            y: None,
            status: TaskStatus::Created,
            diagnostics: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_axes(mut self, x: Option<u32>, y: Option<u32>) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_diagnostics(mut self, notes: Vec<String>) -> Self {
        self.diagnostics.extend(notes);
        self
    }

    /// Blob keys owned by this task, in deletion order.
    pub fn blob_keys(&self) -> Vec<&str> {
        let mut keys = vec![self.source_key.as_str()];
        if self.status == TaskStatus::Done
            && let Some(result) = &self.result_key
        {
            keys.push(result);
        }
        if self.operation.needs_watermark()
            && let Some(wm) = &self.watermark_key
        {
            keys.push(wm);
        }
        keys
    }
}

/// Successful processing result written back to the task store.
///
/// Writing it moves the task to `Done` together with the result key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub id: TaskId,
    pub result_key: String,
}
