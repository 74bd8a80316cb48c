//! Task identifiers.
//!
//! # ULID を採用している理由
//! - **時刻でソート可能**: 生成順序 = 作成順序なので、`by=id` の一覧もほぼ作成順になる
//! - **分散生成可能**: API プロセスが複数あっても調整なしで採番できる
//! - **UUID互換**: 128-bit なので既存の uuid カラムにもそのまま載る
//!
//! Display は `task-` プレフィックス付き、キュー/Blob のキーにはプレフィックス無しの
//! 素の ULID 文字列（[`TaskId::key`]）を使う。パースはどちらも受け付ける。

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use ulid::Ulid;

const DISPLAY_PREFIX: &str = "task-";

/// Identifier of an image task. Assigned once at intake, never reused.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Ulid);

impl TaskId {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Bare ULID string used as queue message key and inside blob keys.
    pub fn key(&self) -> String {
        self.0.to_string()
    }
}

impl From<Ulid> for TaskId {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DISPLAY_PREFIX, self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed task id: {0:?}")]
pub struct ParseTaskIdError(pub String);

impl FromStr for TaskId {
    type Err = ParseTaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let raw = trimmed.strip_prefix(DISPLAY_PREFIX).unwrap_or(trimmed);
        Ulid::from_string(raw)
            .map(TaskId)
            .map_err(|_| ParseTaskIdError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_has_prefix_but_key_does_not() {
        let ulid = Ulid::new();
        let id = TaskId::from_ulid(ulid);

        assert_eq!(id.to_string(), format!("task-{ulid}"));
        assert_eq!(id.key(), ulid.to_string());
    }

    #[test]
    fn parses_both_display_and_key_forms() {
        let id = TaskId::from_ulid(Ulid::new());

        assert_eq!(id.to_string().parse::<TaskId>().unwrap(), id);
        assert_eq!(id.key().parse::<TaskId>().unwrap(), id);
        assert_eq!(format!("  {}\n", id.key()).parse::<TaskId>().unwrap(), id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "not-a-task".parse::<TaskId>().unwrap_err();
        assert_eq!(err, ParseTaskIdError("not-a-task".to_string()));
        assert!("".parse::<TaskId>().is_err());
        assert!("task-".parse::<TaskId>().is_err());
    }

    #[test]
    fn ids_are_sortable_by_creation() {
        let id1 = TaskId::from_ulid(Ulid::new());
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::from_ulid(Ulid::new());

        assert!(id1 < id2);
    }

    #[test]
    fn serializes_as_plain_string() {
        let id = TaskId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();

        assert_eq!(json, format!("\"{}\"", id.key()));
        assert_eq!(serde_json::from_str::<TaskId>(&json).unwrap(), id);
    }
}
