//! Errors - エラー型と分類
//!
//! サービス境界で返すエラーはすべて [`ServiceError`]。
//! リクエスト層は [`ErrorKind`] だけを見てレスポンスを決めればよい。
//! Conflict / UnsupportedFormat は配送処理でしか起きないので、
//! `ProcessError::kind()` だけがそれらを返す。

use thiserror::Error;

use super::ids::TaskId;
use crate::ports::{BlobError, QueueError, StoreError};

/// ErrorKind は運用上の分類
///
/// # 分類
/// - ClientFault: リクエストが不正（再送しても無駄）
/// - NotFound / NotReady: 対象が無い・まだ処理されていない
/// - Conflict: 別の配送が処理中
/// - UnsupportedFormat: 実データが対応コーデックではない
/// - Transient: ストア/キューの一時的な障害（リトライ推奨）
/// - Terminal: 正しい入力に対して処理ロジック自体が失敗（盲目的なリトライは無意味）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ClientFault,
    NotFound,
    Conflict,
    NotReady,
    UnsupportedFormat,
    Transient,
    Terminal,
}

impl ErrorKind {
    /// HTTP status a request layer should answer with.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::ClientFault | ErrorKind::UnsupportedFormat => 400,
            ErrorKind::NotFound | ErrorKind::NotReady => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::Transient | ErrorKind::Terminal => 500,
        }
    }

    pub fn is_server_fault(self) -> bool {
        matches!(self, ErrorKind::Transient | ErrorKind::Terminal)
    }
}

const SERVER_FAULT_MESSAGE: &str = "something went wrong, try again later";

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("operation is not supported: {0:?}")]
    UnsupportedOperation(String),

    #[error("empty or incorrect source image provided")]
    InvalidSource,

    #[error("empty or incorrect watermark provided")]
    InvalidWatermark,

    #[error("incorrect axis values provided")]
    InvalidAxis,

    #[error("incorrect task id: {0:?}")]
    MalformedId(String),

    #[error("task {0} does not exist")]
    NotFound(TaskId),

    #[error("task {0} is not processed yet")]
    NotReady(TaskId),

    #[error("task store: {0}")]
    Store(#[from] StoreError),

    #[error("blob store: {0}")]
    Blob(#[from] BlobError),

    #[error("task queue: {0}")]
    Queue(#[from] QueueError),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::UnsupportedOperation(_)
            | ServiceError::InvalidSource
            | ServiceError::InvalidWatermark
            | ServiceError::InvalidAxis
            | ServiceError::MalformedId(_) => ErrorKind::ClientFault,
            ServiceError::NotFound(_) => ErrorKind::NotFound,
            ServiceError::NotReady(_) => ErrorKind::NotReady,
            ServiceError::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            ServiceError::Store(_) | ServiceError::Blob(_) | ServiceError::Queue(_) => {
                ErrorKind::Transient
            }
        }
    }

    /// Message safe to show to a client: server faults carry no internal detail.
    pub fn public_message(&self) -> String {
        if self.kind().is_server_fault() {
            SERVER_FAULT_MESSAGE.to_string()
        } else {
            self.to_string()
        }
    }
}
