//! Transformer port - ピクセル処理の外部コラボレータ
//!
//! デコード済み画像を受け取り、指定フォーマットでエンコードした結果を返す。
//! 状態を持たない純粋な処理なので同期 trait にしている
//! （呼び出し側が `spawn_blocking` で実行する）。

use image::DynamicImage;
use thiserror::Error;

use crate::domain::{ImageKind, Operation};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransformError {
    #[error("failed to decode {what}: {reason}")]
    Decode { what: &'static str, reason: String },

    #[error("failed to encode result: {0}")]
    Encode(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),
}

/// What to do with the source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformParams {
    pub operation: Operation,
    pub x: Option<u32>,
    pub y: Option<u32>,
}

/// Encoded output of a transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub kind: ImageKind,
}

impl EncodedImage {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Decode `bytes` as `kind`. `what` names the input in the error ("source", "watermark").
pub fn decode_image(
    bytes: &[u8],
    kind: ImageKind,
    what: &'static str,
) -> Result<DynamicImage, TransformError> {
    image::load_from_memory_with_format(bytes, kind.image_format()).map_err(|e| {
        TransformError::Decode {
            what,
            reason: e.to_string(),
        }
    })
}

pub trait Transformer: Send + Sync {
    fn apply(
        &self,
        params: &TransformParams,
        source: &DynamicImage,
        watermark: Option<&DynamicImage>,
        output: ImageKind,
    ) -> Result<EncodedImage, TransformError>;
}
