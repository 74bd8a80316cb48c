//! Raw creation request as handed over by the request layer.
//!
//! 値はまだ検証されていない。検証・正規化は [`crate::domain::normalize`] が行う。

/// An uploaded binary payload with its declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            content_type: content_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub operation: String,
    pub x: Option<i64>,
    pub y: Option<i64>,
    pub source: Option<Upload>,
    pub watermark: Option<Upload>,
}

impl CreateRequest {
    pub fn new(operation: impl Into<String>, source: Upload) -> Self {
        Self {
            operation: operation.into(),
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn axes(mut self, x: Option<i64>, y: Option<i64>) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn watermark(mut self, watermark: Upload) -> Self {
        self.watermark = Some(watermark);
        self
    }
}
