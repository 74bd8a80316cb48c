//! Intake validation and normalization.
//!
//! Blob/DB に触る前に、リクエストを検証して正規化済みの値に変換する。
//! ここで返るエラーはすべて ClientFault。

use super::errors::ServiceError;
use super::image_kind::ImageKind;
use super::request::{CreateRequest, Upload};
use super::task::Operation;

/// A creation request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    pub operation: Operation,
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub source_kind: ImageKind,
    pub watermark_kind: Option<ImageKind>,
    pub diagnostics: Vec<String>,
}

/// Largest accepted value for either axis unless configured otherwise.
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;

/// Validate `request` and normalize its axes.
///
/// Check order: operation, source payload, watermark payload, axes.
/// An axis above `max_dimension` is rejected rather than clamped.
pub fn normalize(request: &CreateRequest, max_dimension: u32) -> Result<Normalized, ServiceError> {
    let operation: Operation = request
        .operation
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(ServiceError::UnsupportedOperation)?;

    let source_kind = request
        .source
        .as_ref()
        .and_then(payload_kind)
        .ok_or(ServiceError::InvalidSource)?;

    let watermark_kind = if operation.needs_watermark() {
        match request.watermark.as_ref().and_then(payload_kind) {
            Some(ImageKind::Png) => Some(ImageKind::Png),
            _ => return Err(ServiceError::InvalidWatermark),
        }
    } else {
        None
    };

    let mut diagnostics = Vec::new();
    let (x, y) = match operation {
        Operation::Resize => resize_axes(
            positive(request.x, max_dimension)?,
            positive(request.y, max_dimension)?,
        )?,
        Operation::Thumbnail => thumbnail_axes(
            positive(request.x, max_dimension)?,
            positive(request.y, max_dimension)?,
            &mut diagnostics,
        )?,
        Operation::Watermark => (None, None),
    };

    Ok(Normalized {
        operation,
        x,
        y,
        source_kind,
        watermark_kind,
        diagnostics,
    })
}

fn payload_kind(upload: &Upload) -> Option<ImageKind> {
    if upload.is_empty() {
        return None;
    }
    ImageKind::from_content_type(&upload.content_type)
}

/// Non-positive means "not given"; anything above `max` is an error.
fn positive(v: Option<i64>, max: u32) -> Result<Option<u32>, ServiceError> {
    match v.filter(|v| *v > 0) {
        None => Ok(None),
        Some(v) => match u32::try_from(v) {
            Ok(v) if v <= max => Ok(Some(v)),
            _ => Err(ServiceError::InvalidAxis),
        },
    }
}

/// At least one axis; the missing one is left to the transformer (aspect ratio).
fn resize_axes(x: Option<u32>, y: Option<u32>) -> Result<(Option<u32>, Option<u32>), ServiceError> {
    match (x, y) {
        (None, None) => Err(ServiceError::InvalidAxis),
        axes => Ok(axes),
    }
}

/// Thumbnails are square, biased toward the smaller requested side.
fn thumbnail_axes(
    x: Option<u32>,
    y: Option<u32>,
    diagnostics: &mut Vec<String>,
) -> Result<(Option<u32>, Option<u32>), ServiceError> {
    let side = match (x, y) {
        (None, None) => return Err(ServiceError::InvalidAxis),
        (None, Some(y)) => {
            diagnostics.push(format!(
                "x-axis missing or non-positive: using y-axis value {y} for a square thumbnail"
            ));
            y
        }
        (Some(x), None) => {
            diagnostics.push(format!(
                "y-axis missing or non-positive: using x-axis value {x} for a square thumbnail"
            ));
            x
        }
        (Some(x), Some(y)) if x != y => {
            let smaller = x.min(y);
            diagnostics.push(format!(
                "axis values must be equal for a thumbnail: using smaller value {smaller}"
            ));
            smaller
        }
        (Some(x), Some(_)) => x,
    };
    Ok((Some(side), Some(side)))
}
