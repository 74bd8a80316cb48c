//! ImageTransformer - `image` クレートによる Transformer 実装
//!
//! | Operation | `image` API |
//! |---|---|
//! | Resize | `resize_exact` + `Lanczos3`（片側 0 / 未指定ならアスペクト比を維持） |
//! | Thumbnail | `resize_to_fill`（中央クロップ） |
//! | Watermark | `imageops::overlay`（右下 10px マージン、不透明度 0.5） |
//! | Encode | `write_to`（JPEG は RGB8 に落とす） |

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};

use crate::domain::{DEFAULT_MAX_DIMENSION, ImageKind, Operation};
use crate::ports::{EncodedImage, TransformError, TransformParams, Transformer};

/// Distance between the watermark and the bottom-right corner, in pixels.
pub const WATERMARK_MARGIN: i64 = 10;

/// Opacity applied to the watermark before compositing.
pub const WATERMARK_OPACITY: f32 = 0.5;

/// `max_dimension` bounds every output side, including one derived from the aspect ratio.
#[derive(Debug, Clone, Copy)]
pub struct ImageTransformer {
    max_dimension: u32,
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

impl ImageTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_dimension(mut self, max_dimension: u32) -> Self {
        self.max_dimension = max_dimension;
        self
    }

    fn check_bounds(&self, (w, h): (u32, u32)) -> Result<(u32, u32), TransformError> {
        if w > self.max_dimension || h > self.max_dimension {
            return Err(TransformError::InvalidParameters(format!(
                "target size {w}x{h} exceeds the {max} pixel limit",
                max = self.max_dimension
            )));
        }
        Ok((w, h))
    }
}

impl Transformer for ImageTransformer {
    fn apply(
        &self,
        params: &TransformParams,
        source: &DynamicImage,
        watermark: Option<&DynamicImage>,
        output: ImageKind,
    ) -> Result<EncodedImage, TransformError> {
        let transformed = match params.operation {
            Operation::Resize => {
                let (w, h) = self.check_bounds(resize_dimensions(
                    (source.width(), source.height()),
                    params.x,
                    params.y,
                )?)?;
                source.resize_exact(w, h, FilterType::Lanczos3)
            }
            Operation::Thumbnail => {
                let (w, h) = self.check_bounds(thumbnail_dimensions(params.x, params.y)?)?;
                source.resize_to_fill(w, h, FilterType::Lanczos3)
            }
            Operation::Watermark => {
                let watermark = watermark.ok_or_else(|| {
                    TransformError::InvalidParameters("watermark image is missing".to_string())
                })?;
                apply_watermark(source, watermark)
            }
        };
        encode(&transformed, output)
    }
}

/// Target size for a resize; a missing side follows the source aspect ratio.
pub fn resize_dimensions(
    source: (u32, u32),
    x: Option<u32>,
    y: Option<u32>,
) -> Result<(u32, u32), TransformError> {
    let (src_w, src_h) = source;
    let x = x.filter(|v| *v > 0);
    let y = y.filter(|v| *v > 0);
    match (x, y) {
        (Some(w), Some(h)) => Ok((w, h)),
        (Some(w), None) => {
            // `as` saturates, so an extreme ratio lands on u32::MAX and fails the bound check
            let h = (w as f64 * src_h as f64 / src_w.max(1) as f64).round() as u32;
            Ok((w, h.max(1)))
        }
        (None, Some(h)) => {
            let w = (h as f64 * src_w as f64 / src_h.max(1) as f64).round() as u32;
            Ok((w.max(1), h))
        }
        (None, None) => Err(TransformError::InvalidParameters(
            "resize needs at least one positive axis".to_string(),
        )),
    }
}

fn thumbnail_dimensions(x: Option<u32>, y: Option<u32>) -> Result<(u32, u32), TransformError> {
    match (x.filter(|v| *v > 0), y.filter(|v| *v > 0)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(TransformError::InvalidParameters(
            "thumbnail needs a positive size".to_string(),
        )),
    }
}

fn apply_watermark(source: &DynamicImage, watermark: &DynamicImage) -> DynamicImage {
    let mut base = source.to_rgba8();
    let mark = fade(watermark.to_rgba8(), WATERMARK_OPACITY);

    let x = base.width() as i64 - mark.width() as i64 - WATERMARK_MARGIN;
    let y = base.height() as i64 - mark.height() as i64 - WATERMARK_MARGIN;
    imageops::overlay(&mut base, &mark, x, y);

    DynamicImage::ImageRgba8(base)
}

fn fade(mut image: RgbaImage, opacity: f32) -> RgbaImage {
    for pixel in image.pixels_mut() {
        pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
    }
    image
}

fn encode(image: &DynamicImage, kind: ImageKind) -> Result<EncodedImage, TransformError> {
    // JPEG has no alpha channel.
    let image = match kind {
        ImageKind::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()),
        ImageKind::Png | ImageKind::Gif => DynamicImage::ImageRgba8(image.to_rgba8()),
    };
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, kind.image_format())
        .map_err(|e| TransformError::Encode(e.to_string()))?;
    Ok(EncodedImage {
        bytes: buf.into_inner(),
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::decode_image;
    use image::Rgba;
    use rstest::rstest;

    fn solid(w: u32, h: u32, color: [u8; 4]) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba(color)))
    }

    fn params(operation: Operation, x: Option<u32>, y: Option<u32>) -> TransformParams {
        TransformParams { operation, x, y }
    }

    fn decoded(out: &EncodedImage) -> DynamicImage {
        decode_image(&out.bytes, out.kind, "result").unwrap()
    }

    #[rstest]
    #[case::width_only((200, 100), Some(50), None, (50, 25))]
    #[case::zero_height((200, 100), Some(50), Some(0), (50, 25))]
    #[case::height_only((200, 100), None, Some(20), (40, 20))]
    #[case::both((200, 100), Some(30), Some(70), (30, 70))]
    fn resize_keeps_aspect_when_one_axis_missing(
        #[case] source: (u32, u32),
        #[case] x: Option<u32>,
        #[case] y: Option<u32>,
        #[case] expected: (u32, u32),
    ) {
        assert_eq!(resize_dimensions(source, x, y).unwrap(), expected);
    }

    #[test]
    fn resize_without_axes_is_rejected() {
        assert!(matches!(
            resize_dimensions((10, 10), None, Some(0)),
            Err(TransformError::InvalidParameters(_))
        ));
    }

    #[rstest]
    #[case::jpeg(ImageKind::Jpeg)]
    #[case::png(ImageKind::Png)]
    #[case::gif(ImageKind::Gif)]
    fn resize_encodes_in_requested_format(#[case] kind: ImageKind) {
        let out = ImageTransformer::new()
            .apply(
                &params(Operation::Resize, Some(50), None),
                &solid(200, 100, [255, 0, 0, 255]),
                None,
                kind,
            )
            .unwrap();

        assert_eq!(out.kind, kind);
        assert_eq!(ImageKind::sniff(&out.bytes).unwrap(), kind);
        let img = decoded(&out);
        assert_eq!((img.width(), img.height()), (50, 25));
    }

    #[test]
    fn thumbnail_crops_to_square() {
        let out = ImageTransformer::new()
            .apply(
                &params(Operation::Thumbnail, Some(32), Some(32)),
                &solid(200, 100, [0, 0, 255, 255]),
                None,
                ImageKind::Png,
            )
            .unwrap();

        let img = decoded(&out);
        assert_eq!((img.width(), img.height()), (32, 32));
    }

    #[test]
    fn watermark_is_blended_at_bottom_right() {
        let base = solid(100, 80, [0, 0, 0, 255]);
        let mark = solid(20, 20, [255, 255, 255, 255]);

        let out = ImageTransformer::new()
            .apply(
                &params(Operation::Watermark, None, None),
                &base,
                Some(&mark),
                ImageKind::Png,
            )
            .unwrap();
        let img = decoded(&out).to_rgba8();

        assert_eq!((img.width(), img.height()), (100, 80));
        // inside the mark: 100-20-10 = 70 .. 89, 80-20-10 = 50 .. 69
        let blended = img.get_pixel(75, 55);
        assert!(blended[0] > 100 && blended[0] < 160, "got {blended:?}");
        // margin stays untouched
        assert_eq!(img.get_pixel(95, 75)[0], 0);
        assert_eq!(img.get_pixel(10, 10)[0], 0);
    }

    #[test]
    fn watermark_larger_than_source_is_clipped() {
        let out = ImageTransformer::new()
            .apply(
                &params(Operation::Watermark, None, None),
                &solid(10, 10, [0, 0, 0, 255]),
                Some(&solid(40, 40, [255, 255, 255, 255])),
                ImageKind::Jpeg,
            )
            .unwrap();
        let img = decoded(&out);
        assert_eq!((img.width(), img.height()), (10, 10));
    }

    #[test]
    fn watermark_requires_mark_image() {
        let err = ImageTransformer::new()
            .apply(
                &params(Operation::Watermark, None, None),
                &solid(10, 10, [0, 0, 0, 255]),
                None,
                ImageKind::Png,
            )
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameters(_)));
    }

    #[rstest]
    #[case::huge_thumbnail(Operation::Thumbnail, Some(2_000_000), Some(2_000_000))]
    #[case::huge_resize(Operation::Resize, Some(10), Some(9_000))]
    #[case::derived_side_too_large(Operation::Resize, Some(8_000), None)]
    fn oversized_target_is_rejected_before_allocating(
        #[case] operation: Operation,
        #[case] x: Option<u32>,
        #[case] y: Option<u32>,
    ) {
        // 1x20 source: width 8000 would derive a height of 160000
        let err = ImageTransformer::new()
            .apply(
                &params(operation, x, y),
                &solid(1, 20, [0, 0, 0, 255]),
                None,
                ImageKind::Png,
            )
            .unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameters(_)));
    }

    #[test]
    fn max_dimension_can_be_lowered() {
        let transformer = ImageTransformer::new().with_max_dimension(16);
        let source = solid(40, 40, [0, 0, 0, 255]);

        assert!(transformer
            .apply(&params(Operation::Thumbnail, Some(16), Some(16)), &source, None, ImageKind::Png)
            .is_ok());
        assert!(matches!(
            transformer.apply(&params(Operation::Thumbnail, Some(17), Some(17)), &source, None, ImageKind::Png),
            Err(TransformError::InvalidParameters(_))
        ));
    }

    #[test]
    fn decode_garbage_fails() {
        let err = decode_image(b"not an image", ImageKind::Png, "source").unwrap_err();
        assert!(matches!(err, TransformError::Decode { what: "source", .. }));
    }
}
