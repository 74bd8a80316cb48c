//! Supported image codecs.
//!
//! 受け付ける content type と、保存時のファイル拡張子の対応表。
//! intake では申告された content type を、worker では実データから
//! 推定したフォーマットを、それぞれこの型に落とし込んでから扱う。

use std::fmt;

use image::ImageFormat;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    Jpeg,
    Png,
    Gif,
}

impl ImageKind {
    pub const ALL: [ImageKind; 3] = [ImageKind::Jpeg, ImageKind::Png, ImageKind::Gif];

    pub fn content_type(self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Gif => "image/gif",
        }
    }

    /// File extension including the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Jpeg => ".jpg",
            ImageKind::Png => ".png",
            ImageKind::Gif => ".gif",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            ImageKind::Jpeg => ImageFormat::Jpeg,
            ImageKind::Png => ImageFormat::Png,
            ImageKind::Gif => ImageFormat::Gif,
        }
    }

    pub fn from_content_type(content_type: &str) -> Option<Self> {
        // "image/png; charset=binary" のようなパラメータ付きも許容する
        let essence = content_type.split(';').next().unwrap_or("").trim();
        Self::ALL
            .into_iter()
            .find(|kind| kind.content_type().eq_ignore_ascii_case(essence))
    }

    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.image_format() == format)
    }

    /// Lookup by file extension, with or without the dot (`jpeg` is accepted too).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            "gif" => Some(ImageKind::Gif),
            _ => None,
        }
    }

    /// Detect the codec from the payload bytes (magic numbers), ignoring any declared type.
    pub fn sniff(bytes: &[u8]) -> Result<Self, UnknownFormat> {
        let format = image::guess_format(bytes).map_err(|_| UnknownFormat::Unrecognized)?;
        Self::from_image_format(format).ok_or(UnknownFormat::Unsupported(format))
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_type())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnknownFormat {
    #[error("payload is not a recognizable image")]
    Unrecognized,

    #[error("image format {0:?} is not supported")]
    Unsupported(ImageFormat),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn encoded(format: ImageFormat) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([10, 20, 30]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    #[test]
    fn content_type_lookup_tolerates_params_and_case() {
        assert_eq!(ImageKind::from_content_type("image/png"), Some(ImageKind::Png));
        assert_eq!(
            ImageKind::from_content_type("IMAGE/JPEG; q=1"),
            Some(ImageKind::Jpeg)
        );
        assert_eq!(ImageKind::from_content_type("image/webp"), None);
        assert_eq!(ImageKind::from_content_type(""), None);
    }

    #[test]
    fn extension_lookup() {
        assert_eq!(ImageKind::from_extension(".JPEG"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_extension("gif"), Some(ImageKind::Gif));
        assert_eq!(ImageKind::from_extension("tiff"), None);
    }

    #[test]
    fn sniff_uses_bytes_not_declared_type() {
        assert_eq!(ImageKind::sniff(&encoded(ImageFormat::Jpeg)), Ok(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(&encoded(ImageFormat::Png)), Ok(ImageKind::Png));
        assert_eq!(ImageKind::sniff(b"definitely not an image"), Err(UnknownFormat::Unrecognized));
    }
}
