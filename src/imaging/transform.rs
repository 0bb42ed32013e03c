use std::io::Cursor;

use image::{DynamicImage, ImageFormat};

use crate::error_handling::types::TransformError;
use crate::imaging::operation::{Operation, SHARPEN_THRESHOLD};

/// Capability turning one encoded image into another.
///
/// Implementations are pure: they never touch the filesystem or the session
/// store, which keeps them swappable in tests.
pub trait ImageTransform: Send + Sync {
    /// Whether artifacts with this extension (e.g. `.jpg`) can be re-encoded.
    fn supports(&self, extension: &str) -> bool;

    /// Decodes `input`, applies `operation` and encodes the result in the
    /// format implied by `extension`.
    fn apply(
        &self,
        input: &[u8],
        extension: &str,
        operation: &Operation,
    ) -> Result<Vec<u8>, TransformError>;
}

/// `ImageTransform` backed by the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImagingTransform;

impl ImagingTransform {
    pub fn new() -> Self {
        Self
    }

    fn format_for(extension: &str) -> Option<ImageFormat> {
        let format = ImageFormat::from_extension(extension.trim_start_matches('.'))?;
        match format {
            ImageFormat::Png
            | ImageFormat::Jpeg
            | ImageFormat::Gif
            | ImageFormat::WebP
            | ImageFormat::Bmp => Some(format),
            _ => None,
        }
    }

    /// Converts to a pixel layout the target encoder accepts.
    fn prepare_for(format: ImageFormat, img: DynamicImage) -> DynamicImage {
        match (format, &img) {
            (ImageFormat::Jpeg, DynamicImage::ImageRgb8(_))
            | (ImageFormat::Jpeg, DynamicImage::ImageLuma8(_)) => img,
            (ImageFormat::Jpeg, _) => DynamicImage::ImageRgb8(img.to_rgb8()),
            (ImageFormat::Png, _) => img,
            (_, DynamicImage::ImageRgba8(_)) => img,
            _ => DynamicImage::ImageRgba8(img.to_rgba8()),
        }
    }
}

impl ImageTransform for ImagingTransform {
    fn supports(&self, extension: &str) -> bool {
        Self::format_for(extension).is_some()
    }

    fn apply(
        &self,
        input: &[u8],
        extension: &str,
        operation: &Operation,
    ) -> Result<Vec<u8>, TransformError> {
        let format = Self::format_for(extension)
            .ok_or_else(|| TransformError::UnsupportedFormat(extension.to_string()))?;

        let src = image::load_from_memory(input)
            .map_err(|e| TransformError::DecodeFailed(e.to_string()))?;

        let result = match *operation {
            Operation::Blur { sigma } => src.blur(sigma as f32),
            Operation::Sharpen { sigma } => src.unsharpen(sigma as f32, SHARPEN_THRESHOLD),
        };

        let mut out = Cursor::new(Vec::new());
        Self::prepare_for(format, result)
            .write_to(&mut out, format)
            .map_err(|e| TransformError::EncodeFailed(e.to_string()))?;
        Ok(out.into_inner())
    }
}
