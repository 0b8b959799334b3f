//! Size-bounded JPEG encoding.
//!
//! The image is encoded at quality 100 first. While the output is larger
//! than the ceiling the quality drops by a fixed step, down to a floor; if
//! the floor still does not fit the item fails.

use image::RgbaImage;

use crate::constants::{INITIAL_JPEG_QUALITY, JPEG_QUALITY_STEP, MIN_JPEG_QUALITY};
use crate::error::WatermarkError;

/// Encoder that accepts a quality setting.
pub trait QualityEncoder: Send + Sync {
    /// Encode `image` at `quality` (1-100)
    fn encode(&self, image: &RgbaImage, quality: u8) -> Result<Vec<u8>, WatermarkError>;
}

/// JPEG encoder using the image crate
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegQualityEncoder;

impl QualityEncoder for JpegQualityEncoder {
    fn encode(&self, image: &RgbaImage, quality: u8) -> Result<Vec<u8>, WatermarkError> {
        use image::codecs::jpeg::JpegEncoder;
        use image::ImageEncoder as _;
        use std::io::Cursor;

        // JPEG has no alpha channel
        let rgb_data = rgba_to_rgb(image.as_raw());

        let mut output = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut output, quality)
            .write_image(&rgb_data, image.width(), image.height(), image::ColorType::Rgb8)
            .map_err(|e| WatermarkError::Internal(format!("jpeg encoding failed: {e}")))?;

        Ok(output.into_inner())
    }
}

fn rgba_to_rgb(rgba: &[u8]) -> Vec<u8> {
    rgba.chunks_exact(4)
        .flat_map(|px| [px[0], px[1], px[2]])
        .collect()
}

/// Encoded output and the quality it was produced at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedJpeg {
    pub data: Vec<u8>,
    pub quality: u8,
    /// Number of quality reductions before the output fit
    pub iterations: u32,
}

impl EncodedJpeg {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Encode `image`, lowering quality until the output is at most `ceiling`
/// bytes.
pub fn encode_under_ceiling(
    encoder: &dyn QualityEncoder,
    image: &RgbaImage,
    ceiling: usize,
) -> Result<EncodedJpeg, WatermarkError> {
    let mut quality = INITIAL_JPEG_QUALITY;
    let mut iterations = 0;
    let mut data = encoder.encode(image, quality)?;

    while data.len() > ceiling && quality > MIN_JPEG_QUALITY {
        quality = quality.saturating_sub(JPEG_QUALITY_STEP).max(MIN_JPEG_QUALITY);
        iterations += 1;
        data = encoder.encode(image, quality)?;

        tracing::debug!(
            quality,
            size = data.len(),
            ceiling,
            "Re-encoded at lower quality"
        );
    }

    if data.len() > ceiling {
        return Err(WatermarkError::SizeConstraintExceeded {
            size: data.len(),
            ceiling,
            quality,
        });
    }

    Ok(EncodedJpeg {
        data,
        quality,
        iterations,
    })
}
