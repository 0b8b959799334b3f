//! Watermark compositor.
//!
//! Blends a single prepared overlay onto the centre of a source image.
//!
//! Preparing the overlay:
//!
//! 1. Resize to half the source width, keeping the aspect ratio (Lanczos3)
//! 2. Rotate clockwise onto a canvas expanded to the rotated bounding box
//! 3. Multiply the alpha channel by the overlay opacity
//!
//! The prepared overlay is then centred and blended with the W3C `overlay`
//! blend mode, weighting source (overlay) and destination alphas separately.
//!
//! ```ignore
//! use estate_watermark::watermark::compositor::Compositor;
//!
//! let compositor = Compositor::default();
//! let watermarked = compositor.composite(&source_bytes, &overlay)?;
//! assert_eq!(watermarked.dimensions(), source_dimensions);
//! ```

use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};

use super::position::{centered_position, rotated_bounds, scale_to_width, Dimensions, PlacementPosition};
use crate::constants::{
    BLEND_DESTINATION_OPACITY, BLEND_SOURCE_OPACITY, OVERLAY_OPACITY, OVERLAY_ROTATION_DEGREES,
    OVERLAY_WIDTH_RATIO,
};
use crate::error::WatermarkError;

/// Compositing parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Compositor {
    /// Overlay width as a fraction of the source width
    pub width_ratio: f32,
    /// Clockwise rotation in degrees
    pub rotation_degrees: f32,
    /// Multiplier applied to the overlay's own alpha
    pub overlay_opacity: f32,
    /// Alpha weight of the overlay in the blend
    pub source_opacity: f32,
    /// Alpha weight of the image underneath in the blend
    pub destination_opacity: f32,
}

impl Default for Compositor {
    fn default() -> Self {
        Self {
            width_ratio: OVERLAY_WIDTH_RATIO,
            rotation_degrees: OVERLAY_ROTATION_DEGREES,
            overlay_opacity: OVERLAY_OPACITY,
            source_opacity: BLEND_SOURCE_OPACITY,
            destination_opacity: BLEND_DESTINATION_OPACITY,
        }
    }
}

impl Compositor {
    /// Decode `source_bytes` and blend `overlay` onto it.
    pub fn composite(
        &self,
        source_bytes: &[u8],
        overlay: &RgbaImage,
    ) -> Result<RgbaImage, WatermarkError> {
        let source = image::load_from_memory(source_bytes)?.to_rgba8();
        Ok(self.composite_image(source, overlay))
    }

    /// Blend `overlay` onto an already decoded source.
    pub fn composite_image(&self, mut source: RgbaImage, overlay: &RgbaImage) -> RgbaImage {
        let prepared = self.prepare_overlay(overlay, source.width());
        let placement = overlay_placement(&source, &prepared);
        self.blend_layer(&mut source, &prepared, placement);
        source
    }

    /// Resize, rotate and fade `overlay` for a source `source_width` wide.
    pub fn prepare_overlay(&self, overlay: &RgbaImage, source_width: u32) -> RgbaImage {
        let target = scale_to_width(&Dimensions::of(overlay), source_width, self.width_ratio);
        let resized = imageops::resize(overlay, target.width, target.height, FilterType::Lanczos3);

        let mut rotated = rotate_clockwise(&resized, self.rotation_degrees);

        let opacity = self.overlay_opacity.clamp(0.0, 1.0);
        for pixel in rotated.pixels_mut() {
            pixel[3] = (pixel[3] as f32 * opacity).round() as u8;
        }
        rotated
    }

    /// Blend `layer` onto `target` at `position`, clipped to the target.
    ///
    /// The target's alpha channel is left as it was; only colour changes.
    fn blend_layer(&self, target: &mut RgbaImage, layer: &RgbaImage, position: PlacementPosition) {
        let target_width = target.width() as i32;
        let target_height = target.height() as i32;

        let x_start = position.x.max(0);
        let y_start = position.y.max(0);
        let x_end = (position.x + layer.width() as i32).min(target_width);
        let y_end = (position.y + layer.height() as i32).min(target_height);

        for ty in y_start..y_end {
            for tx in x_start..x_end {
                let lx = (tx - position.x) as u32;
                let ly = (ty - position.y) as u32;

                let src = layer.get_pixel(lx, ly);
                if src[3] == 0 {
                    continue;
                }

                let dst = target.get_pixel_mut(tx as u32, ty as u32);
                *dst = self.blend_pixels(*dst, *src);
            }
        }
    }

    fn blend_pixels(&self, background: Rgba<u8>, foreground: Rgba<u8>) -> Rgba<u8> {
        let sa = (foreground[3] as f32 / 255.0) * self.source_opacity;
        let da = (background[3] as f32 / 255.0) * self.destination_opacity;
        let ra = sa + da - sa * da;

        if ra < 0.001 {
            return background;
        }

        let channel = |cs: u8, cb: u8| -> u8 {
            let cs = cs as f32 / 255.0;
            let cb = cb as f32 / 255.0;
            let mixed = cs * sa * (1.0 - da) + cb * da * (1.0 - sa) + sa * da * overlay_blend(cb, cs);
            ((mixed / ra) * 255.0).round().clamp(0.0, 255.0) as u8
        };

        Rgba([
            channel(foreground[0], background[0]),
            channel(foreground[1], background[1]),
            channel(foreground[2], background[2]),
            background[3],
        ])
    }
}

/// Where the prepared overlay lands on `source`.
pub fn overlay_placement(source: &RgbaImage, prepared: &RgbaImage) -> PlacementPosition {
    centered_position(&Dimensions::of(source), &Dimensions::of(prepared))
}

/// W3C `overlay` blend of backdrop `cb` and source `cs`, both in 0..=1.
fn overlay_blend(cb: f32, cs: f32) -> f32 {
    if cb <= 0.5 {
        2.0 * cb * cs
    } else {
        1.0 - 2.0 * (1.0 - cb) * (1.0 - cs)
    }
}

/// Rotate clockwise by `degrees` with bilinear sampling.
///
/// The canvas grows to the rotated bounding box; uncovered pixels are
/// transparent.
fn rotate_clockwise(image: &RgbaImage, degrees: f32) -> RgbaImage {
    let dst = rotated_bounds(&Dimensions::of(image), degrees);
    let mut rotated = RgbaImage::new(dst.width, dst.height);

    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin(), radians.cos());

    let src_cx = image.width() as f32 / 2.0;
    let src_cy = image.height() as f32 / 2.0;
    let dst_cx = dst.width as f32 / 2.0;
    let dst_cy = dst.height as f32 / 2.0;

    for dy in 0..dst.height {
        for dx in 0..dst.width {
            let rx = dx as f32 + 0.5 - dst_cx;
            let ry = dy as f32 + 0.5 - dst_cy;

            // Inverse rotation back into source space (y axis points down)
            let sx = rx * cos + ry * sin + src_cx - 0.5;
            let sy = -rx * sin + ry * cos + src_cy - 0.5;

            rotated.put_pixel(dx, dy, sample_bilinear(image, sx, sy));
        }
    }

    rotated
}

fn sample_bilinear(image: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let texel = |x: f32, y: f32| -> [f32; 4] {
        if x < 0.0 || y < 0.0 || x >= image.width() as f32 || y >= image.height() as f32 {
            return [0.0; 4];
        }
        let p = image.get_pixel(x as u32, y as u32);
        [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
    };

    let p00 = texel(x0, y0);
    let p10 = texel(x0 + 1.0, y0);
    let p01 = texel(x0, y0 + 1.0);
    let p11 = texel(x0 + 1.0, y0 + 1.0);

    let w00 = (1.0 - fx) * (1.0 - fy);
    let w10 = fx * (1.0 - fy);
    let w01 = (1.0 - fx) * fy;
    let w11 = fx * fy;

    // Weight colour by alpha so transparent edges don't darken the result
    let alpha = p00[3] * w00 + p10[3] * w10 + p01[3] * w01 + p11[3] * w11;
    if alpha <= f32::EPSILON {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let premultiplied = p00[c] * p00[3] * w00
            + p10[c] * p10[3] * w10
            + p01[c] * p01[3] * w01
            + p11[c] * p11[3] * w11;
        out[c] = (premultiplied / alpha).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = alpha.round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}
