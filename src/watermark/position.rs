//! Overlay geometry.
//!
//! Sizing and placement of the overlay relative to the source image. The
//! overlay is scaled to a fraction of the source width, rotated onto an
//! expanded canvas, then centred using the dimensions of that final canvas.
//!
//! ```ignore
//! use estate_watermark::watermark::position::{centered_position, Dimensions};
//!
//! let image = Dimensions::new(800, 600);
//! let overlay = Dimensions::new(400, 300);
//! assert_eq!(centered_position(&image, &overlay), PlacementPosition::new(200, 150));
//! ```

/// Width and height of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &image::RgbaImage) -> Self {
        Self::new(image.width(), image.height())
    }
}

/// Top-left corner of the overlay on the source image.
///
/// May be negative when the overlay is larger than the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPosition {
    pub x: i32,
    pub y: i32,
}

impl PlacementPosition {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Offset that centres `overlay` on `image`.
///
/// Integer division truncates towards zero, so an odd leftover pixel goes to
/// the right/bottom edge.
pub fn centered_position(image: &Dimensions, overlay: &Dimensions) -> PlacementPosition {
    let x = (image.width as i32 - overlay.width as i32) / 2;
    let y = (image.height as i32 - overlay.height as i32) / 2;
    PlacementPosition::new(x, y)
}

/// Dimensions after scaling `overlay` to `ratio` of `target_width`, keeping
/// its aspect ratio. Never collapses below 1x1.
pub fn scale_to_width(overlay: &Dimensions, target_width: u32, ratio: f32) -> Dimensions {
    let width = ((target_width as f32 * ratio).round() as u32).max(1);
    let height = if overlay.width == 0 {
        1
    } else {
        ((overlay.height as f64 * width as f64 / overlay.width as f64).round() as u32).max(1)
    };
    Dimensions::new(width, height)
}

/// Bounding box of a `width` x `height` rectangle rotated by `degrees`.
pub fn rotated_bounds(dims: &Dimensions, degrees: f32) -> Dimensions {
    let radians = degrees.to_radians();
    let (sin, cos) = (radians.sin().abs(), radians.cos().abs());
    let w = dims.width as f32;
    let h = dims.height as f32;

    // Round away float noise before taking the ceiling
    let width = ((w * cos + h * sin) * 1000.0).round() / 1000.0;
    let height = ((w * sin + h * cos) * 1000.0).round() / 1000.0;

    Dimensions::new((width.ceil() as u32).max(1), (height.ceil() as u32).max(1))
}
