//! Image watermarking.
//!
//! Turns a source image plus an overlay (typically a company logo) into a
//! watermarked JPEG that fits under a size ceiling.
//!
//! # Pipeline
//!
//! 1. [`OverlayFetcher`] loads and caches the decoded overlay
//! 2. [`Compositor`] resizes, rotates and fades the overlay, then blends it
//!    onto the centre of the source
//! 3. [`encode_under_ceiling`] re-encodes at decreasing JPEG quality until
//!    the output fits
//!
//! # Configuration Example
//!
//! ```yaml
//! watermark:
//!   overlay: "asset:5b1d7e0c-logo"
//!   marker: "_watermarked"
//!   vault_folder: "Original Images"
//!   size_ceiling_bytes: 10485760
//! ```

pub mod compositor;
pub mod encoder;
pub mod marker;
pub mod overlay;
pub mod position;

pub use compositor::{overlay_placement, Compositor};
pub use encoder::{encode_under_ceiling, EncodedJpeg, JpegQualityEncoder, QualityEncoder};
pub use marker::WatermarkMarker;
pub use overlay::{OverlayFetcher, OverlayFetcherConfig, OverlaySource};
pub use position::{centered_position, Dimensions, PlacementPosition};
