// Constants module - centralized default values for configuration
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers keeps the defaults in one place.

// =============================================================================
// Batch defaults
// =============================================================================

/// Default maximum number of in-flight image tasks per pool
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;

/// Default number of sweep attempts before a ledger row is left errored
pub const DEFAULT_MAX_RETRY_COUNT: u32 = 3;

/// Default candidate discovery page size
pub const DEFAULT_PAGE_SIZE: usize = 100;

// =============================================================================
// Encoding defaults
// =============================================================================

/// Default maximum encoded image size (10 MiB)
pub const DEFAULT_SIZE_CEILING_BYTES: usize = 10 * 1024 * 1024;

/// JPEG quality of the first encoding attempt
pub const INITIAL_JPEG_QUALITY: u8 = 100;

/// Quality decrement between encoding attempts
pub const JPEG_QUALITY_STEP: u8 = 5;

/// Lowest JPEG quality the encoder will try
pub const MIN_JPEG_QUALITY: u8 = 5;

// =============================================================================
// Compositing defaults
// =============================================================================

/// Overlay width as a fraction of the source width
pub const OVERLAY_WIDTH_RATIO: f32 = 0.5;

/// Overlay rotation in degrees (clockwise)
pub const OVERLAY_ROTATION_DEGREES: f32 = 30.0;

/// Opacity applied to the overlay before compositing
pub const OVERLAY_OPACITY: f32 = 0.3;

/// Opacity of the overlay (source) layer during the blend
pub const BLEND_SOURCE_OPACITY: f32 = 0.6;

/// Opacity of the base (destination) image during the blend
pub const BLEND_DESTINATION_OPACITY: f32 = 0.5;

// =============================================================================
// Naming defaults
// =============================================================================

/// Substring embedded in a watermarked asset's filename
pub const DEFAULT_WATERMARK_MARKER: &str = "_watermarked";

/// Folder (by name) that receives archived originals
pub const DEFAULT_VAULT_FOLDER: &str = "Original Images";

/// Prefix of archived original filenames: `original:{live_id}_{filename}`
pub const VAULT_FILENAME_PREFIX: &str = "original:";

// =============================================================================
// Store defaults
// =============================================================================

/// Default asset store request timeout in seconds
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;

/// Default maximum number of cached overlay images
pub const DEFAULT_OVERLAY_CACHE_ENTRIES: u64 = 8;

/// Default overlay cache time-to-live in seconds
pub const DEFAULT_OVERLAY_CACHE_TTL_SECS: u64 = 3600;
