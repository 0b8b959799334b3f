//! Watermark rendering configuration.
//!
//! ```yaml
//! watermark:
//!   overlay: "asset:6f1c3a9e-8d2b-4c1e-9f3a-2b7d5e8c4a10"
//!   marker: "_watermarked"
//!   vault_folder: "Original Images"
//!   size_ceiling_bytes: 10485760
//!   work_dir: /var/tmp/estate-watermark
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::constants::{
    DEFAULT_OVERLAY_CACHE_ENTRIES, DEFAULT_OVERLAY_CACHE_TTL_SECS, DEFAULT_SIZE_CEILING_BYTES,
    DEFAULT_VAULT_FOLDER, DEFAULT_WATERMARK_MARKER,
};
use crate::watermark::{OverlayFetcherConfig, WatermarkMarker};

fn default_marker() -> String {
    DEFAULT_WATERMARK_MARKER.to_string()
}

fn default_vault_folder() -> String {
    DEFAULT_VAULT_FOLDER.to_string()
}

fn default_size_ceiling_bytes() -> usize {
    DEFAULT_SIZE_CEILING_BYTES
}

fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("estate-watermark")
}

fn default_overlay_cache_entries() -> u64 {
    DEFAULT_OVERLAY_CACHE_ENTRIES
}

fn default_overlay_cache_ttl_secs() -> u64 {
    DEFAULT_OVERLAY_CACHE_TTL_SECS
}

/// Watermark configuration (YAML format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatermarkConfig {
    /// Overlay source: `asset:<id>`, `https://...` or a local file path
    pub overlay: String,
    /// Filename substring marking a processed asset (default: `_watermarked`)
    #[serde(default = "default_marker")]
    pub marker: String,
    /// Folder name receiving archived originals
    #[serde(default = "default_vault_folder")]
    pub vault_folder: String,
    /// Maximum encoded output size in bytes (default: 10 MiB)
    #[serde(default = "default_size_ceiling_bytes")]
    pub size_ceiling_bytes: usize,
    /// Directory for temporary artifacts
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,
    #[serde(default = "default_overlay_cache_entries")]
    pub overlay_cache_entries: u64,
    #[serde(default = "default_overlay_cache_ttl_secs")]
    pub overlay_cache_ttl_secs: u64,
}

impl WatermarkConfig {
    /// Configuration with every default except the overlay source
    pub fn with_overlay(overlay: impl Into<String>) -> Self {
        Self {
            overlay: overlay.into(),
            marker: default_marker(),
            vault_folder: default_vault_folder(),
            size_ceiling_bytes: default_size_ceiling_bytes(),
            work_dir: default_work_dir(),
            overlay_cache_entries: default_overlay_cache_entries(),
            overlay_cache_ttl_secs: default_overlay_cache_ttl_secs(),
        }
    }

    pub fn marker(&self) -> WatermarkMarker {
        WatermarkMarker::new(self.marker.clone())
    }

    pub fn overlay_fetcher_config(&self) -> OverlayFetcherConfig {
        OverlayFetcherConfig {
            max_cache_entries: self.overlay_cache_entries,
            cache_ttl: Duration::from_secs(self.overlay_cache_ttl_secs),
            ..OverlayFetcherConfig::default()
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.overlay.trim().is_empty() {
            return Err("watermark.overlay cannot be empty".to_string());
        }
        if self.marker.trim().is_empty() {
            return Err("watermark.marker cannot be empty".to_string());
        }
        if self.vault_folder.trim().is_empty() {
            return Err("watermark.vault_folder cannot be empty".to_string());
        }
        if self.size_ceiling_bytes == 0 {
            return Err("watermark.size_ceiling_bytes must be > 0".to_string());
        }
        Ok(())
    }
}
