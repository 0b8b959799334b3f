//! Overlay image fetcher with caching.
//!
//! The overlay (usually a logo) is fetched once, decoded to RGBA and kept in
//! an in-memory cache keyed by its source string.
//!
//! # Supported Sources
//!
//! - `asset:<id>` - asset in the asset store
//! - `https://example.com/logo.png` - HTTPS URL
//! - anything else without a scheme - local file path
//!
//! Plain `http://` and other schemes are rejected.

use image::RgbaImage;
use moka::future::Cache;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::DEFAULT_STORE_TIMEOUT_SECS;
use crate::error::WatermarkError;
use crate::store::AssetStore;

/// Configuration for the overlay fetcher.
#[derive(Debug, Clone)]
pub struct OverlayFetcherConfig {
    /// Maximum number of cached overlays.
    pub max_cache_entries: u64,
    /// Time-to-live for cached overlays.
    pub cache_ttl: Duration,
    /// Timeout for HTTPS fetches.
    pub http_timeout: Duration,
}

impl Default for OverlayFetcherConfig {
    fn default() -> Self {
        Self {
            max_cache_entries: crate::constants::DEFAULT_OVERLAY_CACHE_ENTRIES,
            cache_ttl: Duration::from_secs(crate::constants::DEFAULT_OVERLAY_CACHE_TTL_SECS),
            http_timeout: Duration::from_secs(DEFAULT_STORE_TIMEOUT_SECS),
        }
    }
}

/// Parsed overlay location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlaySource {
    /// Asset in the asset store.
    Asset(String),
    /// HTTPS URL.
    Https(String),
    /// Local file.
    File(PathBuf),
}

impl OverlaySource {
    /// Parse a source string.
    ///
    /// # Errors
    ///
    /// Returns `WatermarkError::Config` for an empty source, an empty asset id
    /// or an unsupported scheme.
    pub fn parse(source: &str) -> Result<Self, WatermarkError> {
        let source = source.trim();
        if source.is_empty() {
            return Err(WatermarkError::Config(
                "Overlay source cannot be empty".to_string(),
            ));
        }

        if let Some(id) = source.strip_prefix("asset:") {
            if id.is_empty() {
                return Err(WatermarkError::Config(format!(
                    "Invalid asset source: {source}. Expected asset:<id>"
                )));
            }
            Ok(OverlaySource::Asset(id.to_string()))
        } else if source.starts_with("https://") {
            Ok(OverlaySource::Https(source.to_string()))
        } else if source.contains("://") {
            Err(WatermarkError::Config(format!(
                "Unsupported overlay source protocol: {source}. Use asset:, https:// or a file path"
            )))
        } else {
            Ok(OverlaySource::File(PathBuf::from(source)))
        }
    }

    /// Cache key for this source.
    pub fn cache_key(&self) -> String {
        match self {
            OverlaySource::Asset(id) => format!("asset:{id}"),
            OverlaySource::Https(url) => url.clone(),
            OverlaySource::File(path) => path.display().to_string(),
        }
    }
}

/// Fetcher for overlay images with built-in caching.
#[derive(Clone)]
pub struct OverlayFetcher {
    cache: Cache<String, Arc<RgbaImage>>,
    http_client: reqwest::Client,
    assets: Arc<dyn AssetStore>,
}

impl OverlayFetcher {
    /// Create a fetcher. `asset:` sources are read through `assets`.
    ///
    /// # Errors
    ///
    /// Returns `WatermarkError::Config` if the HTTP client cannot be created.
    pub fn new(
        config: OverlayFetcherConfig,
        assets: Arc<dyn AssetStore>,
    ) -> Result<Self, WatermarkError> {
        let cache = Cache::builder()
            .max_capacity(config.max_cache_entries)
            .time_to_live(config.cache_ttl)
            .build();

        let http_client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| WatermarkError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            cache,
            http_client,
            assets,
        })
    }

    /// Fetch and decode the overlay at `source`.
    ///
    /// Decoded overlays are cached until the TTL expires.
    pub async fn fetch(&self, source: &str) -> Result<Arc<RgbaImage>, WatermarkError> {
        let parsed = OverlaySource::parse(source)?;
        let cache_key = parsed.cache_key();

        if let Some(cached) = self.cache.get(&cache_key).await {
            return Ok(cached);
        }

        let bytes = match &parsed {
            OverlaySource::Asset(id) => self.assets.fetch(id).await?.bytes.to_vec(),
            OverlaySource::Https(url) => self.fetch_from_https(url).await?,
            OverlaySource::File(path) => tokio::fs::read(path).await.map_err(|e| {
                WatermarkError::io(format!("read overlay {}", path.display()), e)
            })?,
        };

        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| WatermarkError::MalformedImage(format!("overlay {cache_key}: {e}")))?
            .to_rgba8();

        tracing::debug!(
            source = %cache_key,
            width = decoded.width(),
            height = decoded.height(),
            "Loaded overlay image"
        );

        let overlay = Arc::new(decoded);
        self.cache.insert(cache_key, overlay.clone()).await;
        Ok(overlay)
    }

    async fn fetch_from_https(&self, url: &str) -> Result<Vec<u8>, WatermarkError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| WatermarkError::io("fetch overlay", e))?;

        if !response.status().is_success() {
            return Err(WatermarkError::io(
                "fetch overlay",
                format!("HTTP request failed with status: {}", response.status()),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| WatermarkError::io("read overlay body", e))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryCatalog;
    use image::{DynamicImage, ImageOutputFormat, Rgba};
    use rstest::rstest;
    use std::io::Cursor;

    fn logo_png() -> Vec<u8> {
        let logo = RgbaImage::from_pixel(6, 3, Rgba([255, 255, 255, 200]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(logo)
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn fetcher(catalog: Arc<InMemoryCatalog>) -> OverlayFetcher {
        OverlayFetcher::new(OverlayFetcherConfig::default(), catalog).unwrap()
    }

    #[rstest]
    #[case("asset:logo-1", OverlaySource::Asset("logo-1".to_string()))]
    #[case("https://cdn.example.com/logo.png", OverlaySource::Https("https://cdn.example.com/logo.png".to_string()))]
    #[case("/etc/estate/logo.png", OverlaySource::File(PathBuf::from("/etc/estate/logo.png")))]
    #[case("logo.png", OverlaySource::File(PathBuf::from("logo.png")))]
    fn test_parse_sources(#[case] input: &str, #[case] expected: OverlaySource) {
        assert_eq!(OverlaySource::parse(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("asset:")]
    #[case("http://cdn.example.com/logo.png")]
    #[case("s3://bucket/logo.png")]
    fn test_parse_rejects(#[case] input: &str) {
        assert!(matches!(
            OverlaySource::parse(input),
            Err(WatermarkError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_from_asset_store() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert_asset("logo-1", "logo.png", &logo_png(), "image/png");

        let overlay = fetcher(catalog).fetch("asset:logo-1").await.unwrap();
        assert_eq!(overlay.dimensions(), (6, 3));
    }

    #[tokio::test]
    async fn test_fetch_from_file_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logo.png");
        std::fs::write(&path, logo_png()).unwrap();
        let source = path.display().to_string();

        let fetcher = fetcher(Arc::new(InMemoryCatalog::new()));
        let first = fetcher.fetch(&source).await.unwrap();

        // Served from the cache once the file is gone
        std::fs::remove_file(&path).unwrap();
        let second = fetcher.fetch(&source).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let fetcher = fetcher(Arc::new(InMemoryCatalog::new()));
        let err = fetcher.fetch("/nonexistent/estate/logo.png").await.unwrap_err();
        assert!(matches!(err, WatermarkError::TransientIo { .. }));
    }

    #[tokio::test]
    async fn test_undecodable_overlay() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.insert_asset("broken", "logo.png", b"not a png", "image/png");

        let err = fetcher(catalog).fetch("asset:broken").await.unwrap_err();
        assert!(matches!(err, WatermarkError::MalformedImage(_)));
    }
}
