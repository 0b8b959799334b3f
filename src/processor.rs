//! Per-image processing.
//!
//! `process` archives the original (when asked), renders the watermark,
//! round-trips the encoded bytes through a temporary artifact in the work
//! directory, overwrites the live asset and marks it as watermarked.
//!
//! `regenerate` re-renders from the vaulted original when one exists, so
//! an image is never watermarked on top of an existing watermark.

use bytes::Bytes;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::WatermarkConfig;
use crate::error::WatermarkError;
use crate::metrics::WatermarkMetrics;
use crate::store::{AssetMeta, AssetStore, ReferenceStore};
use crate::vault::{ArchiveOutcome, Vault, VaultEntry};
use crate::watermark::{
    encode_under_ceiling, Compositor, EncodedJpeg, JpegQualityEncoder, OverlayFetcher,
    QualityEncoder, WatermarkMarker,
};

const OUTPUT_MIME_TYPE: &str = "image/jpeg";

/// Which bytes the watermark was rendered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderSource {
    /// The live asset's current content
    Live,
    /// The pristine copy held in the vault
    Vault,
    /// Nothing rendered: the asset already carries a watermark and the
    /// vault holds no original for it
    Skipped,
}

/// Result of processing one image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub image_id: String,
    pub source: RenderSource,
    /// JPEG quality of the uploaded output
    pub quality: u8,
    pub size: usize,
    /// Whether an original was archived during this call
    pub archived: bool,
    /// Whether the filename was changed to carry the marker
    pub renamed: bool,
}

impl ProcessOutcome {
    fn skipped(image_id: &str) -> Self {
        Self {
            image_id: image_id.to_string(),
            source: RenderSource::Skipped,
            quality: 0,
            size: 0,
            archived: false,
            renamed: false,
        }
    }
}

#[derive(Clone)]
pub struct ImageProcessor {
    assets: Arc<dyn AssetStore>,
    references: Arc<dyn ReferenceStore>,
    vault: Vault,
    overlay: OverlayFetcher,
    overlay_source: String,
    compositor: Compositor,
    encoder: Arc<dyn QualityEncoder>,
    marker: WatermarkMarker,
    size_ceiling: usize,
    work_dir: PathBuf,
}

impl ImageProcessor {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        references: Arc<dyn ReferenceStore>,
        vault: Vault,
        overlay: OverlayFetcher,
        config: &WatermarkConfig,
    ) -> Self {
        Self {
            assets,
            references,
            vault,
            overlay,
            overlay_source: config.overlay.clone(),
            compositor: Compositor::default(),
            encoder: Arc::new(JpegQualityEncoder),
            marker: config.marker(),
            size_ceiling: config.size_ceiling_bytes,
            work_dir: config.work_dir.clone(),
        }
    }

    /// Replace the encoder backend
    pub fn with_encoder(mut self, encoder: Arc<dyn QualityEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn marker(&self) -> &WatermarkMarker {
        &self.marker
    }

    /// Watermark one image in place.
    ///
    /// When the vault already holds an original, the watermark is rendered
    /// from it. Otherwise, with `preserve_original`, the current content is
    /// archived first. An asset that is already watermarked and has no
    /// vaulted original is left untouched.
    pub async fn process(
        &self,
        image_id: &str,
        preserve_original: bool,
    ) -> Result<ProcessOutcome, WatermarkError> {
        let metrics = WatermarkMetrics::global();
        let timer = metrics.start_timer("process");

        let result = self.process_live(image_id, preserve_original).await;

        timer.observe_duration();
        metrics.record_image(match &result {
            Ok(outcome) if outcome.source == RenderSource::Skipped => "skipped",
            Ok(_) => "watermarked",
            Err(_) => "failed",
        });
        result
    }

    async fn process_live(
        &self,
        image_id: &str,
        preserve_original: bool,
    ) -> Result<ProcessOutcome, WatermarkError> {
        let meta = self.references.asset_meta(image_id).await?;

        let vaulted = match self.vault.lookup(image_id).await {
            Ok(entry) => Some(entry),
            Err(WatermarkError::NotFound(_)) => None,
            Err(err) => return Err(err),
        };

        let (source, bytes, archived) = match vaulted {
            Some(entry) => {
                let original = self.vault.original_bytes(&entry).await?;
                (RenderSource::Vault, original.bytes, false)
            }
            // No clean copy exists anywhere, so leave the live asset alone
            None if meta.is_watermarked(&self.marker) => {
                tracing::info!(
                    image_id = %image_id,
                    filename = %meta.filename,
                    "Image already watermarked and no original is vaulted, skipping"
                );
                return Ok(ProcessOutcome::skipped(image_id));
            }
            None => {
                let live = self.assets.fetch(image_id).await?;
                if !preserve_original {
                    (RenderSource::Live, live.bytes, false)
                } else {
                    match self.vault.archive(&meta, &live).await? {
                        ArchiveOutcome::Created(_) => (RenderSource::Live, live.bytes, true),
                        ArchiveOutcome::AlreadyArchived(entry) => {
                            let original = self.vault.original_bytes(&entry).await?;
                            (RenderSource::Vault, original.bytes, false)
                        }
                    }
                }
            }
        };

        let encoded = self.render(bytes).await?;
        let renamed = self.publish(&meta, &encoded).await?;

        tracing::info!(
            image_id = %image_id,
            quality = encoded.quality,
            size = encoded.len(),
            archived,
            renamed,
            "Watermarked image"
        );

        Ok(ProcessOutcome {
            image_id: image_id.to_string(),
            source,
            quality: encoded.quality,
            size: encoded.len(),
            archived,
            renamed,
        })
    }

    /// Re-render an image from its vaulted original.
    ///
    /// Falls back to [`ImageProcessor::process`] on the live asset when the
    /// vault has no entry for it. The vault path never writes to the vault.
    pub async fn regenerate(&self, image_id: &str) -> Result<ProcessOutcome, WatermarkError> {
        let entry = match self.vault.lookup(image_id).await {
            Ok(entry) => entry,
            Err(WatermarkError::NotFound(_)) => {
                tracing::info!(
                    image_id = %image_id,
                    "No vaulted original, processing live asset"
                );
                return self.process(image_id, true).await;
            }
            Err(err) => return Err(err),
        };

        let metrics = WatermarkMetrics::global();
        let timer = metrics.start_timer("regenerate");

        let result = self.regenerate_from_vault(image_id, &entry).await;

        timer.observe_duration();
        metrics.record_image(if result.is_ok() { "regenerated" } else { "failed" });
        result
    }

    async fn regenerate_from_vault(
        &self,
        image_id: &str,
        entry: &VaultEntry,
    ) -> Result<ProcessOutcome, WatermarkError> {
        let live_id = entry
            .resolve_live_id()
            .unwrap_or_else(|| image_id.to_string());
        let meta = self.references.asset_meta(&live_id).await?;
        let original = self.vault.original_bytes(entry).await?;

        let encoded = self.render(original.bytes).await?;
        let renamed = self.publish(&meta, &encoded).await?;

        tracing::info!(
            image_id = %live_id,
            original_asset_id = %entry.original_asset_id,
            quality = encoded.quality,
            "Regenerated watermark from vaulted original"
        );

        Ok(ProcessOutcome {
            image_id: live_id,
            source: RenderSource::Vault,
            quality: encoded.quality,
            size: encoded.len(),
            archived: false,
            renamed,
        })
    }

    /// Composite and encode on the blocking pool.
    async fn render(&self, source: Bytes) -> Result<EncodedJpeg, WatermarkError> {
        let overlay = self.overlay.fetch(&self.overlay_source).await?;
        let compositor = self.compositor;
        let encoder = self.encoder.clone();
        let ceiling = self.size_ceiling;

        let encoded = tokio::task::spawn_blocking(move || {
            let composited = compositor.composite(&source, &overlay)?;
            encode_under_ceiling(encoder.as_ref(), &composited, ceiling)
        })
        .await
        .map_err(|e| WatermarkError::Internal(format!("render task failed: {e}")))??;

        WatermarkMetrics::global().record_jpeg_quality(encoded.quality);
        Ok(encoded)
    }

    /// Upload `encoded` over the live asset, then rename and flag it.
    ///
    /// Returns whether the filename changed.
    async fn publish(&self, meta: &AssetMeta, encoded: &EncodedJpeg) -> Result<bool, WatermarkError> {
        let artifact = TempArtifact::write(&self.work_dir, &encoded.data).await?;
        let uploaded = self.upload_artifact(&meta.id, &artifact).await;
        artifact.remove().await;
        uploaded?;

        let renamed = match self.marker.apply(&meta.filename) {
            Some(filename) => {
                self.assets.rename(&meta.id, &filename).await?;
                true
            }
            None => false,
        };
        self.assets.set_watermarked(&meta.id).await?;

        Ok(renamed)
    }

    async fn upload_artifact(
        &self,
        image_id: &str,
        artifact: &TempArtifact,
    ) -> Result<(), WatermarkError> {
        let bytes = artifact.read().await?;
        self.assets
            .update_binary(image_id, Bytes::from(bytes), OUTPUT_MIME_TYPE)
            .await
    }
}

/// Encoded output staged on disk before upload
struct TempArtifact {
    path: PathBuf,
}

impl TempArtifact {
    async fn write(dir: &Path, data: &[u8]) -> Result<Self, WatermarkError> {
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| WatermarkError::io(format!("create work dir {}", dir.display()), e))?;

        let artifact = Self {
            path: dir.join(format!("{}.jpg", Uuid::new_v4())),
        };

        if let Err(e) = tokio::fs::write(&artifact.path, data).await {
            artifact.remove().await;
            return Err(WatermarkError::io("write temporary artifact", e));
        }
        Ok(artifact)
    }

    async fn read(&self) -> Result<Vec<u8>, WatermarkError> {
        tokio::fs::read(&self.path)
            .await
            .map_err(|e| WatermarkError::io("read temporary artifact", e))
    }

    async fn remove(self) {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove temporary artifact"
            ),
        }
    }
}
