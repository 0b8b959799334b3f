//! Public entry points of the watermark pipeline.
//!
//! Bulk operations are fire-and-track: individual image failures are written
//! to the failure ledger and never fail the call. Only orchestration
//! failures (listing owners, reading the ledger) surface as errors.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::batch::{discover_all, run_bounded, BatchReport};
use crate::config::{BatchConfig, Config, StoreConfig};
use crate::error::WatermarkError;
use crate::ledger::{FailureLedger, SweepSummary};
use crate::processor::ImageProcessor;
use crate::store::{
    AssetStore, HttpStore, InMemoryCatalog, InMemoryLedgerStore, InMemoryVaultStore, LedgerStore,
    OwnerKind, ReferenceStore, VaultStore,
};
use crate::vault::Vault;
use crate::watermark::{OverlayFetcher, WatermarkMarker};

pub const APPLY_SUCCESS_MESSAGE: &str = "Images watermarked successfully";
pub const RETRY_SUCCESS_MESSAGE: &str = "Failed watermarks processed successfully";
pub const REGENERATE_SUCCESS_MESSAGE: &str = "Images regenerated successfully";

/// Which owners and images to watermark.
///
/// When every list is absent or empty, all projects and developers are
/// processed.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyRequest {
    #[serde(default)]
    pub project_ids: Option<Vec<String>>,
    #[serde(default)]
    pub developer_ids: Option<Vec<String>>,
    #[serde(default)]
    pub image_ids: Option<Vec<String>>,
}

impl ApplyRequest {
    pub fn is_empty(&self) -> bool {
        [&self.project_ids, &self.developer_ids, &self.image_ids]
            .iter()
            .all(|ids| match ids {
                Some(ids) => ids.is_empty(),
                None => true,
            })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApplyResponse {
    pub message: String,
}

impl ApplyResponse {
    fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

/// The four store collaborators the service runs against
#[derive(Clone)]
pub struct StoreSet {
    pub assets: Arc<dyn AssetStore>,
    pub references: Arc<dyn ReferenceStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub vault: Arc<dyn VaultStore>,
}

impl StoreSet {
    /// One HTTP client shared by every store trait
    pub fn http(config: &StoreConfig) -> Result<Self, WatermarkError> {
        let store = Arc::new(HttpStore::new(config)?);
        Ok(Self {
            assets: store.clone(),
            references: store.clone(),
            ledger: store.clone(),
            vault: store,
        })
    }

    pub fn in_memory(
        catalog: Arc<InMemoryCatalog>,
        ledger: Arc<InMemoryLedgerStore>,
        vault: Arc<InMemoryVaultStore>,
    ) -> Self {
        Self {
            assets: catalog.clone(),
            references: catalog,
            ledger,
            vault,
        }
    }
}

#[derive(Clone)]
pub struct WatermarkService {
    processor: ImageProcessor,
    references: Arc<dyn ReferenceStore>,
    ledger: FailureLedger,
    batch: BatchConfig,
    marker: WatermarkMarker,
}

impl WatermarkService {
    pub fn new(
        processor: ImageProcessor,
        references: Arc<dyn ReferenceStore>,
        ledger: FailureLedger,
        batch: BatchConfig,
    ) -> Self {
        let marker = processor.marker().clone();
        Self {
            processor,
            references,
            ledger,
            batch,
            marker,
        }
    }

    /// Wire the pipeline from configuration and a set of stores
    pub fn from_stores(stores: StoreSet, config: &Config) -> Result<Self, WatermarkError> {
        let vault = Vault::new(
            stores.assets.clone(),
            stores.vault,
            config.watermark.vault_folder.clone(),
        );
        let overlay = OverlayFetcher::new(
            config.watermark.overlay_fetcher_config(),
            stores.assets.clone(),
        )?;
        let processor = ImageProcessor::new(
            stores.assets,
            stores.references.clone(),
            vault,
            overlay,
            &config.watermark,
        );
        let ledger = FailureLedger::new(stores.ledger, config.batch.max_retry_count);

        Ok(Self::new(
            processor,
            stores.references,
            ledger,
            config.batch.clone(),
        ))
    }

    pub fn processor(&self) -> &ImageProcessor {
        &self.processor
    }

    /// Watermark the requested owners and images.
    ///
    /// Projects, developers and loose images run as three independent
    /// bounded pools at the same time.
    pub async fn apply_watermark(
        &self,
        request: ApplyRequest,
    ) -> Result<ApplyResponse, WatermarkError> {
        let (project_ids, developer_ids, image_ids) = if request.is_empty() {
            let (projects, developers) = futures::try_join!(
                self.list_owners(OwnerKind::Project),
                self.list_owners(OwnerKind::Developer),
            )?;
            (projects, developers, Vec::new())
        } else {
            (
                request.project_ids.unwrap_or_default(),
                request.developer_ids.unwrap_or_default(),
                request.image_ids.unwrap_or_default(),
            )
        };

        tracing::info!(
            projects = project_ids.len(),
            developers = developer_ids.len(),
            images = image_ids.len(),
            concurrency_limit = self.batch.concurrency_limit,
            "Applying watermarks"
        );

        let (projects, developers, images) = tokio::join!(
            self.run_owners(OwnerKind::Project, project_ids),
            self.run_owners(OwnerKind::Developer, developer_ids),
            self.run_images(image_ids),
        );

        log_report("projects", &projects);
        log_report("developers", &developers);
        log_report("images", &images);

        Ok(ApplyResponse::new(APPLY_SUCCESS_MESSAGE))
    }

    /// Re-drive every retry-eligible ledger row once.
    pub async fn process_failed_watermarks(&self) -> Result<ApplyResponse, WatermarkError> {
        self.sweep_failed().await?;
        Ok(ApplyResponse::new(RETRY_SUCCESS_MESSAGE))
    }

    /// Same as [`WatermarkService::process_failed_watermarks`], returning the
    /// sweep counts.
    pub async fn sweep_failed(&self) -> Result<SweepSummary, WatermarkError> {
        self.ledger
            .sweep(self.batch.concurrency_limit, |image_id| async move {
                self.processor.process(&image_id, true).await.map(|_| ())
            })
            .await
    }

    /// Ids of referenced images that still need a watermark.
    pub async fn pending_watermark_ids(&self) -> Result<Vec<String>, WatermarkError> {
        discover_all(self.references.as_ref(), self.batch.page_size, &self.marker).await
    }

    /// Re-render images from their vaulted originals.
    pub async fn regenerate(&self, image_ids: Vec<String>) -> Result<ApplyResponse, WatermarkError> {
        let report = run_bounded(image_ids, self.batch.concurrency_limit, |image_id| async move {
            match self.processor.regenerate(&image_id).await {
                Ok(_) => Ok(()),
                Err(err) => {
                    self.ledger.record_failure_logged(&image_id, &err).await;
                    Err(err)
                }
            }
        })
        .await;

        log_report("regenerate", &report);
        Ok(ApplyResponse::new(REGENERATE_SUCCESS_MESSAGE))
    }

    async fn list_owners(&self, kind: OwnerKind) -> Result<Vec<String>, WatermarkError> {
        self.references
            .owner_ids(kind)
            .await
            .map_err(|e| WatermarkError::Internal(format!("failed to list {kind} ids: {e}")))
    }

    async fn run_owners(&self, kind: OwnerKind, owner_ids: Vec<String>) -> BatchReport<String> {
        run_bounded(owner_ids, self.batch.concurrency_limit, |owner_id| async move {
            self.process_owner(kind, &owner_id).await
        })
        .await
    }

    /// Process an owner's images one after another.
    ///
    /// Image failures go to the ledger. A failure to list the owner's images
    /// is only logged; there is no image id to record it against.
    async fn process_owner(&self, kind: OwnerKind, owner_id: &str) -> Result<(), WatermarkError> {
        let images = match self.references.owner_images(kind, owner_id).await {
            Ok(images) => images,
            Err(err) => {
                tracing::warn!(
                    kind = %kind,
                    owner_id = %owner_id,
                    error = %err,
                    "Failed to list owner images"
                );
                return Err(err);
            }
        };

        let pending: Vec<_> = images
            .into_iter()
            .filter(|meta| !meta.is_watermarked(&self.marker))
            .collect();
        let total = pending.len();
        let mut failed = 0;

        for meta in pending {
            if let Err(err) = self.processor.process(&meta.id, true).await {
                self.ledger.record_failure_logged(&meta.id, &err).await;
                failed += 1;
            }
        }

        if failed > 0 {
            return Err(WatermarkError::Internal(format!(
                "{failed} of {total} images failed for {kind} {owner_id}"
            )));
        }
        Ok(())
    }

    async fn run_images(&self, image_ids: Vec<String>) -> BatchReport<String> {
        run_bounded(image_ids, self.batch.concurrency_limit, |image_id| async move {
            match self.processor.process(&image_id, true).await {
                Ok(_) => Ok(()),
                Err(err) => {
                    self.ledger.record_failure_logged(&image_id, &err).await;
                    Err(err)
                }
            }
        })
        .await
    }
}

fn log_report(group: &str, report: &BatchReport<String>) {
    if report.is_empty() {
        return;
    }

    for (item, err) in report.failures() {
        tracing::warn!(group, item = %item, error = %err, "Batch item failed");
    }
    tracing::info!(
        group,
        total = report.len(),
        succeeded = report.succeeded(),
        failed = report.failed(),
        "Batch finished"
    );
}
