//! Store collaborator traits.
//!
//! The pipeline never talks to a concrete backend directly. It is handed
//! implementations of these traits: the HTTP adapters in [`http`] for
//! production and the in-memory adapters in [`memory`] for tests and dry runs.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::WatermarkError;
use crate::ledger::LedgerRow;
use crate::vault::VaultEntry;
use crate::watermark::WatermarkMarker;

pub mod http;
pub mod memory;

pub use http::HttpStore;
pub use memory::{InMemoryCatalog, InMemoryLedgerStore, InMemoryVaultStore};

/// Entity type whose rows reference images
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OwnerKind {
    Project,
    Developer,
}

impl OwnerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerKind::Project => "project",
            OwnerKind::Developer => "developer",
        }
    }
}

impl fmt::Display for OwnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary content of an asset
#[derive(Debug, Clone)]
pub struct AssetBlob {
    pub bytes: Bytes,
    pub mime_type: String,
}

/// Metadata record of an asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetMeta {
    pub id: String,
    pub filename: String,
    #[serde(default)]
    pub folder: Option<String>,
    /// Authoritative "already watermarked" flag
    #[serde(default)]
    pub watermarked: bool,
}

impl AssetMeta {
    /// Typed flag, or the filename marker for rows written before the flag
    pub fn is_watermarked(&self, marker: &WatermarkMarker) -> bool {
        self.watermarked || marker.matches(&self.filename)
    }
}

/// New asset to upload
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub filename: String,
    pub mime_type: String,
    pub folder_id: Option<String>,
    pub bytes: Bytes,
}

/// One owner row from candidate discovery.
///
/// `image_ids` holds one slot per configured image field. A slot is `None`
/// when the field is empty or its asset is already watermarked, so the row
/// shape stays stable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateRow {
    pub owner_id: String,
    pub image_ids: Vec<Option<String>>,
}

impl CandidateRow {
    /// Build a row from raw field references, blanking watermarked assets
    pub fn from_refs<I>(owner_id: impl Into<String>, refs: I, marker: &WatermarkMarker) -> Self
    where
        I: IntoIterator<Item = Option<AssetMeta>>,
    {
        let image_ids = refs
            .into_iter()
            .map(|slot| match slot {
                Some(meta) if !meta.is_watermarked(marker) && !meta.id.is_empty() => Some(meta.id),
                _ => None,
            })
            .collect();

        Self {
            owner_id: owner_id.into(),
            image_ids,
        }
    }
}

/// Binary asset storage
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Download an asset's bytes and mime type
    async fn fetch(&self, id: &str) -> Result<AssetBlob, WatermarkError>;

    /// Create a new asset, returning its id
    async fn upload(&self, form: UploadForm) -> Result<String, WatermarkError>;

    /// Replace the binary content of an existing asset
    async fn update_binary(&self, id: &str, bytes: Bytes, mime_type: &str)
        -> Result<(), WatermarkError>;

    /// Change an asset's display filename
    async fn rename(&self, id: &str, filename: &str) -> Result<(), WatermarkError>;

    /// Set the typed watermarked flag
    async fn set_watermarked(&self, id: &str) -> Result<(), WatermarkError>;

    /// Look up a folder id by its name
    async fn find_folder_id(&self, name: &str) -> Result<Option<String>, WatermarkError>;
}

/// Listing/reference queries over projects and developers
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    /// One page of owner rows ordered by owner id, with watermarked
    /// references already blanked out
    async fn fetch_candidates(
        &self,
        kind: OwnerKind,
        offset: usize,
        limit: usize,
        marker: &WatermarkMarker,
    ) -> Result<Vec<CandidateRow>, WatermarkError>;

    /// Every owner id of the given kind
    async fn owner_ids(&self, kind: OwnerKind) -> Result<Vec<String>, WatermarkError>;

    /// Assets referenced by one owner, including watermarked ones
    async fn owner_images(
        &self,
        kind: OwnerKind,
        owner_id: &str,
    ) -> Result<Vec<AssetMeta>, WatermarkError>;

    /// Current metadata of one asset
    async fn asset_meta(&self, id: &str) -> Result<AssetMeta, WatermarkError>;
}

/// Persistence for failure ledger rows
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_by_target(&self, target_id: &str) -> Result<Option<LedgerRow>, WatermarkError>;

    async fn insert(&self, row: &LedgerRow) -> Result<(), WatermarkError>;

    async fn update(&self, row: &LedgerRow) -> Result<(), WatermarkError>;

    /// Rows with `status == error && retry_count < max_retry_count`
    async fn retry_eligible(&self, max_retry_count: u32) -> Result<Vec<LedgerRow>, WatermarkError>;
}

/// Persistence for vault entries
#[async_trait]
pub trait VaultStore: Send + Sync {
    async fn find_by_live_asset(&self, live_id: &str) -> Result<Option<VaultEntry>, WatermarkError>;

    /// Legacy lookup: entries whose archived filename contains `fragment`
    async fn find_by_filename_fragment(
        &self,
        fragment: &str,
    ) -> Result<Vec<VaultEntry>, WatermarkError>;

    async fn insert(&self, entry: &VaultEntry) -> Result<(), WatermarkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(id: &str, filename: &str, watermarked: bool) -> AssetMeta {
        AssetMeta {
            id: id.to_string(),
            filename: filename.to_string(),
            folder: None,
            watermarked,
        }
    }

    #[test]
    fn test_is_watermarked_by_flag_or_marker() {
        let marker = WatermarkMarker::default();

        assert!(!meta("a", "a.jpg", false).is_watermarked(&marker));
        assert!(meta("a", "a.jpg", true).is_watermarked(&marker));
        assert!(meta("a", "a_watermarked.jpg", false).is_watermarked(&marker));
    }

    #[test]
    fn test_candidate_row_keeps_shape() {
        let marker = WatermarkMarker::default();
        let row = CandidateRow::from_refs(
            "p1",
            vec![
                Some(meta("img1", "cover.jpg", false)),
                Some(meta("img2", "plan_watermarked.jpg", false)),
                None,
                Some(meta("img3", "logo.png", true)),
            ],
            &marker,
        );

        assert_eq!(row.owner_id, "p1");
        assert_eq!(
            row.image_ids,
            vec![Some("img1".to_string()), None, None, None]
        );
    }

    #[test]
    fn test_owner_kind_display() {
        assert_eq!(OwnerKind::Project.to_string(), "project");
        assert_eq!(OwnerKind::Developer.as_str(), "developer");
    }
}
