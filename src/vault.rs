//! Original image vault.
//!
//! Before an asset is overwritten with its watermarked version, a pristine
//! copy is uploaded to the vault folder and linked back to the live asset by
//! a [`VaultEntry`]. At most one entry exists per live asset.
//!
//! Entries written by older tooling have no `live_asset_id`; for those the
//! live id is recovered from the UUID embedded in the archived filename
//! (`original:{live_id}_{filename}`).

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use uuid::Uuid;

use crate::constants::VAULT_FILENAME_PREFIX;
use crate::error::WatermarkError;
use crate::metrics::WatermarkMetrics;
use crate::store::{AssetBlob, AssetMeta, AssetStore, UploadForm, VaultStore};

static UUID_PATTERN: OnceLock<Regex> = OnceLock::new();

fn uuid_pattern() -> &'static Regex {
    UUID_PATTERN.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("UUID pattern is valid")
    })
}

/// First UUID-shaped substring of `text`, if any
pub fn extract_uuid(text: &str) -> Option<&str> {
    uuid_pattern().find(text).map(|m| m.as_str())
}

/// Filename given to an archived original
pub fn vault_filename(live_id: &str, filename: &str) -> String {
    format!("{VAULT_FILENAME_PREFIX}{live_id}_{filename}")
}

/// Link from an archived original to the live asset it was taken from
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VaultEntry {
    pub id: String,
    /// Asset id of the archived copy
    pub original_asset_id: String,
    /// Live asset the copy was taken from; `None` on legacy rows
    #[serde(default)]
    pub live_asset_id: Option<String>,
    /// Filename of the archived copy
    pub original_filename: String,
    pub created_at: DateTime<Utc>,
}

impl VaultEntry {
    /// Live asset id from the foreign key, or from the archived filename for
    /// legacy rows
    pub fn resolve_live_id(&self) -> Option<String> {
        self.live_asset_id
            .clone()
            .or_else(|| extract_uuid(&self.original_filename).map(str::to_string))
    }
}

/// Result of [`Vault::archive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Created(VaultEntry),
    AlreadyArchived(VaultEntry),
}

impl ArchiveOutcome {
    pub fn entry(&self) -> &VaultEntry {
        match self {
            ArchiveOutcome::Created(entry) | ArchiveOutcome::AlreadyArchived(entry) => entry,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, ArchiveOutcome::Created(_))
    }
}

#[derive(Clone)]
pub struct Vault {
    assets: Arc<dyn AssetStore>,
    store: Arc<dyn VaultStore>,
    folder_name: String,
}

impl Vault {
    pub fn new(
        assets: Arc<dyn AssetStore>,
        store: Arc<dyn VaultStore>,
        folder_name: impl Into<String>,
    ) -> Self {
        Self {
            assets,
            store,
            folder_name: folder_name.into(),
        }
    }

    /// Vault entry for a live asset.
    ///
    /// Tries the foreign key first, then legacy rows whose archived filename
    /// embeds the live id.
    pub async fn lookup(&self, live_id: &str) -> Result<VaultEntry, WatermarkError> {
        if let Some(entry) = self.store.find_by_live_asset(live_id).await? {
            return Ok(entry);
        }

        let legacy = self.store.find_by_filename_fragment(live_id).await?;
        legacy
            .into_iter()
            .find(|entry| entry.resolve_live_id().as_deref() == Some(live_id))
            .ok_or_else(|| WatermarkError::not_found(format!("vault entry for asset {live_id}")))
    }

    /// Archive `source` as the pristine original of `meta`, unless an entry
    /// already exists for it.
    pub async fn archive(
        &self,
        meta: &AssetMeta,
        source: &AssetBlob,
    ) -> Result<ArchiveOutcome, WatermarkError> {
        match self.lookup(&meta.id).await {
            Ok(entry) => return Ok(ArchiveOutcome::AlreadyArchived(entry)),
            Err(WatermarkError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }

        let folder_id = self.assets.find_folder_id(&self.folder_name).await?;
        if folder_id.is_none() {
            tracing::warn!(
                folder = %self.folder_name,
                "Vault folder not found, archiving original at the store root"
            );
        }

        let original_filename = vault_filename(&meta.id, &meta.filename);
        let original_asset_id = self
            .assets
            .upload(UploadForm {
                filename: original_filename.clone(),
                mime_type: source.mime_type.clone(),
                folder_id,
                bytes: source.bytes.clone(),
            })
            .await?;

        let entry = VaultEntry {
            id: Uuid::new_v4().to_string(),
            original_asset_id,
            live_asset_id: Some(meta.id.clone()),
            original_filename,
            created_at: Utc::now(),
        };
        self.store.insert(&entry).await?;

        WatermarkMetrics::global().record_vault_archive();
        tracing::info!(
            live_asset_id = %meta.id,
            original_asset_id = %entry.original_asset_id,
            "Archived original image"
        );

        Ok(ArchiveOutcome::Created(entry))
    }

    /// Bytes of the archived original for `entry`
    pub async fn original_bytes(&self, entry: &VaultEntry) -> Result<AssetBlob, WatermarkError> {
        self.assets.fetch(&entry.original_asset_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryCatalog, InMemoryVaultStore};

    const LIVE_ID: &str = "3f2c9a1e-7b4d-4e8f-9a2b-6c1d0e5f7a38";

    fn setup() -> (Vault, Arc<InMemoryCatalog>, Arc<InMemoryVaultStore>) {
        let catalog = Arc::new(InMemoryCatalog::new());
        let store = Arc::new(InMemoryVaultStore::new());
        catalog.add_folder("Original Images", "vault-folder");
        let vault = Vault::new(catalog.clone(), store.clone(), "Original Images");
        (vault, catalog, store)
    }

    fn meta(id: &str, filename: &str) -> AssetMeta {
        AssetMeta {
            id: id.to_string(),
            filename: filename.to_string(),
            folder: None,
            watermarked: false,
        }
    }

    fn blob() -> AssetBlob {
        AssetBlob {
            bytes: bytes::Bytes::from_static(b"pristine"),
            mime_type: "image/jpeg".to_string(),
        }
    }

    #[test]
    fn test_extract_uuid() {
        let name = format!("original:{LIVE_ID}_villa.jpg");
        assert_eq!(extract_uuid(&name), Some(LIVE_ID));
        assert_eq!(extract_uuid("original:not-a-uuid_villa.jpg"), None);
    }

    #[test]
    fn test_resolve_live_id_prefers_foreign_key() {
        let entry = VaultEntry {
            id: "v1".to_string(),
            original_asset_id: "o1".to_string(),
            live_asset_id: Some("explicit".to_string()),
            original_filename: vault_filename(LIVE_ID, "villa.jpg"),
            created_at: Utc::now(),
        };
        assert_eq!(entry.resolve_live_id().as_deref(), Some("explicit"));

        let legacy = VaultEntry {
            live_asset_id: None,
            ..entry
        };
        assert_eq!(legacy.resolve_live_id().as_deref(), Some(LIVE_ID));
    }

    #[tokio::test]
    async fn test_archive_uploads_into_vault_folder() {
        let (vault, catalog, store) = setup();

        let outcome = vault.archive(&meta(LIVE_ID, "villa.jpg"), &blob()).await.unwrap();

        assert!(outcome.is_created());
        let entry = outcome.entry();
        assert_eq!(entry.live_asset_id.as_deref(), Some(LIVE_ID));
        assert_eq!(
            entry.original_filename,
            format!("original:{LIVE_ID}_villa.jpg")
        );

        let archived = catalog.meta(&entry.original_asset_id).unwrap();
        assert_eq!(archived.folder.as_deref(), Some("vault-folder"));
        assert_eq!(&catalog.blob(&entry.original_asset_id).unwrap().bytes[..], b"pristine");
        assert_eq!(store.entries().len(), 1);
    }

    #[tokio::test]
    async fn test_archive_is_at_most_once() {
        let (vault, catalog, store) = setup();
        let meta = meta(LIVE_ID, "villa.jpg");

        vault.archive(&meta, &blob()).await.unwrap();
        let second = vault.archive(&meta, &blob()).await.unwrap();

        assert!(!second.is_created());
        assert_eq!(store.entries().len(), 1);
        assert_eq!(catalog.upload_count(), 1);
    }

    #[tokio::test]
    async fn test_lookup_finds_legacy_entry() {
        let (vault, _catalog, store) = setup();
        store
            .insert(&VaultEntry {
                id: "legacy".to_string(),
                original_asset_id: "orig".to_string(),
                live_asset_id: None,
                original_filename: vault_filename(LIVE_ID, "tower.png"),
                created_at: Utc::now(),
            })
            .await
            .unwrap();

        let entry = vault.lookup(LIVE_ID).await.unwrap();
        assert_eq!(entry.id, "legacy");
    }

    #[tokio::test]
    async fn test_lookup_missing_is_not_found() {
        let (vault, _catalog, _store) = setup();
        assert!(matches!(
            vault.lookup("unknown").await,
            Err(WatermarkError::NotFound(_))
        ));
    }
}
