//! In-memory store adapters.
//!
//! Used by the test suite and for dry runs. Failure injection hooks let
//! tests make individual asset operations fail.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::{
    AssetBlob, AssetMeta, AssetStore, CandidateRow, LedgerStore, OwnerKind, ReferenceStore,
    UploadForm, VaultStore,
};
use crate::error::WatermarkError;
use crate::ledger::{LedgerRow, LedgerStatus};
use crate::vault::VaultEntry;
use crate::watermark::WatermarkMarker;

#[derive(Debug, Clone)]
struct StoredAsset {
    meta: AssetMeta,
    blob: AssetBlob,
}

#[derive(Debug, Default)]
struct CatalogState {
    assets: BTreeMap<String, StoredAsset>,
    folders: HashMap<String, String>,
    owners: BTreeMap<(OwnerKind, String), Vec<Option<String>>>,
    failing_fetch: HashSet<String>,
    failing_update: HashSet<String>,
    uploads: usize,
    binary_updates: usize,
    next_id: u64,
}

/// Assets, folders and owner references held in memory.
///
/// Implements both [`AssetStore`] and [`ReferenceStore`] over the same data.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_asset(&self, id: &str, filename: &str, bytes: &[u8], mime_type: &str) {
        let asset = StoredAsset {
            meta: AssetMeta {
                id: id.to_string(),
                filename: filename.to_string(),
                folder: None,
                watermarked: false,
            },
            blob: AssetBlob {
                bytes: Bytes::copy_from_slice(bytes),
                mime_type: mime_type.to_string(),
            },
        };
        self.state.lock().assets.insert(id.to_string(), asset);
    }

    pub fn set_flag(&self, id: &str, watermarked: bool) {
        if let Some(asset) = self.state.lock().assets.get_mut(id) {
            asset.meta.watermarked = watermarked;
        }
    }

    pub fn add_folder(&self, name: &str, id: &str) {
        self.state
            .lock()
            .folders
            .insert(name.to_string(), id.to_string());
    }

    /// Register an owner row; each slot is one image field
    pub fn add_owner(&self, kind: OwnerKind, owner_id: &str, image_ids: &[Option<&str>]) {
        let slots = image_ids.iter().map(|id| id.map(str::to_string)).collect();
        self.state
            .lock()
            .owners
            .insert((kind, owner_id.to_string()), slots);
    }

    /// Make `fetch` fail for this asset until cleared
    pub fn fail_fetch(&self, id: &str) {
        self.state.lock().failing_fetch.insert(id.to_string());
    }

    /// Make `update_binary` fail for this asset until cleared
    pub fn fail_update(&self, id: &str) {
        self.state.lock().failing_update.insert(id.to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_fetch.clear();
        state.failing_update.clear();
    }

    pub fn meta(&self, id: &str) -> Option<AssetMeta> {
        self.state.lock().assets.get(id).map(|a| a.meta.clone())
    }

    pub fn blob(&self, id: &str) -> Option<AssetBlob> {
        self.state.lock().assets.get(id).map(|a| a.blob.clone())
    }

    pub fn upload_count(&self) -> usize {
        self.state.lock().uploads
    }

    pub fn binary_update_count(&self) -> usize {
        self.state.lock().binary_updates
    }
}

#[async_trait]
impl AssetStore for InMemoryCatalog {
    async fn fetch(&self, id: &str) -> Result<AssetBlob, WatermarkError> {
        let state = self.state.lock();
        if state.failing_fetch.contains(id) {
            return Err(WatermarkError::io(
                format!("fetch asset {id}"),
                "injected failure",
            ));
        }
        state
            .assets
            .get(id)
            .map(|a| a.blob.clone())
            .ok_or_else(|| WatermarkError::not_found(format!("asset {id}")))
    }

    async fn upload(&self, form: UploadForm) -> Result<String, WatermarkError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        state.uploads += 1;
        let id = format!("uploaded-{}", state.next_id);
        state.assets.insert(
            id.clone(),
            StoredAsset {
                meta: AssetMeta {
                    id: id.clone(),
                    filename: form.filename,
                    folder: form.folder_id,
                    watermarked: false,
                },
                blob: AssetBlob {
                    bytes: form.bytes,
                    mime_type: form.mime_type,
                },
            },
        );
        Ok(id)
    }

    async fn update_binary(
        &self,
        id: &str,
        bytes: Bytes,
        mime_type: &str,
    ) -> Result<(), WatermarkError> {
        let mut state = self.state.lock();
        if state.failing_update.contains(id) {
            return Err(WatermarkError::io(
                format!("update asset {id}"),
                "injected failure",
            ));
        }
        let asset = state
            .assets
            .get_mut(id)
            .ok_or_else(|| WatermarkError::not_found(format!("asset {id}")))?;
        asset.blob = AssetBlob {
            bytes,
            mime_type: mime_type.to_string(),
        };
        state.binary_updates += 1;
        Ok(())
    }

    async fn rename(&self, id: &str, filename: &str) -> Result<(), WatermarkError> {
        let mut state = self.state.lock();
        let asset = state
            .assets
            .get_mut(id)
            .ok_or_else(|| WatermarkError::not_found(format!("asset {id}")))?;
        asset.meta.filename = filename.to_string();
        Ok(())
    }

    async fn set_watermarked(&self, id: &str) -> Result<(), WatermarkError> {
        let mut state = self.state.lock();
        let asset = state
            .assets
            .get_mut(id)
            .ok_or_else(|| WatermarkError::not_found(format!("asset {id}")))?;
        asset.meta.watermarked = true;
        Ok(())
    }

    async fn find_folder_id(&self, name: &str) -> Result<Option<String>, WatermarkError> {
        Ok(self.state.lock().folders.get(name).cloned())
    }
}

#[async_trait]
impl ReferenceStore for InMemoryCatalog {
    async fn fetch_candidates(
        &self,
        kind: OwnerKind,
        offset: usize,
        limit: usize,
        marker: &WatermarkMarker,
    ) -> Result<Vec<CandidateRow>, WatermarkError> {
        let state = self.state.lock();
        let rows = state
            .owners
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .skip(offset)
            .take(limit)
            .map(|((_, owner_id), slots)| {
                let refs = slots.iter().map(|slot| {
                    slot.as_ref()
                        .and_then(|id| state.assets.get(id))
                        .map(|a| a.meta.clone())
                });
                CandidateRow::from_refs(owner_id.clone(), refs, marker)
            })
            .collect();
        Ok(rows)
    }

    async fn owner_ids(&self, kind: OwnerKind) -> Result<Vec<String>, WatermarkError> {
        Ok(self
            .state
            .lock()
            .owners
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, id)| id.clone())
            .collect())
    }

    async fn owner_images(
        &self,
        kind: OwnerKind,
        owner_id: &str,
    ) -> Result<Vec<AssetMeta>, WatermarkError> {
        let state = self.state.lock();
        let slots = state
            .owners
            .get(&(kind, owner_id.to_string()))
            .ok_or_else(|| WatermarkError::not_found(format!("{kind} {owner_id}")))?;
        Ok(slots
            .iter()
            .flatten()
            .filter_map(|id| state.assets.get(id))
            .map(|a| a.meta.clone())
            .collect())
    }

    async fn asset_meta(&self, id: &str) -> Result<AssetMeta, WatermarkError> {
        self.meta(id)
            .ok_or_else(|| WatermarkError::not_found(format!("asset {id}")))
    }
}

/// Ledger rows held in memory, keyed by row id
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    rows: Mutex<BTreeMap<String, LedgerRow>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<LedgerRow> {
        self.rows.lock().values().cloned().collect()
    }

    pub fn row_for(&self, target_id: &str) -> Option<LedgerRow> {
        self.rows
            .lock()
            .values()
            .find(|row| row.target_id == target_id)
            .cloned()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_by_target(&self, target_id: &str) -> Result<Option<LedgerRow>, WatermarkError> {
        Ok(self.row_for(target_id))
    }

    async fn insert(&self, row: &LedgerRow) -> Result<(), WatermarkError> {
        self.rows.lock().insert(row.id.clone(), row.clone());
        Ok(())
    }

    async fn update(&self, row: &LedgerRow) -> Result<(), WatermarkError> {
        let mut rows = self.rows.lock();
        match rows.get_mut(&row.id) {
            Some(existing) => {
                *existing = row.clone();
                Ok(())
            }
            None => Err(WatermarkError::not_found(format!("ledger row {}", row.id))),
        }
    }

    async fn retry_eligible(&self, max_retry_count: u32) -> Result<Vec<LedgerRow>, WatermarkError> {
        Ok(self
            .rows
            .lock()
            .values()
            .filter(|row| row.status == LedgerStatus::Error && row.retry_count < max_retry_count)
            .cloned()
            .collect())
    }
}

/// Vault entries held in memory
#[derive(Debug, Default)]
pub struct InMemoryVaultStore {
    entries: Mutex<Vec<VaultEntry>>,
}

impl InMemoryVaultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<VaultEntry> {
        self.entries.lock().clone()
    }
}

#[async_trait]
impl VaultStore for InMemoryVaultStore {
    async fn find_by_live_asset(&self, live_id: &str) -> Result<Option<VaultEntry>, WatermarkError> {
        Ok(self
            .entries
            .lock()
            .iter()
            .find(|e| e.live_asset_id.as_deref() == Some(live_id))
            .cloned())
    }

    async fn find_by_filename_fragment(
        &self,
        fragment: &str,
    ) -> Result<Vec<VaultEntry>, WatermarkError> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|e| e.original_filename.contains(fragment))
            .cloned()
            .collect())
    }

    async fn insert(&self, entry: &VaultEntry) -> Result<(), WatermarkError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}
