//! Asset store connection configuration.
//!
//! Describes how to reach the headless-CMS style REST API that owns the
//! images, and which collections/fields hold the project and developer
//! image references.
//!
//! Default values are sourced from `crate::constants`.

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_STORE_TIMEOUT_SECS;

fn default_timeout_secs() -> u64 {
    DEFAULT_STORE_TIMEOUT_SECS
}

fn default_projects() -> OwnerCollectionConfig {
    OwnerCollectionConfig {
        collection: "projects".to_string(),
        image_fields: vec![
            "cover_image".to_string(),
            "master_plan".to_string(),
            "brochure_image".to_string(),
        ],
    }
}

fn default_developers() -> OwnerCollectionConfig {
    OwnerCollectionConfig {
        collection: "developers".to_string(),
        image_fields: vec!["logo".to_string(), "cover_image".to_string()],
    }
}

fn default_ledger_collection() -> String {
    "watermark_logs".to_string()
}

fn default_vault_collection() -> String {
    "original_images".to_string()
}

/// A collection whose rows reference images through file fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OwnerCollectionConfig {
    /// Collection name, e.g. `projects`
    pub collection: String,
    /// Single-file reference fields on each row
    pub image_fields: Vec<String>,
}

/// Asset store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the store API, without trailing slash
    pub base_url: String,
    /// Static bearer token
    #[serde(default, skip_serializing)]
    pub token: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_projects")]
    pub projects: OwnerCollectionConfig,
    #[serde(default = "default_developers")]
    pub developers: OwnerCollectionConfig,
    /// Collection holding failure ledger rows
    #[serde(default = "default_ledger_collection")]
    pub ledger_collection: String,
    /// Collection holding vault entries
    #[serde(default = "default_vault_collection")]
    pub vault_collection: String,
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), String> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(format!(
                "store.base_url '{}' must start with http:// or https://",
                self.base_url
            ));
        }
        if self.timeout_secs == 0 {
            return Err("store.timeout_secs must be > 0".to_string());
        }
        for owner in [&self.projects, &self.developers] {
            if owner.collection.trim().is_empty() {
                return Err("Owner collection name cannot be empty".to_string());
            }
            if owner.image_fields.is_empty() {
                return Err(format!(
                    "Collection '{}' must list at least one image field",
                    owner.collection
                ));
            }
        }
        if self.ledger_collection.trim().is_empty() || self.vault_collection.trim().is_empty() {
            return Err("Ledger and vault collection names cannot be empty".to_string());
        }
        Ok(())
    }
}
