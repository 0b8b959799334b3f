// Test harness for integration tests
// Wires a WatermarkService over the in-memory stores with a temporary work dir

use estate_watermark::config::Config;
use estate_watermark::store::{InMemoryCatalog, InMemoryLedgerStore, InMemoryVaultStore};
use estate_watermark::{StoreSet, WatermarkService};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;
use tempfile::TempDir;

pub const OVERLAY_ID: &str = "company-logo";
pub const VAULT_FOLDER_ID: &str = "folder-originals";

/// Service plus handles on its stores
pub struct PipelineHarness {
    pub service: WatermarkService,
    pub catalog: Arc<InMemoryCatalog>,
    pub ledger: Arc<InMemoryLedgerStore>,
    pub vault: Arc<InMemoryVaultStore>,
    pub work_dir: TempDir,
}

impl PipelineHarness {
    pub fn new() -> Self {
        Self::with_yaml("")
    }

    /// Extra YAML is appended under the `batch:` section
    pub fn with_batch_yaml(batch: &str) -> Self {
        Self::with_yaml(&format!("batch:\n{batch}"))
    }

    fn with_yaml(extra: &str) -> Self {
        let work_dir = tempfile::tempdir().expect("Failed to create work dir");
        let yaml = format!(
            r#"
store:
  base_url: https://cms.example.test
watermark:
  overlay: "asset:{OVERLAY_ID}"
  work_dir: "{}"
{extra}
"#,
            work_dir.path().display()
        );
        let config = Config::from_yaml_with_env(&yaml).expect("Failed to parse test config");
        config.validate().expect("Test config is invalid");

        let catalog = Arc::new(InMemoryCatalog::new());
        let ledger = Arc::new(InMemoryLedgerStore::new());
        let vault = Arc::new(InMemoryVaultStore::new());

        catalog.insert_asset(OVERLAY_ID, "logo.png", &png_bytes(40, 16, [255, 255, 255, 230]), "image/png");
        catalog.add_folder(&config.watermark.vault_folder, VAULT_FOLDER_ID);

        let stores = StoreSet::in_memory(catalog.clone(), ledger.clone(), vault.clone());
        let service = WatermarkService::from_stores(stores, &config).expect("Failed to build service");

        Self {
            service,
            catalog,
            ledger,
            vault,
            work_dir,
        }
    }

    /// Add a listing photo
    pub fn add_photo(&self, id: &str, filename: &str) {
        self.catalog
            .insert_asset(id, filename, &png_bytes(96, 64, [60, 120, 180, 255]), "image/png");
    }

    pub fn work_dir_is_empty(&self) -> bool {
        std::fs::read_dir(self.work_dir.path())
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(true)
    }
}

pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
        .write_to(&mut buffer, ImageFormat::Png)
        .expect("Failed to encode test PNG");
    buffer.into_inner()
}
