// Estate Watermark Library
// Batch watermarking of real-estate listing images held in a remote asset store

pub mod batch;
pub mod config;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod metrics;
pub mod processor;
pub mod service;
pub mod store;
pub mod vault;
pub mod watermark;

pub use error::WatermarkError;
pub use service::{ApplyRequest, ApplyResponse, StoreSet, WatermarkService};
