//! Batch execution: bounded fan-out and candidate discovery.

pub mod discovery;
pub mod pool;

pub use discovery::{discover_all, discover_kind, fetch_all_pages, flatten_unique};
pub use pool::{run_bounded, BatchReport};
