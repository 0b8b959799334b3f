//! Batch execution configuration.
//!
//! Default values for concurrency, retry cap and page size are sourced from
//! `crate::constants`.

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CONCURRENCY_LIMIT, DEFAULT_MAX_RETRY_COUNT, DEFAULT_PAGE_SIZE};

fn default_concurrency_limit() -> usize {
    DEFAULT_CONCURRENCY_LIMIT
}

fn default_max_retry_count() -> u32 {
    DEFAULT_MAX_RETRY_COUNT
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Batch configuration (YAML format)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Maximum in-flight tasks per pool (default: 5)
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
    /// Sweep attempts before a failed item is left for manual handling (default: 3)
    #[serde(default = "default_max_retry_count")]
    pub max_retry_count: u32,
    /// Candidate discovery page size (default: 100)
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            max_retry_count: DEFAULT_MAX_RETRY_COUNT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency_limit == 0 {
            return Err("batch.concurrency_limit must be >= 1".to_string());
        }
        if self.page_size == 0 {
            return Err("batch.page_size must be >= 1".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_config_defaults() {
        let config: BatchConfig = serde_yaml::from_str("{}").unwrap();

        assert_eq!(config.concurrency_limit, DEFAULT_CONCURRENCY_LIMIT);
        assert_eq!(config.max_retry_count, DEFAULT_MAX_RETRY_COUNT);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_batch_config_partial_values() {
        let yaml = r#"
concurrency_limit: 10
"#;
        let config: BatchConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.concurrency_limit, 10);
        assert_eq!(config.max_retry_count, DEFAULT_MAX_RETRY_COUNT);
    }

    #[test]
    fn test_batch_config_rejects_zero_limit() {
        let config = BatchConfig {
            concurrency_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
