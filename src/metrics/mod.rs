// Watermark pipeline Prometheus metrics
//
// Counters for processed images, retry sweeps and vault archives, plus
// histograms for the JPEG quality reached and per-image processing time.

use prometheus::{
    register_histogram, register_histogram_vec, register_int_counter, register_int_counter_vec,
    Encoder, Histogram, HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;
use std::time::Instant;

/// Global metrics for the watermark pipeline
pub struct WatermarkMetrics {
    /// Images processed, by outcome (watermarked, regenerated, skipped, failed)
    pub images: IntCounterVec,

    /// Ledger retries, by outcome (completed, failed, exhausted)
    pub retries: IntCounterVec,

    /// Originals uploaded to the vault
    pub vault_archives: IntCounter,

    /// JPEG quality at which the encoded image first fit under the ceiling
    pub jpeg_quality: Histogram,

    /// Per-image processing duration in seconds, by operation
    pub processing_duration: HistogramVec,
}

static METRICS: OnceLock<WatermarkMetrics> = OnceLock::new();

impl WatermarkMetrics {
    /// Initialize and return the global metrics instance.
    ///
    /// Registration happens on first use against the default registry.
    pub fn global() -> &'static Self {
        METRICS.get_or_init(|| {
            let images = register_int_counter_vec!(
                "estate_watermark_images_total",
                "Total number of images handled by outcome",
                &["outcome"] // watermarked, regenerated, skipped, failed
            )
            .expect("Failed to register images_total metric");

            let retries = register_int_counter_vec!(
                "estate_watermark_retries_total",
                "Total number of ledger retries by outcome",
                &["outcome"] // completed, failed, exhausted
            )
            .expect("Failed to register retries_total metric");

            let vault_archives = register_int_counter!(
                "estate_watermark_vault_archives_total",
                "Total number of originals archived to the vault"
            )
            .expect("Failed to register vault_archives_total metric");

            let jpeg_quality = register_histogram!(
                "estate_watermark_jpeg_quality",
                "JPEG quality of encoded watermarked images",
                vec![5.0, 20.0, 40.0, 60.0, 70.0, 80.0, 90.0, 95.0, 100.0]
            )
            .expect("Failed to register jpeg_quality metric");

            let processing_duration = register_histogram_vec!(
                "estate_watermark_processing_duration_seconds",
                "Duration of per-image processing in seconds",
                &["operation"], // process, regenerate
                vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
            )
            .expect("Failed to register processing_duration_seconds metric");

            WatermarkMetrics {
                images,
                retries,
                vault_archives,
                jpeg_quality,
                processing_duration,
            }
        })
    }

    pub fn record_image(&self, outcome: &str) {
        self.images.with_label_values(&[outcome]).inc();
    }

    pub fn record_retry(&self, outcome: &str) {
        self.retries.with_label_values(&[outcome]).inc();
    }

    pub fn record_vault_archive(&self) {
        self.vault_archives.inc();
    }

    pub fn record_jpeg_quality(&self, quality: u8) {
        self.jpeg_quality.observe(f64::from(quality));
    }

    /// Start timing an operation
    ///
    /// # Example
    /// ```ignore
    /// let timer = metrics.start_timer("process");
    /// // ... process image ...
    /// timer.observe_duration();
    /// ```
    pub fn start_timer(&self, operation: &str) -> OperationTimer {
        OperationTimer {
            histogram: self.processing_duration.with_label_values(&[operation]),
            start: Instant::now(),
        }
    }
}

/// Timer for an in-flight operation
pub struct OperationTimer {
    histogram: Histogram,
    start: Instant,
}

impl OperationTimer {
    /// Record the elapsed time
    pub fn observe_duration(self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

/// Render every metric in the default registry in Prometheus text format
pub fn export_text() -> Result<String, prometheus::Error> {
    // Make sure our collectors exist even if nothing ran yet
    WatermarkMetrics::global();

    let mut buffer = Vec::new();
    TextEncoder::new().encode(&prometheus::gather(), &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_is_singleton() {
        let a = WatermarkMetrics::global() as *const _;
        let b = WatermarkMetrics::global() as *const _;
        assert_eq!(a, b);
    }

    #[test]
    fn test_counters_increment() {
        let metrics = WatermarkMetrics::global();
        let before = metrics.retries.with_label_values(&["exhausted"]).get();
        metrics.record_retry("exhausted");
        assert!(metrics.retries.with_label_values(&["exhausted"]).get() > before);
    }

    #[test]
    fn test_export_contains_metric_names() {
        let metrics = WatermarkMetrics::global();
        metrics.record_image("watermarked");
        metrics.record_jpeg_quality(95);
        metrics.start_timer("process").observe_duration();

        let text = export_text().unwrap();
        assert!(text.contains("estate_watermark_images_total"));
        assert!(text.contains("estate_watermark_jpeg_quality"));
        assert!(text.contains("estate_watermark_processing_duration_seconds"));
    }
}
