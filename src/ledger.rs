//! Failure ledger with bounded retry.
//!
//! A row is created the first time an image fails and is updated by every
//! later attempt. `retry_count` only moves during [`FailureLedger::sweep`],
//! never when the initial failure is recorded. Rows are never deleted here:
//! once a row reaches `max_retry_count` it stays in `error` for manual
//! follow-up.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

use crate::batch::pool::{run_bounded, BatchReport};
use crate::error::{FailureReason, WatermarkError};
use crate::metrics::WatermarkMetrics;
use crate::store::LedgerStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Pending,
    Completed,
    Error,
}

/// Persisted record of a failed watermarking attempt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerRow {
    pub id: String,
    /// Image id the failure belongs to
    pub target_id: String,
    pub status: LedgerStatus,
    pub error_message: Option<String>,
    pub error_context: Option<String>,
    pub retry_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerRow {
    pub fn new_failure(target_id: impl Into<String>, reason: &FailureReason) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            target_id: target_id.into(),
            status: LedgerStatus::Error,
            error_message: Some(reason.message.clone()),
            error_context: Some(reason.context.clone()),
            retry_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_retry_eligible(&self, max_retry_count: u32) -> bool {
        self.status == LedgerStatus::Error && self.retry_count < max_retry_count
    }

    fn overwrite_error(&mut self, reason: &FailureReason) {
        self.status = LedgerStatus::Error;
        self.error_message = Some(reason.message.clone());
        self.error_context = Some(reason.context.clone());
        self.updated_at = Utc::now();
    }
}

/// Outcome counts of one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepSummary {
    pub selected: usize,
    pub completed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct FailureLedger {
    store: Arc<dyn LedgerStore>,
    max_retry_count: u32,
}

impl FailureLedger {
    pub fn new(store: Arc<dyn LedgerStore>, max_retry_count: u32) -> Self {
        Self {
            store,
            max_retry_count,
        }
    }

    pub fn max_retry_count(&self) -> u32 {
        self.max_retry_count
    }

    /// Record a failed attempt for `target_id`.
    ///
    /// Creates the row on first failure; otherwise overwrites the error
    /// fields and leaves `retry_count` untouched.
    pub async fn record_failure(
        &self,
        target_id: &str,
        err: &WatermarkError,
    ) -> Result<LedgerRow, WatermarkError> {
        let reason = err.reason();

        let row = match self.store.find_by_target(target_id).await? {
            Some(mut row) => {
                row.overwrite_error(&reason);
                self.store.update(&row).await?;
                row
            }
            None => {
                let row = LedgerRow::new_failure(target_id, &reason);
                self.store.insert(&row).await?;
                row
            }
        };

        tracing::warn!(
            target_id = %target_id,
            ledger_id = %row.id,
            kind = reason.kind.as_label(),
            retry_count = row.retry_count,
            error = %reason.message,
            "Recorded watermark failure"
        );

        Ok(row)
    }

    /// Record a failure, logging instead of propagating ledger write errors.
    pub async fn record_failure_logged(&self, target_id: &str, err: &WatermarkError) {
        if let Err(ledger_err) = self.record_failure(target_id, err).await {
            tracing::error!(
                target_id = %target_id,
                error = %err,
                ledger_error = %ledger_err,
                "Failed to persist watermark failure to ledger"
            );
        }
    }

    /// Re-drive every retry-eligible row once, immediately.
    ///
    /// `retry` runs the per-image pipeline for a target id. Success marks the
    /// row completed; failure increments `retry_count` and overwrites the
    /// error fields.
    pub async fn sweep<F, Fut>(
        &self,
        concurrency_limit: usize,
        retry: F,
    ) -> Result<SweepSummary, WatermarkError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<(), WatermarkError>>,
    {
        let rows = self.store.retry_eligible(self.max_retry_count).await?;
        let selected = rows.len();

        tracing::info!(
            selected,
            max_retry_count = self.max_retry_count,
            "Starting failed watermark sweep"
        );

        let report: BatchReport<LedgerRow> = run_bounded(rows, concurrency_limit, |row| {
            let attempt = retry(row.target_id.clone());
            async move {
                let outcome = attempt.await;
                self.settle(row, outcome).await
            }
        })
        .await;

        let summary = SweepSummary {
            selected,
            completed: report.succeeded(),
            failed: report.failed(),
        };

        tracing::info!(
            selected = summary.selected,
            completed = summary.completed,
            failed = summary.failed,
            "Finished failed watermark sweep"
        );

        Ok(summary)
    }

    /// Persist the outcome of one retry. Returns `Err` when the retry failed
    /// so the batch report counts it.
    async fn settle(
        &self,
        mut row: LedgerRow,
        outcome: Result<(), WatermarkError>,
    ) -> Result<(), WatermarkError> {
        let metrics = WatermarkMetrics::global();

        match outcome {
            Ok(()) => {
                row.status = LedgerStatus::Completed;
                row.updated_at = Utc::now();
                metrics.record_retry("completed");
                tracing::info!(target_id = %row.target_id, ledger_id = %row.id, "Retry succeeded");
                self.store.update(&row).await
            }
            Err(err) => {
                row.retry_count += 1;
                row.overwrite_error(&err.reason());
                metrics.record_retry(if row.retry_count >= self.max_retry_count {
                    "exhausted"
                } else {
                    "failed"
                });
                tracing::warn!(
                    target_id = %row.target_id,
                    ledger_id = %row.id,
                    retry_count = row.retry_count,
                    max_retry_count = self.max_retry_count,
                    error = %err,
                    "Retry failed"
                );
                if let Err(store_err) = self.store.update(&row).await {
                    tracing::error!(
                        ledger_id = %row.id,
                        error = %store_err,
                        "Failed to update ledger row after retry"
                    );
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryLedgerStore;
    use std::collections::HashSet;

    fn ledger(max: u32) -> (FailureLedger, Arc<InMemoryLedgerStore>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        (FailureLedger::new(store.clone(), max), store)
    }

    #[tokio::test]
    async fn test_record_failure_creates_row() {
        let (ledger, store) = ledger(3);

        let err = WatermarkError::io("fetch asset b", "connection reset");
        let row = ledger.record_failure("b", &err).await.unwrap();

        assert_eq!(row.target_id, "b");
        assert_eq!(row.status, LedgerStatus::Error);
        assert_eq!(row.retry_count, 0);
        assert_eq!(
            row.error_message.as_deref(),
            Some("I/O error during fetch asset b: connection reset")
        );
        assert_eq!(store.rows().len(), 1);
    }

    #[tokio::test]
    async fn test_record_failure_overwrites_without_incrementing() {
        let (ledger, store) = ledger(3);

        ledger
            .record_failure("b", &WatermarkError::io("fetch", "first"))
            .await
            .unwrap();
        let row = ledger
            .record_failure("b", &WatermarkError::MalformedImage("second".to_string()))
            .await
            .unwrap();

        assert_eq!(store.rows().len(), 1);
        assert_eq!(row.retry_count, 0);
        assert_eq!(row.error_message.as_deref(), Some("Malformed image: second"));
        assert!(row
            .error_context
            .as_deref()
            .unwrap()
            .starts_with("kind: malformed_image"));
        assert!(row
            .error_context
            .as_deref()
            .unwrap()
            .contains("debug: MalformedImage(\"second\")"));
    }

    #[tokio::test]
    async fn test_sweep_marks_success_completed() {
        let (ledger, store) = ledger(3);
        ledger
            .record_failure("a", &WatermarkError::io("fetch", "timeout"))
            .await
            .unwrap();

        let summary = ledger.sweep(5, |_| async { Ok(()) }).await.unwrap();

        assert_eq!(
            summary,
            SweepSummary {
                selected: 1,
                completed: 1,
                failed: 0
            }
        );
        let row = store.rows().pop().unwrap();
        assert_eq!(row.status, LedgerStatus::Completed);
        assert_eq!(row.retry_count, 0);

        // Completed rows are not selected again
        let summary = ledger.sweep(5, |_| async { Ok(()) }).await.unwrap();
        assert_eq!(summary.selected, 0);
    }

    #[tokio::test]
    async fn test_retry_count_reaches_max_then_row_is_excluded() {
        let (ledger, store) = ledger(3);
        ledger
            .record_failure("img", &WatermarkError::io("upload", "503"))
            .await
            .unwrap();

        for attempt in 1..=3u32 {
            let summary = ledger
                .sweep(5, |_| async { Err(WatermarkError::io("upload", "still 503")) })
                .await
                .unwrap();
            assert_eq!(summary.selected, 1);
            assert_eq!(summary.failed, 1);

            let row = store.rows().pop().unwrap();
            assert_eq!(row.retry_count, attempt);
            assert_eq!(row.status, LedgerStatus::Error);
            assert_eq!(
                row.error_message.as_deref(),
                Some("I/O error during upload: still 503")
            );
        }

        let summary = ledger
            .sweep(5, |_| async {
                Err(WatermarkError::Internal(
                    "exhausted rows must not be retried".to_string(),
                ))
            })
            .await
            .unwrap();
        assert_eq!(summary.selected, 0);
        assert_eq!(store.rows().pop().unwrap().retry_count, 3);
    }

    #[tokio::test]
    async fn test_sweep_isolates_failures_between_rows() {
        let (ledger, store) = ledger(3);
        for id in ["a", "b", "c"] {
            ledger
                .record_failure(id, &WatermarkError::io("fetch", "timeout"))
                .await
                .unwrap();
        }

        let summary = ledger
            .sweep(2, |target| async move {
                if target == "b" {
                    Err(WatermarkError::MalformedImage("bad bytes".to_string()))
                } else {
                    Ok(())
                }
            })
            .await
            .unwrap();

        assert_eq!(summary.completed, 2);
        assert_eq!(summary.failed, 1);

        let errored: HashSet<String> = store
            .rows()
            .into_iter()
            .filter(|row| row.status == LedgerStatus::Error)
            .map(|row| row.target_id)
            .collect();
        assert_eq!(errored, HashSet::from(["b".to_string()]));
    }

    #[test]
    fn test_is_retry_eligible() {
        let reason = WatermarkError::io("fetch", "x").reason();
        let mut row = LedgerRow::new_failure("t", &reason);

        assert!(row.is_retry_eligible(3));
        row.retry_count = 3;
        assert!(!row.is_retry_eligible(3));
        row.retry_count = 0;
        row.status = LedgerStatus::Completed;
        assert!(!row.is_retry_eligible(3));
    }
}
