// End-to-end pipeline tests over the in-memory stores

use super::test_harness::{PipelineHarness, VAULT_FOLDER_ID};
use estate_watermark::ledger::LedgerStatus;
use estate_watermark::store::OwnerKind;
use estate_watermark::ApplyRequest;
use tokio_test::{assert_err, assert_ok};

fn ids(values: &[&str]) -> Option<Vec<String>> {
    Some(values.iter().map(|v| v.to_string()).collect())
}

#[tokio::test]
async fn test_watermarked_assets_never_reappear_in_discovery() {
    let h = PipelineHarness::new();
    h.add_photo("cover-1", "cover.jpg");
    h.add_photo("plan-1", "plan_watermarked.jpg");
    h.add_photo("logo-1", "logo.png");
    h.catalog
        .add_owner(OwnerKind::Project, "p1", &[Some("cover-1"), Some("plan-1"), None]);
    h.catalog.add_owner(OwnerKind::Developer, "d1", &[Some("logo-1")]);

    let pending = h.service.pending_watermark_ids().await.unwrap();
    assert_eq!(pending, vec!["cover-1", "logo-1"]);

    let response = h.service.apply_watermark(ApplyRequest::default()).await.unwrap();
    assert_eq!(response.message, "Images watermarked successfully");

    assert!(h.service.pending_watermark_ids().await.unwrap().is_empty());
    assert_eq!(h.catalog.meta("cover-1").unwrap().filename, "cover_watermarked.jpg");
    assert_eq!(h.catalog.meta("logo-1").unwrap().filename, "logo_watermarked.png");
    assert_eq!(h.catalog.meta("plan-1").unwrap().filename, "plan_watermarked.jpg");
}

#[tokio::test]
async fn test_originals_are_vaulted_once() {
    let h = PipelineHarness::new();
    h.add_photo("img-1", "villa.jpg");

    for _ in 0..2 {
        h.service
            .apply_watermark(ApplyRequest {
                image_ids: ids(&["img-1"]),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let entries = h.vault.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].live_asset_id.as_deref(), Some("img-1"));
    assert_eq!(entries[0].original_filename, "original:img-1_villa.jpg");

    let archived = h.catalog.meta(&entries[0].original_asset_id).unwrap();
    assert_eq!(archived.folder.as_deref(), Some(VAULT_FOLDER_ID));
    assert!(!archived.watermarked);
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn test_partial_failure_is_recorded_and_batch_completes() {
    let h = PipelineHarness::with_batch_yaml("  concurrency_limit: 2");
    for id in ["a", "b", "c"] {
        h.add_photo(id, &format!("{id}.jpg"));
    }
    h.catalog.fail_fetch("b");

    let response = h
        .service
        .apply_watermark(ApplyRequest {
            image_ids: ids(&["a", "b", "c"]),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.message, "Images watermarked successfully");
    assert!(h.catalog.meta("a").unwrap().watermarked);
    assert!(h.catalog.meta("c").unwrap().watermarked);

    let row = h.ledger.row_for("b").unwrap();
    assert_eq!(row.status, LedgerStatus::Error);
    assert_eq!(row.retry_count, 0);
    let context = row.error_context.unwrap();
    assert!(context.starts_with("kind: transient_io"));
    assert!(context.contains("operation: fetch asset b"));
    assert!(context.contains("injected failure"));
    assert_eq!(h.ledger.rows().len(), 1);
}

#[tokio::test]
async fn test_retry_accounting_until_exhausted() {
    let h = PipelineHarness::new();
    h.add_photo("flaky", "flaky.jpg");
    h.catalog.fail_update("flaky");

    assert_ok!(
        h.service
            .apply_watermark(ApplyRequest {
                image_ids: ids(&["flaky"]),
                ..Default::default()
            })
            .await
    );

    for attempt in 1..=3u32 {
        let summary = h.service.sweep_failed().await.unwrap();
        assert_eq!(summary.selected, 1);
        assert_eq!(summary.failed, 1);

        let row = h.ledger.row_for("flaky").unwrap();
        assert_eq!(row.retry_count, attempt);
        assert_eq!(row.status, LedgerStatus::Error);
    }

    let response = h.service.process_failed_watermarks().await.unwrap();
    assert_eq!(response.message, "Failed watermarks processed successfully");
    assert_eq!(h.ledger.row_for("flaky").unwrap().retry_count, 3);
    assert!(h.work_dir_is_empty());
}

#[tokio::test]
async fn test_retry_succeeds_after_recovery() {
    let h = PipelineHarness::new();
    h.add_photo("img", "img.jpg");
    h.catalog.fail_fetch("img");

    h.service
        .apply_watermark(ApplyRequest {
            image_ids: ids(&["img"]),
            ..Default::default()
        })
        .await
        .unwrap();
    h.catalog.clear_failures();

    let summary = h.service.sweep_failed().await.unwrap();

    assert_eq!(summary.completed, 1);
    assert_eq!(h.ledger.row_for("img").unwrap().status, LedgerStatus::Completed);
    assert!(h.catalog.meta("img").unwrap().watermarked);
}

#[tokio::test]
async fn test_regenerate_uses_vaulted_original() {
    let h = PipelineHarness::new();
    h.add_photo("img", "tower.png");

    h.service
        .apply_watermark(ApplyRequest {
            image_ids: ids(&["img"]),
            ..Default::default()
        })
        .await
        .unwrap();
    let uploads = h.catalog.upload_count();

    let response = h.service.regenerate(vec!["img".to_string()]).await.unwrap();

    assert_eq!(response.message, "Images regenerated successfully");
    assert_eq!(h.catalog.upload_count(), uploads);
    assert_eq!(h.vault.entries().len(), 1);
    assert_eq!(h.catalog.meta("img").unwrap().filename, "tower_watermarked.png");
    assert!(h.ledger.rows().is_empty());
}

#[tokio::test]
async fn test_unknown_image_goes_to_ledger() {
    let h = PipelineHarness::new();

    let response = h
        .service
        .apply_watermark(ApplyRequest {
            image_ids: ids(&["ghost"]),
            ..Default::default()
        })
        .await;

    let response = assert_ok!(response);
    assert_eq!(response.message, "Images watermarked successfully");

    let row = h.ledger.row_for("ghost").unwrap();
    assert!(row.error_message.unwrap().contains("ghost"));
    assert_err!(h.service.processor().process("ghost", false).await);
}

#[tokio::test]
async fn test_flagged_image_is_never_vaulted_or_rewatermarked() {
    let h = PipelineHarness::new();
    h.add_photo("img", "villa_watermarked.jpg");
    h.catalog.set_flag("img", true);
    let before = h.catalog.blob("img").unwrap().bytes;

    let response = h
        .service
        .apply_watermark(ApplyRequest {
            image_ids: ids(&["img"]),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(response.message, "Images watermarked successfully");
    assert!(h.vault.entries().is_empty());
    assert_eq!(h.catalog.upload_count(), 0);
    assert_eq!(h.catalog.blob("img").unwrap().bytes, before);
    assert!(h.ledger.rows().is_empty());
}
