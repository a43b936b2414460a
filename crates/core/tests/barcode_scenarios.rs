//! Barcode issuance, batch generation, and lifecycle against the in-memory
//! store.

mod common;

use assert_matches::assert_matches;
use chrono::Datelike;
use common::*;
use regex::Regex;
use rex_core::barcode::batch::BatchRequest;
use rex_core::barcode::codec::BarcodeCodec;
use rex_core::barcode::model::{BarcodeStatus, BatchStatus};
use rex_core::barcode::stats::SecurityScore;
use rex_core::config::GeneratorConfig;
use rex_core::error::CoreError;
use rex_core::memory::ScriptedEntropy;
use rex_core::notification::WarrantyEvent;
use rex_core::ports::BatchStore;

fn batch(quantity: u32) -> BatchRequest {
    BatchRequest {
        product_id: PRODUCT,
        storefront_id: STOREFRONT,
        quantity,
        warranty_period_months: 12,
        batch_number: None,
        intended_recipient: Some("Acme Retail".to_string()),
        distribution_notes: None,
        requested_by: ADMIN,
    }
}

// ---------------------------------------------------------------------------
// Issuance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn issued_barcode_matches_format() {
    let h = Harness::os(at(2025, 6, 1));
    let barcode = h.issue(12).await;

    let pattern = Regex::new("^REX25[ABCDEFGHJKLMNPQRSTUVWXYZ23456789]{12}$").unwrap();
    assert!(pattern.is_match(&barcode.barcode_number), "{}", barcode.barcode_number);
    assert_eq!(barcode.generation_attempt, 1);
    assert_eq!(barcode.status, BarcodeStatus::Generated);
}

#[tokio::test]
async fn year_digits_come_from_generation_time() {
    let h = Harness::scripted(at(2099, 12, 31));
    let late = h.issue(12).await;
    h.clock.set(at(2100, 1, 1));
    let wrapped = h.issue(12).await;

    assert_eq!(&late.barcode_number[3..5], "99");
    assert_eq!(&wrapped.barcode_number[3..5], "00");

    let codec = BarcodeCodec::new(&GeneratorConfig::default());
    for b in [&late, &wrapped] {
        codec.validate(&b.barcode_number).unwrap();
        let parsed = codec.parse(&b.barcode_number).unwrap();
        assert_eq!(parsed.year as i32, b.generated_at.year() % 100);
    }
}

// ---------------------------------------------------------------------------
// Batches
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_absorbs_early_collisions() {
    let h = Harness::new(at(2025, 2, 1), ScriptedEntropy::repeat_then_count(3));
    let result = h.batches.generate(&batch(100), &h.cancel).await.unwrap();

    assert_eq!(result.batch.collision_count, 2);
    assert_eq!(result.batch.generated_quantity, 100);
    assert_eq!(result.batch.failed_quantity, 0);
    assert_eq!(result.batch.generation_status, BatchStatus::Completed);
    assert_eq!(result.barcodes.len(), 100);
    assert_eq!(h.store.barcode_count(), 100);

    let events = h.store.list_collisions_blocking(Some(result.batch.id));
    assert_eq!(events.len(), 2);
    assert_eq!(
        events.iter().map(|e| e.collision_attempt).collect::<Vec<_>>(),
        vec![1, 2]
    );
}

#[tokio::test]
async fn batch_with_stuck_rng_is_partial() {
    let h = Harness::new(at(2025, 2, 1), ScriptedEntropy::constant(17));
    let result = h.batches.generate(&batch(5), &h.cancel).await.unwrap();

    assert_eq!(result.batch.generated_quantity, 1);
    assert_eq!(result.batch.failed_quantity, 4);
    assert_eq!(result.batch.generation_status, BatchStatus::Partial);
    assert_eq!(result.batch.collision_count, 12);
    assert_eq!(h.store.list_collisions_blocking(None).len(), 12);
    assert_eq!(result.statistics.security_score, SecurityScore::Poor);
}

#[tokio::test]
async fn batch_that_produces_nothing_fails() {
    let h = Harness::new(at(2025, 2, 1), ScriptedEntropy::constant(3));
    h.issue(12).await;

    let err = h.batches.generate(&batch(1), &h.cancel).await.unwrap_err();
    let batch_id = assert_matches!(err, CoreError::GenerationExhausted { batch_id: Some(id), .. } => id);

    let record = BatchStore::find_by_id(&*h.store, batch_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.generation_status, BatchStatus::Failed);
    assert_eq!(record.failed_quantity, 1);
}

#[tokio::test]
async fn batch_quantity_bounds() {
    let h = Harness::scripted(at(2025, 2, 1));
    for quantity in [0, 10_001] {
        assert_matches!(
            h.batches.generate(&batch(quantity), &h.cancel).await,
            Err(CoreError::Validation(_))
        );
    }
    let result = h.batches.generate(&batch(1), &h.cancel).await.unwrap();
    assert_eq!(result.batch.generation_status, BatchStatus::Completed);
}

#[tokio::test]
async fn batch_numbers_default_or_verbatim() {
    let h = Harness::scripted(at(2025, 2, 1));
    let auto = h.batches.generate(&batch(2), &h.cancel).await.unwrap();
    assert_eq!(auto.batch.batch_number, "BATCH-2025-02-01-090000");

    let mut named = batch(2);
    named.batch_number = Some("SPRING-PROMO".to_string());
    let named = h.batches.generate(&named, &h.cancel).await.unwrap();
    assert_eq!(named.batch.batch_number, "SPRING-PROMO");
    assert!(named
        .barcodes
        .iter()
        .all(|b| b.batch_number.as_deref() == Some("SPRING-PROMO")));
}

#[tokio::test]
async fn lost_bulk_insert_race_is_redrawn() {
    let h = Harness::scripted(at(2025, 2, 1));
    h.store.arm_bulk_insert_race();

    let result = h.batches.generate(&batch(3), &h.cancel).await.unwrap();

    assert_eq!(result.batch.generated_quantity, 3);
    assert_eq!(result.batch.collision_count, 1);
    assert_eq!(result.batch.generation_status, BatchStatus::Completed);
    // Three from the batch plus the one the rival writer inserted.
    assert_eq!(h.store.barcode_count(), 4);
    assert_eq!(h.store.list_collisions_blocking(Some(result.batch.id)).len(), 1);
}

#[tokio::test]
async fn cancelled_batch_closes_as_failed() {
    let h = Harness::scripted(at(2025, 2, 1));
    h.cancel.cancel();

    let result = h.batches.generate(&batch(10), &h.cancel).await.unwrap();
    assert!(result.statistics.cancelled);
    assert_eq!(result.batch.generated_quantity, 0);
    assert_eq!(result.batch.generation_status, BatchStatus::Failed);
    assert_eq!(h.store.barcode_count(), 0);
}

#[tokio::test]
async fn store_outage_surfaces() {
    let h = Harness::scripted(at(2025, 2, 1));
    h.store.set_unavailable(true);
    assert_matches!(
        h.batches.generate(&batch(3), &h.cancel).await,
        Err(CoreError::StoreUnavailable(_))
    );
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn activation_expiry_and_claimability() {
    let h = Harness::scripted(at(2024, 1, 20));
    let barcode = h.issue(12).await;
    let activated = h.activate(&barcode, date(2024, 1, 15)).await;
    assert_eq!(activated.expiry_date, Some(date(2025, 1, 15)));

    h.clock.set(at(2024, 12, 31));
    assert!(h.lifecycle.is_claimable(&barcode.barcode_number).await.unwrap());

    h.clock.set(at(2025, 2, 1));
    assert!(!h.lifecycle.is_claimable(&barcode.barcode_number).await.unwrap());
    let stored = h.store.barcode_by_number(&barcode.barcode_number).unwrap();
    assert_eq!(stored.status, BarcodeStatus::Expired);
}

#[tokio::test]
async fn activation_with_lapsed_warranty_then_expires() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(6).await;
    let activated = h.activate(&barcode, date(2023, 1, 10)).await;
    assert_eq!(activated.status, BarcodeStatus::Activated);

    let once = h.lifecycle.check_expiry(activated).await.unwrap();
    assert_eq!(once.status, BarcodeStatus::Expired);
    let twice = h.lifecycle.check_expiry(once.clone()).await.unwrap();
    assert_eq!(twice, once);
}

#[tokio::test]
async fn activation_notifies_once() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(24).await;
    h.activate(&barcode, date(2025, 2, 28)).await;

    let events = h.sink.events();
    assert_eq!(events.len(), 1);
    assert_matches!(
        &events[0],
        WarrantyEvent::BarcodeActivated { customer_id: 42, expiry_date, .. }
            if *expiry_date == date(2027, 2, 28)
    );
}

#[tokio::test]
async fn lookup_normalizes_scanner_input() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(12).await;
    let scanned = format!("  {}\n", barcode.barcode_number.to_lowercase());
    let found = h.lifecycle.lookup(&scanned).await.unwrap();
    assert_eq!(found.id, barcode.id);

    assert_matches!(
        h.lifecycle.lookup("REX25AAAA").await,
        Err(CoreError::InvalidBarcode(_))
    );
}
