//! Claim submission, the full repair workflow, disputes, and the timeline.

mod common;

use assert_matches::assert_matches;
use chrono::Duration;
use common::*;
use rust_decimal::Decimal;
use rex_core::barcode::model::BarcodeStatus;
use rex_core::claim::model::{Claim, DeliveryStatus, ResolutionType};
use rex_core::claim::repair::{PartUsage, RepairStatus, RepairTicket};
use rex_core::claim::status::ClaimStatus;
use rex_core::claim::timeline::{Actor, TimelineEventType};
use rex_core::claim::workflow::{DisputeOutcome, ShipmentRequest};
use rex_core::error::CoreError;
use rex_core::notification::WarrantyEvent;
use rex_core::ports::{BarcodeStore, ClaimStore, RepairStore};
use rex_core::types::Money;

fn usd(cents: i64) -> Money {
    Decimal::new(cents, 2)
}

fn admin() -> Actor {
    Actor::admin(ADMIN)
}

fn technician() -> Actor {
    Actor::technician(TECHNICIAN)
}

fn shipment(cost: Money) -> ShipmentRequest {
    ShipmentRequest {
        provider: "UPS".to_string(),
        tracking_number: "1Z999AA10123456784".to_string(),
        estimated_delivery_date: Some(date(2025, 3, 10)),
        cost,
    }
}

/// Issue, activate, and submit a claim against a fresh barcode.
async fn submitted(h: &Harness) -> Claim {
    let barcode = h.issue(12).await;
    h.activate(&barcode, date(2025, 1, 5)).await;
    h.claims
        .submit(&submission(&barcode.barcode_number), &h.cancel)
        .await
        .unwrap()
        .claim
}

/// Drive a claim to `in_repair` and finish its repair ticket.
async fn repaired_ticket(h: &Harness, claim_id: i64) -> RepairTicket {
    h.claims.validate(claim_id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(claim_id, TECHNICIAN, admin(), Some(date(2025, 3, 5)), &h.cancel)
        .await
        .unwrap();
    let (_, ticket) = h.claims.start_repair(claim_id, technician(), &h.cancel).await.unwrap();
    h.repairs
        .begin_work(ticket.id, technician(), "Failed voltage regulator", &h.cancel)
        .await
        .unwrap();
    h.repairs
        .complete(ticket.id, technician(), Some("Regulator replaced"), &h.cancel)
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

#[tokio::test]
async fn submission_snapshots_customer_and_consumes_barcode() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(12).await;
    h.activate(&barcode, date(2025, 1, 5)).await;
    let update = h
        .claims
        .submit(&submission(&barcode.barcode_number), &h.cancel)
        .await
        .unwrap();
    let claim = update.claim;

    assert_eq!(claim.status, ClaimStatus::Pending);
    assert_eq!(claim.claim_number, "CLM-20250301-000001");
    assert_eq!(claim.barcode_id, barcode.id);
    assert_eq!(claim.customer, customer());
    assert_eq!(claim.total_cost, Money::ZERO);
    assert_eq!(claim.delivery_status, DeliveryStatus::NotShipped);

    let stored = h.store.barcode_by_number(&barcode.barcode_number).unwrap();
    assert_eq!(stored.status, BarcodeStatus::Used);

    assert_eq!(update.entry.claim_id, claim.id);
    assert_eq!(update.entry.event_type, TimelineEventType::SystemUpdate);
    assert!(!update.entry.is_customer_visible);
    assert_eq!(
        update.entry.metadata.additional.get("barcode_number"),
        Some(&serde_json::Value::String(barcode.barcode_number.clone()))
    );
    assert_eq!(h.store.timeline_blocking(claim.id).len(), 1);
}

#[tokio::test]
async fn claim_numbers_increase_per_storefront() {
    let h = Harness::scripted(at(2025, 3, 1));
    let first = submitted(&h).await;
    let second = submitted(&h).await;
    assert_eq!(first.claim_number, "CLM-20250301-000001");
    assert_eq!(second.claim_number, "CLM-20250301-000002");
}

#[tokio::test]
async fn used_barcode_cannot_be_claimed_twice() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(12).await;
    h.activate(&barcode, date(2025, 1, 5)).await;
    let req = submission(&barcode.barcode_number);
    h.claims.submit(&req, &h.cancel).await.unwrap();

    assert_matches!(
        h.claims.submit(&req, &h.cancel).await,
        Err(CoreError::Validation(_))
    );
}

#[tokio::test]
async fn failed_barcode_consumption_opens_no_claim() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(12).await;
    h.activate(&barcode, date(2025, 1, 5)).await;
    let req = submission(&barcode.barcode_number);

    h.faults.fail(Fault::BarcodeSave, true);
    assert_matches!(
        h.claims.submit(&req, &h.cancel).await,
        Err(CoreError::StoreUnavailable(_))
    );
    assert!(h.store.claim_blocking(1).is_none());
    assert_eq!(
        h.store.barcode_by_number(&barcode.barcode_number).unwrap().status,
        BarcodeStatus::Activated
    );

    h.faults.fail(Fault::BarcodeSave, false);
    let claim = h.claims.submit(&req, &h.cancel).await.unwrap().claim;
    assert_eq!(claim.claim_number, "CLM-20250301-000001");
}

#[tokio::test]
async fn failed_claim_insert_gives_the_barcode_back() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(12).await;
    h.activate(&barcode, date(2025, 1, 5)).await;
    let req = submission(&barcode.barcode_number);

    h.faults.fail(Fault::ClaimCreate, true);
    assert_matches!(
        h.claims.submit(&req, &h.cancel).await,
        Err(CoreError::StoreUnavailable(_))
    );
    assert!(h.store.claim_blocking(1).is_none());
    assert_eq!(
        h.store.barcode_by_number(&barcode.barcode_number).unwrap().status,
        BarcodeStatus::Activated
    );

    h.faults.fail(Fault::ClaimCreate, false);
    let claim = h.claims.submit(&req, &h.cancel).await.unwrap().claim;
    assert_eq!(claim.barcode_id, barcode.id);
    assert_eq!(
        h.store.barcode_by_number(&barcode.barcode_number).unwrap().status,
        BarcodeStatus::Used
    );
}

#[tokio::test]
async fn stale_barcode_read_cannot_consume_it_again() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(12).await;
    let activated = h.activate(&barcode, date(2025, 1, 5)).await;
    h.claims
        .submit(&submission(&barcode.barcode_number), &h.cancel)
        .await
        .unwrap();

    // A second submitter that read the barcode while it was still activated.
    let mut stale = activated;
    stale.mark_used(at(2025, 3, 1)).unwrap();
    let err = BarcodeStore::save(&*h.store, &stale, BarcodeStatus::Activated)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::InvalidTransition { entity: "barcode", .. });
    assert!(h.store.claim_blocking(2).is_none());
}

#[tokio::test]
async fn unactivated_or_foreign_barcode_rejected() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(12).await;
    assert_matches!(
        h.claims
            .submit(&submission(&barcode.barcode_number), &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );

    h.activate(&barcode, date(2025, 1, 5)).await;
    let mut foreign = submission(&barcode.barcode_number);
    foreign.storefront_id = 99;
    assert_matches!(
        h.claims.submit(&foreign, &h.cancel).await,
        Err(CoreError::NotFound { entity: "barcode", .. })
    );
}

#[tokio::test]
async fn expired_barcode_rejected_and_marked() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(1).await;
    h.activate(&barcode, date(2024, 6, 1)).await;

    assert_matches!(
        h.claims
            .submit(&submission(&barcode.barcode_number), &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );
    let stored = h.store.barcode_by_number(&barcode.barcode_number).unwrap();
    assert_eq!(stored.status, BarcodeStatus::Expired);
}

#[tokio::test]
async fn blank_description_rejected() {
    let h = Harness::scripted(at(2025, 3, 1));
    let barcode = h.issue(12).await;
    h.activate(&barcode, date(2025, 1, 5)).await;
    let mut req = submission(&barcode.barcode_number);
    req.issue_description = "   ".to_string();
    assert_matches!(
        h.claims.submit(&req, &h.cancel).await,
        Err(CoreError::Validation(_))
    );
}

// ---------------------------------------------------------------------------
// Full workflow
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repair_path_end_to_end() {
    let h = Harness::scripted(at(2025, 3, 1));
    let claim = submitted(&h).await;
    let id = claim.id;
    let step = Duration::hours(2);

    h.clock.advance(step);
    h.claims.validate(id, admin(), Some("Looks genuine"), &h.cancel).await.unwrap();
    h.clock.advance(step);
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    h.clock.advance(step);
    let (_, ticket) = h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();
    h.repairs
        .begin_work(ticket.id, technician(), "Cold solder joint", &h.cancel)
        .await
        .unwrap();
    h.repairs
        .complete(ticket.id, technician(), None, &h.cancel)
        .await
        .unwrap();
    h.clock.advance(step);
    h.claims
        .complete_repair(id, technician(), "Resoldered board", usd(5000), &h.cancel)
        .await
        .unwrap();
    h.clock.advance(step);
    h.claims.ship(id, admin(), &shipment(usd(1000)), &h.cancel).await.unwrap();
    h.clock.advance(step);
    h.claims.mark_delivered(id, admin(), &h.cancel).await.unwrap();
    h.clock.advance(step);
    let done = h
        .claims
        .complete(id, Actor::customer(CUSTOMER), Some("Works again"), Some(5), &h.cancel)
        .await
        .unwrap();

    let claim = done.claim;
    assert_eq!(claim.status, ClaimStatus::Completed);
    assert_eq!(claim.total_cost, usd(6000));
    assert_eq!(claim.repair_cost, Some(usd(5000)));
    assert_eq!(claim.shipping_cost, Some(usd(1000)));
    assert_eq!(claim.replacement_cost, None);
    assert_eq!(claim.resolution_type, Some(ResolutionType::Repair));
    assert_eq!(claim.delivery_status, DeliveryStatus::Delivered);
    assert_eq!(claim.completed_at, Some(done.entry.created_at));
    assert_eq!(claim.actual_completion_date, Some(done.entry.created_at));
    assert_eq!(claim.customer_satisfaction_rating, Some(5));
    assert!(claim.is_terminal());
    assert!(claim.next_actions().is_empty());

    let timeline = h.claims.timeline(id, false).await.unwrap();
    let transitions: Vec<_> = timeline
        .iter()
        .filter(|e| e.event_type == TimelineEventType::StatusChange)
        .map(|e| (e.from_status.unwrap(), e.to_status.unwrap()))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (ClaimStatus::Pending, ClaimStatus::Validated),
            (ClaimStatus::Validated, ClaimStatus::Assigned),
            (ClaimStatus::Assigned, ClaimStatus::InRepair),
            (ClaimStatus::InRepair, ClaimStatus::Repaired),
            (ClaimStatus::Repaired, ClaimStatus::Shipped),
            (ClaimStatus::Shipped, ClaimStatus::Delivered),
            (ClaimStatus::Delivered, ClaimStatus::Completed),
        ]
    );
    assert!(timeline
        .windows(2)
        .all(|w| w[0].created_at <= w[1].created_at));
    assert!(timeline
        .iter()
        .any(|e| e.event_type == TimelineEventType::RepairStarted));
    assert!(timeline
        .iter()
        .any(|e| e.event_type == TimelineEventType::RepairCompleted));

    let kinds: Vec<_> = h.sink.events().iter().map(|e| e.event_type()).collect();
    assert_eq!(
        kinds,
        vec![
            "barcode.activated",
            "claim.validated",
            "claim.shipment_created",
            "claim.completed",
        ]
    );
}

#[tokio::test]
async fn replacement_path_sums_costs() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();
    h.claims
        .mark_replaced(id, admin(), 808, usd(12999), &h.cancel)
        .await
        .unwrap();
    let shipped = h
        .claims
        .ship(id, admin(), &shipment(usd(1500)), &h.cancel)
        .await
        .unwrap()
        .claim;

    assert_eq!(shipped.total_cost, usd(14499));
    assert_eq!(shipped.replacement_product_id, Some(808));
    assert_eq!(shipped.resolution_type, Some(ResolutionType::Replace));
    assert_eq!(shipped.delivery_status, DeliveryStatus::Preparing);
}

#[tokio::test]
async fn cancel_from_in_repair_refused() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();

    let before = h.store.claim_blocking(id).unwrap();
    let entries_before = h.store.timeline_blocking(id).len();

    let err = h
        .claims
        .cancel(id, Actor::customer(CUSTOMER), "Changed my mind", &h.cancel)
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::InvalidTransition { entity: "claim", .. });
    assert_eq!(h.store.claim_blocking(id).unwrap(), before);
    assert_eq!(h.store.timeline_blocking(id).len(), entries_before);
}

#[tokio::test]
async fn same_status_update_is_invalid() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    assert_matches!(
        h.claims
            .update_status(id, ClaimStatus::Pending, admin(), None, &h.cancel)
            .await,
        Err(CoreError::InvalidTransition { .. })
    );
}

#[tokio::test]
async fn generic_update_cannot_skip_the_repair_ticket() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    let before = h.store.claim_blocking(id).unwrap();
    let entries_before = h.store.timeline_blocking(id).len();

    assert_matches!(
        h.claims
            .update_status(id, ClaimStatus::InRepair, admin(), None, &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );
    assert_eq!(h.store.claim_blocking(id).unwrap(), before);
    assert_eq!(h.store.timeline_blocking(id).len(), entries_before);
    assert!(RepairStore::find_latest_for_claim(&*h.store, id)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn generic_update_refuses_costed_and_shipped_statuses() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();

    for next in [ClaimStatus::Repaired, ClaimStatus::Replaced] {
        assert_matches!(
            h.claims.update_status(id, next, admin(), None, &h.cancel).await,
            Err(CoreError::Validation(_))
        );
    }
    assert_eq!(h.store.claim_blocking(id).unwrap().status, ClaimStatus::InRepair);

    h.claims
        .mark_replaced(id, admin(), 501, usd(20000), &h.cancel)
        .await
        .unwrap();
    assert_matches!(
        h.claims
            .update_status(id, ClaimStatus::Shipped, admin(), None, &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );
    let claim = h.store.claim_blocking(id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Replaced);
    assert!(claim.tracking_number.is_none());
    assert!(!h
        .sink
        .events()
        .iter()
        .any(|e| matches!(e, WarrantyEvent::ShipmentCreated { .. })));
}

#[tokio::test]
async fn generic_update_keeps_status_fields_consistent() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    let update = h
        .claims
        .update_status(id, ClaimStatus::Validated, admin(), None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(update.claim.validated_by, Some(ADMIN));
    assert_eq!(update.claim.validated_at, Some(at(2025, 3, 1)));

    assert_matches!(
        h.claims
            .update_status(id, ClaimStatus::Cancelled, admin(), None, &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );
    let cancelled = h
        .claims
        .update_status(id, ClaimStatus::Cancelled, admin(), Some("Duplicate claim"), &h.cancel)
        .await
        .unwrap()
        .claim;
    assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Duplicate claim"));
}

#[tokio::test]
async fn terminal_claims_stay_terminal() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims
        .reject(id, admin(), "Damage caused by misuse", &h.cancel)
        .await
        .unwrap();
    for next in ClaimStatus::ALL {
        assert!(h
            .claims
            .update_status(id, *next, admin(), None, &h.cancel)
            .await
            .is_err());
    }
}

#[tokio::test]
async fn complete_repair_needs_completed_ticket() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    let (_, ticket) = h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();
    h.repairs
        .begin_work(ticket.id, technician(), "Bad fan", &h.cancel)
        .await
        .unwrap();

    assert_matches!(
        h.claims
            .complete_repair(id, technician(), "", usd(100), &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );
}

#[tokio::test]
async fn stale_version_conflicts() {
    let h = Harness::scripted(at(2025, 3, 1));
    let stale = submitted(&h).await;
    h.claims.validate(stale.id, admin(), None, &h.cancel).await.unwrap();

    let err = ClaimStore::save_with_timeline(&*h.store, &stale, stale.version, &[])
        .await
        .unwrap_err();
    assert_matches!(err, CoreError::ConflictingTransition { .. });
    assert!(err.is_retryable());
}

#[tokio::test]
async fn cancelled_token_persists_nothing() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.cancel.cancel();
    assert_matches!(
        h.claims.validate(id, admin(), None, &h.cancel).await,
        Err(CoreError::Cancelled)
    );
    assert_eq!(h.store.claim_blocking(id).unwrap().status, ClaimStatus::Pending);
}

// ---------------------------------------------------------------------------
// Assignment, repair tickets, disputes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn reassignment_is_not_a_status_change() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    let update = h
        .claims
        .assign_technician(id, 77, admin(), Some(date(2025, 3, 20)), &h.cancel)
        .await
        .unwrap();

    assert_eq!(update.entry.event_type, TimelineEventType::AssignmentChanged);
    assert!(!update.entry.is_customer_visible);
    assert_eq!(update.claim.status, ClaimStatus::Assigned);
    assert_eq!(update.claim.assigned_technician_id, Some(77));
    assert_eq!(update.claim.estimated_completion_date, Some(date(2025, 3, 20)));
}

#[tokio::test]
async fn start_repair_requires_technician() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    assert_matches!(
        h.claims.start_repair(id, technician(), &h.cancel).await,
        Err(CoreError::Validation(_))
    );
}

#[tokio::test]
async fn failed_ticket_creation_leaves_claim_assigned() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    let entries_before = h.store.timeline_blocking(id).len();

    h.faults.fail(Fault::TicketCreate, true);
    assert_matches!(
        h.claims.start_repair(id, technician(), &h.cancel).await,
        Err(CoreError::StoreUnavailable(_))
    );
    assert_eq!(h.store.claim_blocking(id).unwrap().status, ClaimStatus::Assigned);
    assert_eq!(h.store.timeline_blocking(id).len(), entries_before);

    h.faults.fail(Fault::TicketCreate, false);
    let (update, ticket) = h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();
    assert_eq!(update.claim.status, ClaimStatus::InRepair);
    assert_eq!(ticket.claim_id, id);
}

#[tokio::test]
async fn failed_repair_start_withdraws_the_new_ticket() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();

    h.faults.fail(Fault::ClaimSave, true);
    assert_matches!(
        h.claims.start_repair(id, technician(), &h.cancel).await,
        Err(CoreError::StoreUnavailable(_))
    );
    h.faults.fail(Fault::ClaimSave, false);

    assert_eq!(h.store.claim_blocking(id).unwrap().status, ClaimStatus::Assigned);
    let withdrawn = RepairStore::find_latest_for_claim(&*h.store, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(withdrawn.status, RepairStatus::Cancelled);
    assert!(RepairStore::find_open_for_claim(&*h.store, id)
        .await
        .unwrap()
        .is_none());

    let (_, ticket) = h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();
    assert_ne!(ticket.id, withdrawn.id);
    assert_eq!(ticket.status, RepairStatus::Assigned);
}

#[tokio::test]
async fn unrepresentable_costs_are_refused() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();

    assert_matches!(
        h.claims
            .mark_replaced(id, admin(), 501, Decimal::MAX, &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );
    assert_matches!(
        h.claims
            .mark_replaced(id, admin(), 501, Decimal::new(1999, 3), &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );
    assert_eq!(h.store.claim_blocking(id).unwrap().status, ClaimStatus::InRepair);

    h.claims
        .mark_replaced(id, admin(), 501, usd(999_999_999_999), &h.cancel)
        .await
        .unwrap();
    assert_matches!(
        h.claims.ship(id, admin(), &shipment(usd(1)), &h.cancel).await,
        Err(CoreError::Validation(_))
    );
    let claim = h.store.claim_blocking(id).unwrap();
    assert_eq!(claim.status, ClaimStatus::Replaced);
    assert_eq!(claim.total_cost, usd(999_999_999_999));
}

#[tokio::test]
async fn ticket_costs_and_parts_wait() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    let (_, ticket) = h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();
    assert_eq!(ticket.status, RepairStatus::Assigned);
    assert_eq!(ticket.technician_id, TECHNICIAN);

    let t = ticket.id;
    h.repairs.begin_work(t, technician(), "Worn motor", &h.cancel).await.unwrap();
    h.repairs.wait_for_parts(t, &h.cancel).await.unwrap();
    h.repairs.resume(t, &h.cancel).await.unwrap();
    h.repairs
        .add_part(t, PartUsage::new("MTR-9", "Motor", 1, usd(4500)).unwrap(), &h.cancel)
        .await
        .unwrap();
    let ticket = h
        .repairs
        .log_labor(t, Decimal::new(2, 0), Some(usd(3000)), &h.cancel)
        .await
        .unwrap();

    assert_eq!(ticket.parts_cost, usd(4500));
    assert_eq!(ticket.labor_cost, usd(6000));
    assert_eq!(ticket.total_cost, usd(10500));
    assert_eq!(ticket.status, RepairStatus::InProgress);
}

#[tokio::test]
async fn begin_work_requires_claim_in_repair() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    let ticket = repaired_ticket(&h, id).await;
    assert_eq!(ticket.status, RepairStatus::Completed);

    h.claims
        .complete_repair(id, technician(), "Done", usd(0), &h.cancel)
        .await
        .unwrap();
    assert_matches!(
        h.repairs
            .begin_work(ticket.id, technician(), "Again", &h.cancel)
            .await,
        Err(CoreError::Validation(_))
    );
}

#[tokio::test]
async fn dispute_reopens_with_costs_kept() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    repaired_ticket(&h, id).await;
    h.claims
        .complete_repair(id, technician(), "Fixed", usd(2500), &h.cancel)
        .await
        .unwrap();
    h.claims.ship(id, admin(), &shipment(usd(800)), &h.cancel).await.unwrap();
    h.claims.mark_delivered(id, admin(), &h.cancel).await.unwrap();

    let disputed = h
        .claims
        .dispute(id, Actor::customer(CUSTOMER), "Same fault again", &h.cancel)
        .await
        .unwrap()
        .claim;
    assert_eq!(disputed.status, ClaimStatus::Disputed);
    assert_eq!(disputed.total_cost, usd(3300));

    let reopened = h
        .claims
        .resolve_dispute(id, admin(), &DisputeOutcome::Reopen { note: None }, &h.cancel)
        .await
        .unwrap()
        .claim;
    assert_eq!(reopened.status, ClaimStatus::Validated);
    assert_eq!(reopened.total_cost, usd(3300));
    assert_eq!(reopened.resolution_type, Some(ResolutionType::Repair));

    // A second repair episode opens a fresh ticket.
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    let (_, second) = h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();
    assert_eq!(second.status, RepairStatus::Assigned);
}

#[tokio::test]
async fn dispute_can_end_in_rejection() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims.validate(id, admin(), None, &h.cancel).await.unwrap();
    h.claims
        .assign_technician(id, TECHNICIAN, admin(), None, &h.cancel)
        .await
        .unwrap();
    h.claims.start_repair(id, technician(), &h.cancel).await.unwrap();
    h.claims
        .dispute(id, admin(), "Customer disputes diagnosis", &h.cancel)
        .await
        .unwrap();

    let rejected = h
        .claims
        .resolve_dispute(
            id,
            admin(),
            &DisputeOutcome::Reject {
                reason: "Tampering found".to_string(),
            },
            &h.cancel,
        )
        .await
        .unwrap()
        .claim;
    assert_eq!(rejected.status, ClaimStatus::Rejected);
    assert_eq!(rejected.rejection_reason.as_deref(), Some("Tampering found"));
}

// ---------------------------------------------------------------------------
// Delivery and timeline annotations
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delivery_updates_and_reship() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    repaired_ticket(&h, id).await;
    h.claims
        .complete_repair(id, technician(), "", usd(0), &h.cancel)
        .await
        .unwrap();
    h.claims.ship(id, admin(), &shipment(usd(0)), &h.cancel).await.unwrap();

    let update = h
        .claims
        .update_delivery_status(id, admin(), DeliveryStatus::Failed, Some("No one home"), &h.cancel)
        .await
        .unwrap();
    assert_eq!(update.entry.event_type, TimelineEventType::DeliveryUpdate);
    assert_eq!(update.claim.delivery_status, DeliveryStatus::Failed);

    let reshipped = h
        .claims
        .reship(id, admin(), "FedEx", "7712 3456 7890", None, &h.cancel)
        .await
        .unwrap();
    assert_eq!(reshipped.entry.event_type, TimelineEventType::ShipmentCreated);
    assert_eq!(reshipped.claim.tracking_number.as_deref(), Some("7712 3456 7890"));
    assert_eq!(reshipped.claim.status, ClaimStatus::Shipped);

    let shipments = h
        .sink
        .events()
        .into_iter()
        .filter(|e| matches!(e, WarrantyEvent::ShipmentCreated { .. }))
        .count();
    assert_eq!(shipments, 2);
}

#[tokio::test]
async fn customer_view_hides_internal_entries() {
    let h = Harness::scripted(at(2025, 3, 1));
    let id = submitted(&h).await.id;
    h.claims
        .add_note(id, admin(), "Check serial against recall list", false, &h.cancel)
        .await
        .unwrap();
    h.claims
        .add_note(id, admin(), "We received your claim", true, &h.cancel)
        .await
        .unwrap();
    h.claims
        .record_attachment(id, Actor::customer(CUSTOMER), "att-1", "receipt.pdf", &h.cancel)
        .await
        .unwrap();
    h.claims
        .record_customer_contact(id, admin(), "phone", "Confirm pickup window", &h.cancel)
        .await
        .unwrap();

    let all = h.claims.timeline(id, false).await.unwrap();
    let visible = h.claims.timeline(id, true).await.unwrap();
    assert_eq!(all.len(), 5);
    assert_eq!(visible.len(), 2);
    assert!(visible.iter().all(|e| e.is_customer_visible));
    assert_eq!(
        visible[1].metadata.filename.as_deref(),
        Some("receipt.pdf")
    );
}

#[tokio::test]
async fn notes_on_missing_claim_fail() {
    let h = Harness::scripted(at(2025, 3, 1));
    assert_matches!(
        h.claims.add_note(404, admin(), "hello", true, &h.cancel).await,
        Err(CoreError::NotFound { entity: "claim", .. })
    );
}
