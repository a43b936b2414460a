//! Warranty claim entity and its pure state transitions.
//!
//! All mutation helpers here are synchronous and touch only the in-memory
//! value; [`ClaimWorkflow`](super::workflow::ClaimWorkflow) persists the result
//! together with the timeline entry each helper returns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::status::{validate_transition, ClaimStatus};
use super::timeline::{Actor, NewTimelineEntry};
use crate::error::CoreError;
use crate::types::{DbId, Money, Timestamp};

/// Maximum length of `issue_description`.
pub const MAX_ISSUE_DESCRIPTION_LENGTH: usize = 5000;

/// Prefix of every claim number.
pub const CLAIM_NUMBER_PREFIX: &str = "CLM";

status_enum! {
    pub enum Severity {
        Low => "low",
        Medium => "medium",
        High => "high",
        Critical => "critical",
    }
}

status_enum! {
    pub enum Priority {
        Low => "low",
        Normal => "normal",
        High => "high",
        Urgent => "urgent",
    }
}

status_enum! {
    /// How a claim was (or will be) resolved.
    pub enum ResolutionType {
        Repair => "repair",
        Replace => "replace",
        Refund => "refund",
        Rejected => "rejected",
    }
}

status_enum! {
    /// Carrier state of the return shipment.
    pub enum DeliveryStatus {
        NotShipped => "not_shipped",
        Preparing => "preparing",
        PickedUp => "picked_up",
        InTransit => "in_transit",
        OutForDelivery => "out_for_delivery",
        Delivered => "delivered",
        Failed => "failed",
        Returned => "returned",
    }
}

/// Postal address captured on the claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: Option<String>,
    pub postal_code: String,
    pub country: String,
}

/// Customer contact copied onto the claim at submission. Never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerSnapshot {
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub pickup_address: Address,
}

impl CustomerSnapshot {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation("Customer name is required".to_string()));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(CoreError::Validation(format!(
                "Customer email '{}' is not valid",
                self.email
            )));
        }
        let addr = &self.pickup_address;
        for (field, value) in [
            ("line1", &addr.line1),
            ("city", &addr.city),
            ("postal_code", &addr.postal_code),
            ("country", &addr.country),
        ] {
            if value.trim().is_empty() {
                return Err(CoreError::Validation(format!(
                    "Pickup address {field} is required"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Claim
// ---------------------------------------------------------------------------

/// A persisted warranty claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub id: DbId,
    pub claim_number: String,
    pub storefront_id: DbId,
    pub customer_id: DbId,
    pub product_id: DbId,
    pub barcode_id: DbId,

    pub issue_description: String,
    pub issue_category: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub severity: Severity,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub claim_date: Timestamp,

    pub status: ClaimStatus,
    pub previous_status: Option<ClaimStatus>,
    pub status_updated_at: Timestamp,
    pub status_updated_by: Option<DbId>,
    pub validated_at: Option<Timestamp>,
    pub validated_by: Option<DbId>,
    pub completed_at: Option<Timestamp>,

    pub assigned_technician_id: Option<DbId>,
    pub estimated_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<Timestamp>,

    pub resolution_type: Option<ResolutionType>,
    pub repair_notes: Option<String>,
    pub replacement_product_id: Option<DbId>,
    pub refund_amount: Option<Money>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub dispute_reason: Option<String>,

    pub repair_cost: Option<Money>,
    pub shipping_cost: Option<Money>,
    pub replacement_cost: Option<Money>,
    pub total_cost: Money,

    pub shipping_provider: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<Timestamp>,
    pub delivery_status: DeliveryStatus,

    pub customer: CustomerSnapshot,
    pub customer_feedback: Option<String>,
    pub customer_satisfaction_rating: Option<i16>,

    /// Optimistic-lock version, bumped by every successful save.
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a claim in `pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewClaim {
    pub claim_number: String,
    pub storefront_id: DbId,
    pub customer_id: DbId,
    pub product_id: DbId,
    pub barcode_id: DbId,
    pub issue_description: String,
    pub issue_category: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub severity: Severity,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub claim_date: Timestamp,
    pub customer: CustomerSnapshot,
}

impl NewClaim {
    /// Materialize a freshly inserted claim with a store-assigned id.
    pub fn into_claim(self, id: DbId) -> Claim {
        let now = self.claim_date;
        Claim {
            id,
            claim_number: self.claim_number,
            storefront_id: self.storefront_id,
            customer_id: self.customer_id,
            product_id: self.product_id,
            barcode_id: self.barcode_id,
            issue_description: self.issue_description,
            issue_category: self.issue_category,
            issue_date: self.issue_date,
            severity: self.severity,
            priority: self.priority,
            tags: self.tags,
            claim_date: now,
            status: ClaimStatus::Pending,
            previous_status: None,
            status_updated_at: now,
            status_updated_by: None,
            validated_at: None,
            validated_by: None,
            completed_at: None,
            assigned_technician_id: None,
            estimated_completion_date: None,
            actual_completion_date: None,
            resolution_type: None,
            repair_notes: None,
            replacement_product_id: None,
            refund_amount: None,
            rejection_reason: None,
            cancellation_reason: None,
            dispute_reason: None,
            repair_cost: None,
            shipping_cost: None,
            replacement_cost: None,
            total_cost: Money::ZERO,
            shipping_provider: None,
            tracking_number: None,
            estimated_delivery_date: None,
            actual_delivery_date: None,
            delivery_status: DeliveryStatus::NotShipped,
            customer: self.customer,
            customer_feedback: None,
            customer_satisfaction_rating: None,
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Format a claim number, e.g. `CLM-20250301-000042`.
pub fn format_claim_number(claim_date: Timestamp, sequence: i64, padding: usize) -> String {
    format!(
        "{CLAIM_NUMBER_PREFIX}-{}-{sequence:0padding$}",
        claim_date.format("%Y%m%d")
    )
}

/// Validate a free-text issue description.
pub fn validate_issue_description(description: &str) -> Result<(), CoreError> {
    let len = description.trim().chars().count();
    if len == 0 {
        return Err(CoreError::Validation(
            "Issue description is required".to_string(),
        ));
    }
    if len > MAX_ISSUE_DESCRIPTION_LENGTH {
        return Err(CoreError::Validation(format!(
            "Issue description exceeds {MAX_ISSUE_DESCRIPTION_LENGTH} characters ({len})"
        )));
    }
    Ok(())
}

/// Decimal places of a stored money column (`NUMERIC(12, 2)`).
pub const MONEY_SCALE: u32 = 2;

/// Largest stored money value in cents: `9 999 999 999.99`.
const MAX_MONEY_CENTS: i64 = 999_999_999_999;

/// Largest amount a money column holds.
pub fn max_money() -> Money {
    Money::new(MAX_MONEY_CENTS, MONEY_SCALE)
}

/// Accept amounts that fit a money column: not negative, at most two
/// decimal places, and no larger than [`max_money`].
pub fn validate_money(field: &str, amount: Money) -> Result<(), CoreError> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(CoreError::Validation(format!(
            "{field} must not be negative (got {amount})"
        )));
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(CoreError::Validation(format!(
            "{field} has more than {MONEY_SCALE} decimal places (got {amount})"
        )));
    }
    if amount > max_money() {
        return Err(CoreError::Validation(format!(
            "{field} exceeds the maximum of {} (got {amount})",
            max_money()
        )));
    }
    Ok(())
}

/// `a + b`, refused once the sum no longer fits a money column.
pub fn add_money(field: &str, a: Money, b: Money) -> Result<Money, CoreError> {
    a.checked_add(b)
        .filter(|sum| *sum <= max_money())
        .ok_or_else(|| {
            CoreError::Validation(format!("{field} exceeds the maximum of {}", max_money()))
        })
}

/// `a * b`, refused once the product no longer fits a money column.
pub fn mul_money(field: &str, a: Money, b: Money) -> Result<Money, CoreError> {
    a.checked_mul(b)
        .filter(|product| *product <= max_money())
        .ok_or_else(|| {
            CoreError::Validation(format!("{field} exceeds the maximum of {}", max_money()))
        })
}

pub fn validate_rating(rating: i16) -> Result<(), CoreError> {
    if !(1..=5).contains(&rating) {
        return Err(CoreError::Validation(format!(
            "Satisfaction rating must be between 1 and 5 (got {rating})"
        )));
    }
    Ok(())
}

fn checked_total(
    repair: Option<Money>,
    shipping: Option<Money>,
    replacement: Option<Money>,
) -> Result<Money, CoreError> {
    [repair, shipping, replacement]
        .into_iter()
        .flatten()
        .try_fold(Money::ZERO, |sum, cost| add_money("total_cost", sum, cost))
}

/// The operation that owns a status the generic update refuses.
fn dedicated_operation(status: ClaimStatus) -> &'static str {
    match status {
        ClaimStatus::Assigned => "assigning a technician",
        ClaimStatus::InRepair => "starting a repair ticket",
        ClaimStatus::Repaired => "completing the repair with its cost",
        ClaimStatus::Replaced => "recording the replacement product and cost",
        ClaimStatus::Shipped => "shipping with a provider and tracking number",
        _ => "a dedicated operation",
    }
}

fn require_text(field: &str, value: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

impl Claim {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Statuses the claim may move to next.
    pub fn next_actions(&self) -> &'static [ClaimStatus] {
        self.status.valid_transitions()
    }

    /// Whole days since the claim was filed.
    pub fn elapsed_days(&self, now: Timestamp) -> i64 {
        (now - self.claim_date).num_days().max(0)
    }

    /// Sum of the cost fields that are set.
    pub fn computed_total(&self) -> Result<Money, CoreError> {
        checked_total(self.repair_cost, self.shipping_cost, self.replacement_cost)
    }

    pub fn recompute_total(&mut self) -> Result<(), CoreError> {
        self.total_cost = self.computed_total()?;
        Ok(())
    }

    /// Move to `next`, stamping the status bookkeeping.
    ///
    /// Returns the `status_change` entry describing the move. The caller is
    /// responsible for persisting both together. Outside the crate, status
    /// changes go through [`Claim::update_status`] or a specialized
    /// transition so the fields tied to each status stay consistent.
    pub(crate) fn transition(
        &mut self,
        next: ClaimStatus,
        actor: Actor,
        note: Option<&str>,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        actor.validate()?;
        validate_transition(self.status, next)?;

        let from = self.status;
        self.previous_status = Some(from);
        self.status = next;
        self.status_updated_at = now;
        self.status_updated_by = actor.id;
        self.updated_at = now;

        if next == ClaimStatus::Completed {
            self.completed_at.get_or_insert(now);
            self.actual_completion_date.get_or_insert(now);
        }

        Ok(NewTimelineEntry::status_change(
            self.id, from, next, actor, note, now,
        ))
    }

    /// Generic status change.
    ///
    /// `validated` validates a pending claim or reopens a disputed one.
    /// `delivered` and `completed` apply their specialized transitions.
    /// `rejected`, `cancelled` and `disputed` take `note` as the mandatory
    /// reason. Targets that need a technician, a repair ticket, a cost, or a
    /// shipment are refused with [`CoreError::Validation`].
    pub fn update_status(
        &mut self,
        next: ClaimStatus,
        actor: Actor,
        note: Option<&str>,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        actor.validate()?;
        validate_transition(self.status, next)?;
        let reason = note.unwrap_or_default();
        match next {
            ClaimStatus::Validated if self.status == ClaimStatus::Disputed => {
                self.transition(next, actor, note, now)
            }
            ClaimStatus::Validated => self.validate_submission(actor, note, now),
            ClaimStatus::Rejected => self.reject(actor, reason, now),
            ClaimStatus::Cancelled => self.cancel(actor, reason, now),
            ClaimStatus::Disputed => self.dispute(actor, reason, now),
            ClaimStatus::Delivered => self.mark_delivered(actor, now),
            ClaimStatus::Completed => self.complete(actor, None, None, now),
            ClaimStatus::Pending
            | ClaimStatus::Assigned
            | ClaimStatus::InRepair
            | ClaimStatus::Repaired
            | ClaimStatus::Replaced
            | ClaimStatus::Shipped => Err(CoreError::Validation(format!(
                "Moving claim {} to '{next}' requires {}",
                self.id,
                dedicated_operation(next)
            ))),
        }
    }

    // -- specialized transitions ------------------------------------------

    /// `pending -> validated`.
    pub fn validate_submission(
        &mut self,
        actor: Actor,
        notes: Option<&str>,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        let entry = self.transition(ClaimStatus::Validated, actor, notes, now)?;
        self.validated_at = Some(now);
        self.validated_by = actor.id;
        Ok(entry)
    }

    /// `pending | disputed -> rejected`. A reason is mandatory.
    pub fn reject(
        &mut self,
        actor: Actor,
        reason: &str,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        let reason = require_text("Rejection reason", reason)?;
        let entry = self.transition(ClaimStatus::Rejected, actor, Some(&reason), now)?;
        self.rejection_reason = Some(reason);
        self.resolution_type = Some(ResolutionType::Rejected);
        Ok(entry)
    }

    /// `validated -> assigned`.
    pub fn assign_technician(
        &mut self,
        technician_id: DbId,
        actor: Actor,
        eta: Option<NaiveDate>,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        let entry = self
            .transition(ClaimStatus::Assigned, actor, None, now)?
            .with_metadata(|m| m.technician_id = Some(technician_id));
        self.assigned_technician_id = Some(technician_id);
        if eta.is_some() {
            self.estimated_completion_date = eta;
        }
        Ok(entry)
    }

    /// Replace the technician of an `assigned` claim without a status change.
    pub fn reassign_technician(
        &mut self,
        technician_id: DbId,
        actor: Actor,
        eta: Option<NaiveDate>,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        actor.validate()?;
        if self.status != ClaimStatus::Assigned {
            return Err(CoreError::InvalidTransition {
                entity: "claim",
                from: self.status.to_string(),
                to: ClaimStatus::Assigned.to_string(),
            });
        }
        let previous = self.assigned_technician_id;
        self.assigned_technician_id = Some(technician_id);
        if eta.is_some() {
            self.estimated_completion_date = eta;
        }
        self.updated_at = now;
        Ok(NewTimelineEntry::assignment_changed(
            self.id,
            actor,
            previous,
            technician_id,
            now,
        ))
    }

    /// `in_repair -> repaired`.
    pub fn complete_repair(
        &mut self,
        actor: Actor,
        notes: &str,
        cost: Money,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        validate_money("repair_cost", cost)?;
        let total = checked_total(Some(cost), self.shipping_cost, self.replacement_cost)?;
        let entry = self.transition(ClaimStatus::Repaired, actor, None, now)?;
        let notes = notes.trim();
        if !notes.is_empty() {
            self.repair_notes = Some(notes.to_string());
        }
        self.repair_cost = Some(cost);
        self.resolution_type = Some(ResolutionType::Repair);
        self.total_cost = total;
        Ok(entry)
    }

    /// `in_repair -> replaced`.
    pub fn mark_replaced(
        &mut self,
        actor: Actor,
        replacement_product_id: DbId,
        cost: Money,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        validate_money("replacement_cost", cost)?;
        let total = checked_total(self.repair_cost, self.shipping_cost, Some(cost))?;
        let entry = self
            .transition(ClaimStatus::Replaced, actor, None, now)?
            .with_metadata(|m| m.new_value = Some(replacement_product_id.to_string()));
        self.replacement_product_id = Some(replacement_product_id);
        self.replacement_cost = Some(cost);
        self.resolution_type = Some(ResolutionType::Replace);
        self.total_cost = total;
        Ok(entry)
    }

    /// `repaired | replaced -> shipped`. Provider and tracking are required.
    pub fn ship(
        &mut self,
        actor: Actor,
        provider: &str,
        tracking_number: &str,
        eta: Option<NaiveDate>,
        cost: Money,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        let provider = require_text("Shipping provider", provider)?;
        let tracking = require_text("Tracking number", tracking_number)?;
        validate_money("shipping_cost", cost)?;
        let total = checked_total(self.repair_cost, Some(cost), self.replacement_cost)?;

        let entry = self
            .transition(ClaimStatus::Shipped, actor, None, now)?
            .with_metadata(|m| {
                m.shipping_provider = Some(provider.clone());
                m.tracking_number = Some(tracking.clone());
                m.estimated_date = eta;
            });
        self.shipping_provider = Some(provider);
        self.tracking_number = Some(tracking);
        self.estimated_delivery_date = eta;
        self.delivery_status = DeliveryStatus::Preparing;
        self.shipping_cost = Some(cost);
        self.total_cost = total;
        Ok(entry)
    }

    /// `shipped -> delivered`.
    pub fn mark_delivered(
        &mut self,
        actor: Actor,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        let entry = self
            .transition(ClaimStatus::Delivered, actor, None, now)?
            .with_metadata(|m| m.actual_date = Some(now));
        self.actual_delivery_date = Some(now);
        self.delivery_status = DeliveryStatus::Delivered;
        Ok(entry)
    }

    /// `delivered -> completed`, optionally with customer feedback.
    pub fn complete(
        &mut self,
        actor: Actor,
        feedback: Option<&str>,
        rating: Option<i16>,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        if let Some(r) = rating {
            validate_rating(r)?;
        }
        let entry = self.transition(ClaimStatus::Completed, actor, None, now)?;
        if let Some(f) = feedback.map(str::trim).filter(|f| !f.is_empty()) {
            self.customer_feedback = Some(f.to_string());
        }
        if rating.is_some() {
            self.customer_satisfaction_rating = rating;
        }
        Ok(entry)
    }

    /// `pending | validated | assigned -> cancelled`.
    pub fn cancel(
        &mut self,
        actor: Actor,
        reason: &str,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        let reason = require_text("Cancellation reason", reason)?;
        let entry = self.transition(ClaimStatus::Cancelled, actor, Some(&reason), now)?;
        self.cancellation_reason = Some(reason);
        Ok(entry)
    }

    /// `in_repair | delivered -> disputed`. Costs and resolution are kept.
    pub fn dispute(
        &mut self,
        actor: Actor,
        reason: &str,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        let reason = require_text("Dispute reason", reason)?;
        let entry = self.transition(ClaimStatus::Disputed, actor, Some(&reason), now)?;
        self.dispute_reason = Some(reason);
        Ok(entry)
    }

    /// Record carrier progress while `shipped`.
    pub fn update_delivery_status(
        &mut self,
        actor: Actor,
        status: DeliveryStatus,
        notes: Option<&str>,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        actor.validate()?;
        if self.status != ClaimStatus::Shipped {
            return Err(CoreError::Validation(format!(
                "Delivery status can only change while shipped (claim is {})",
                self.status
            )));
        }
        if matches!(status, DeliveryStatus::NotShipped | DeliveryStatus::Delivered) {
            return Err(CoreError::Validation(format!(
                "Delivery status '{status}' is set by the claim workflow"
            )));
        }
        self.delivery_status = status;
        self.updated_at = now;
        Ok(NewTimelineEntry::delivery_update(
            self.id,
            actor,
            status.as_str(),
            self.tracking_number.as_deref(),
            None,
            notes,
            now,
        ))
    }

    /// Replace the shipment of a `shipped` claim, e.g. after a failed delivery.
    pub fn reship(
        &mut self,
        actor: Actor,
        provider: &str,
        tracking_number: &str,
        eta: Option<NaiveDate>,
        now: Timestamp,
    ) -> Result<NewTimelineEntry, CoreError> {
        actor.validate()?;
        let provider = require_text("Shipping provider", provider)?;
        let tracking = require_text("Tracking number", tracking_number)?;
        if self.status != ClaimStatus::Shipped {
            return Err(CoreError::Validation(format!(
                "Only shipped claims can be reshipped (claim is {})",
                self.status
            )));
        }
        let entry =
            NewTimelineEntry::shipment_created(self.id, actor, &provider, &tracking, eta, now)
                .with_metadata(|m| m.old_value = self.tracking_number.clone());
        self.shipping_provider = Some(provider);
        self.tracking_number = Some(tracking);
        self.estimated_delivery_date = eta;
        self.delivery_status = DeliveryStatus::Preparing;
        self.updated_at = now;
        Ok(entry)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
