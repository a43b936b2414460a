//! Claim workflow service.
//!
//! Every operation loads the claim, applies one pure transition from
//! [`Claim`], and persists the claim together with exactly one timeline entry
//! through [`ClaimStore::save_with_timeline`]. The save is a compare-and-swap
//! on `version`, so concurrent transitions on the same claim fail one side
//! with [`CoreError::ConflictingTransition`]. Notifications fire only after
//! the save succeeded.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;

use super::model::{
    format_claim_number, validate_issue_description, Claim, CustomerSnapshot, DeliveryStatus,
    NewClaim, Priority, Severity,
};
use super::repair::{NewRepairTicket, RepairStatus, RepairTicket};
use super::status::{validate_transition, ClaimStatus};
use super::timeline::{Actor, NewTimelineEntry, TimelineEntry, TimelineEventType};
use crate::barcode::lifecycle::BarcodeLifecycle;
use crate::barcode::model::Barcode;
use crate::config::DEFAULT_CLAIM_NUMBER_PADDING;
use crate::error::CoreError;
use crate::notification::WarrantyEvent;
use crate::ports::{ClaimStore, Clock, NotificationSink, RepairStore, TimelineStore};
use crate::types::{DbId, Money, Timestamp};

/// Input for opening a claim against an activated barcode.
#[derive(Debug, Clone)]
pub struct SubmitClaimRequest {
    pub barcode_number: String,
    pub storefront_id: DbId,
    pub product_id: DbId,
    pub customer_id: DbId,
    pub issue_description: String,
    pub issue_category: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub severity: Severity,
    pub priority: Priority,
    pub tags: Vec<String>,
    pub customer: CustomerSnapshot,
}

/// Shipment details for [`ClaimWorkflow::ship`].
#[derive(Debug, Clone)]
pub struct ShipmentRequest {
    pub provider: String,
    pub tracking_number: String,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub cost: Money,
}

/// How a dispute is settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisputeOutcome {
    /// Send the claim back to `validated` for another pass.
    Reopen { note: Option<String> },
    /// Close the claim as `rejected`.
    Reject { reason: String },
}

/// A persisted claim and the timeline entry written with it.
#[derive(Debug, Clone)]
pub struct ClaimUpdate {
    pub claim: Claim,
    pub entry: TimelineEntry,
}

pub struct ClaimWorkflow {
    claims: Arc<dyn ClaimStore>,
    timeline: Arc<dyn TimelineStore>,
    repairs: Arc<dyn RepairStore>,
    barcodes: Arc<BarcodeLifecycle>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
    claim_number_padding: usize,
}

impl ClaimWorkflow {
    pub fn new(
        claims: Arc<dyn ClaimStore>,
        timeline: Arc<dyn TimelineStore>,
        repairs: Arc<dyn RepairStore>,
        barcodes: Arc<BarcodeLifecycle>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            claims,
            timeline,
            repairs,
            barcodes,
            clock,
            notifier,
            claim_number_padding: DEFAULT_CLAIM_NUMBER_PADDING,
        }
    }

    pub fn with_claim_number_padding(mut self, padding: usize) -> Self {
        self.claim_number_padding = padding;
        self
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub async fn get(&self, claim_id: DbId) -> Result<Claim, CoreError> {
        self.claims
            .find_by_id(claim_id)
            .await?
            .ok_or_else(|| CoreError::not_found("claim", claim_id))
    }

    /// Timeline of a claim, oldest first.
    pub async fn timeline(
        &self,
        claim_id: DbId,
        customer_visible_only: bool,
    ) -> Result<Vec<TimelineEntry>, CoreError> {
        self.timeline
            .list_for_claim(claim_id, customer_visible_only)
            .await
    }

    // -----------------------------------------------------------------------
    // Submission
    // -----------------------------------------------------------------------

    /// Open a claim in `pending` and consume the barcode.
    ///
    /// The barcode is marked `used` first, so two submissions racing on the
    /// same barcode cannot both open a claim. If the claim cannot be stored
    /// afterwards the barcode is put back to its previous state.
    ///
    /// The customer contact and pickup address are copied onto the claim and
    /// never refreshed afterwards.
    pub async fn submit(
        &self,
        req: &SubmitClaimRequest,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        validate_issue_description(&req.issue_description)?;
        req.customer.validate()?;

        let barcode = self.barcodes.lookup(&req.barcode_number).await?;
        if barcode.storefront_id != req.storefront_id {
            return Err(CoreError::NotFound {
                entity: "barcode",
                key: barcode.barcode_number,
            });
        }
        if barcode.product_id != req.product_id {
            return Err(CoreError::Validation(format!(
                "Barcode {} does not belong to product {}",
                barcode.barcode_number, req.product_id
            )));
        }
        if barcode.customer_id.is_some_and(|c| c != req.customer_id) {
            return Err(CoreError::Validation(format!(
                "Barcode {} is registered to another customer",
                barcode.barcode_number
            )));
        }

        let now = self.clock.now();
        if !barcode.is_claimable(now) {
            let number = barcode.barcode_number.clone();
            let barcode = self.barcodes.check_expiry(barcode).await?;
            return Err(CoreError::Validation(format!(
                "Barcode {number} is not claimable (status {})",
                barcode.status
            )));
        }
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        self.barcodes.mark_used(&barcode.barcode_number).await?;
        let update = match self.open_claim(req, &barcode, now, cancel).await {
            Ok(update) => update,
            Err(e) => {
                if let Err(restore) = self.barcodes.restore_used(&barcode).await {
                    tracing::warn!(
                        barcode = %barcode.barcode_number,
                        cause = %e,
                        error = %restore,
                        "Barcode left used after failed claim submission"
                    );
                }
                return Err(e);
            }
        };

        tracing::info!(
            claim_id = update.claim.id,
            claim_number = %update.claim.claim_number,
            barcode = %barcode.barcode_number,
            "Claim submitted"
        );
        Ok(update)
    }

    /// Create the claim row for an already consumed barcode.
    async fn open_claim(
        &self,
        req: &SubmitClaimRequest,
        barcode: &Barcode,
        now: Timestamp,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        let sequence = self.claims.next_claim_sequence(req.storefront_id).await?;
        let claim_number = format_claim_number(now, sequence, self.claim_number_padding);

        let mut additional = serde_json::Map::new();
        additional.insert(
            "barcode_number".to_string(),
            serde_json::Value::String(barcode.barcode_number.clone()),
        );
        let submitted = NewTimelineEntry::system_update(0, "Claim submitted", additional, now);

        let new = NewClaim {
            claim_number,
            storefront_id: req.storefront_id,
            customer_id: req.customer_id,
            product_id: req.product_id,
            barcode_id: barcode.id,
            issue_description: req.issue_description.trim().to_string(),
            issue_category: req.issue_category.clone(),
            issue_date: req.issue_date,
            severity: req.severity,
            priority: req.priority,
            tags: req.tags.clone(),
            claim_date: now,
            customer: req.customer.clone(),
        };

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let (claim, mut entries) = self.claims.create(&new, &[submitted]).await?;
        let entry = entries.pop().ok_or_else(|| {
            CoreError::Internal(format!("Claim {} stored without a timeline entry", claim.id))
        })?;
        Ok(ClaimUpdate { claim, entry })
    }

    // -----------------------------------------------------------------------
    // Status transitions
    // -----------------------------------------------------------------------

    /// Generic transition through [`Claim::update_status`]. Statuses that
    /// need a technician, a repair ticket, a cost, or a shipment are refused;
    /// use the specialized operation below.
    pub async fn update_status(
        &self,
        claim_id: DbId,
        next: ClaimStatus,
        actor: Actor,
        note: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| {
            claim.update_status(next, actor, note, now)
        })
        .await
    }

    /// `pending -> validated`.
    pub async fn validate(
        &self,
        claim_id: DbId,
        actor: Actor,
        notes: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| {
            claim.validate_submission(actor, notes, now)
        })
        .await
    }

    /// `pending -> rejected`. Disputes are rejected through
    /// [`resolve_dispute`](Self::resolve_dispute).
    pub async fn reject(
        &self,
        claim_id: DbId,
        actor: Actor,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        let claim = self.get(claim_id).await?;
        if claim.status != ClaimStatus::Pending {
            return Err(CoreError::InvalidTransition {
                entity: "claim",
                from: claim.status.to_string(),
                to: ClaimStatus::Rejected.to_string(),
            });
        }
        self.apply(claim, cancel, |claim, now| claim.reject(actor, reason, now))
            .await
    }

    /// `validated -> assigned`, or a reassignment when already `assigned`.
    ///
    /// A reassignment records an `assignment_changed` entry instead of a
    /// status change.
    pub async fn assign_technician(
        &self,
        claim_id: DbId,
        technician_id: DbId,
        actor: Actor,
        eta: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| {
            if claim.status == ClaimStatus::Assigned {
                claim.reassign_technician(technician_id, actor, eta, now)
            } else {
                claim.assign_technician(technician_id, actor, eta, now)
            }
        })
        .await
    }

    /// `assigned -> in_repair`, opening a repair ticket or resuming the one
    /// still open for this claim.
    ///
    /// The ticket is in place before the claim moves, so a claim is never
    /// `in_repair` without one. A ticket opened here is cancelled again if
    /// the claim save fails.
    pub async fn start_repair(
        &self,
        claim_id: DbId,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<(ClaimUpdate, RepairTicket), CoreError> {
        let claim = self.get(claim_id).await?;
        let technician_id = claim.assigned_technician_id.ok_or_else(|| {
            CoreError::Validation(format!("Claim {claim_id} has no assigned technician"))
        })?;
        actor.validate()?;
        validate_transition(claim.status, ClaimStatus::InRepair)?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let (ticket, opened) = match self.repairs.find_open_for_claim(claim_id).await? {
            Some(open) => {
                tracing::debug!(claim_id, ticket_id = open.id, "Resuming repair ticket");
                (open, false)
            }
            None => {
                let ticket = self
                    .repairs
                    .create(&NewRepairTicket {
                        claim_id,
                        technician_id,
                        assigned_at: self.clock.now(),
                        target_completion_date: claim.estimated_completion_date,
                    })
                    .await?;
                tracing::debug!(claim_id, ticket_id = ticket.id, "Repair ticket opened");
                (ticket, true)
            }
        };

        let result = self
            .apply(claim, cancel, |claim, now| {
                claim.transition(ClaimStatus::InRepair, actor, None, now)
            })
            .await;
        match result {
            Ok(update) => Ok((update, ticket)),
            Err(e) => {
                if opened {
                    self.withdraw_ticket(ticket, &e).await;
                }
                Err(e)
            }
        }
    }

    /// `in_repair -> repaired`. The latest repair ticket must be `completed`.
    pub async fn complete_repair(
        &self,
        claim_id: DbId,
        actor: Actor,
        notes: &str,
        cost: Money,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        let claim = self.get(claim_id).await?;
        validate_transition(claim.status, ClaimStatus::Repaired)?;

        let ticket_done = self
            .repairs
            .find_latest_for_claim(claim_id)
            .await?
            .is_some_and(|t| t.status == RepairStatus::Completed);
        if !ticket_done {
            return Err(CoreError::Validation(format!(
                "Claim {claim_id} has no completed repair ticket"
            )));
        }

        self.apply(claim, cancel, |claim, now| {
            claim.complete_repair(actor, notes, cost, now)
        })
        .await
    }

    /// `in_repair -> replaced`.
    pub async fn mark_replaced(
        &self,
        claim_id: DbId,
        actor: Actor,
        replacement_product_id: DbId,
        cost: Money,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| {
            claim.mark_replaced(actor, replacement_product_id, cost, now)
        })
        .await
    }

    /// `repaired | replaced -> shipped`.
    pub async fn ship(
        &self,
        claim_id: DbId,
        actor: Actor,
        shipment: &ShipmentRequest,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| {
            claim.ship(
                actor,
                &shipment.provider,
                &shipment.tracking_number,
                shipment.estimated_delivery_date,
                shipment.cost,
                now,
            )
        })
        .await
    }

    /// `shipped -> delivered`.
    pub async fn mark_delivered(
        &self,
        claim_id: DbId,
        actor: Actor,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| claim.mark_delivered(actor, now))
            .await
    }

    /// `delivered -> completed`.
    pub async fn complete(
        &self,
        claim_id: DbId,
        actor: Actor,
        feedback: Option<&str>,
        rating: Option<i16>,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| {
            claim.complete(actor, feedback, rating, now)
        })
        .await
    }

    /// `pending | validated | assigned -> cancelled`.
    pub async fn cancel(
        &self,
        claim_id: DbId,
        actor: Actor,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| claim.cancel(actor, reason, now))
            .await
    }

    /// `in_repair | delivered -> disputed`.
    pub async fn dispute(
        &self,
        claim_id: DbId,
        actor: Actor,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| claim.dispute(actor, reason, now))
            .await
    }

    /// `disputed -> validated | rejected`.
    pub async fn resolve_dispute(
        &self,
        claim_id: DbId,
        actor: Actor,
        outcome: &DisputeOutcome,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        let claim = self.get(claim_id).await?;
        if claim.status != ClaimStatus::Disputed {
            return Err(CoreError::Validation(format!(
                "Claim {claim_id} is not disputed (status {})",
                claim.status
            )));
        }
        self.apply(claim, cancel, |claim, now| match outcome {
            DisputeOutcome::Reopen { note } => {
                claim.transition(ClaimStatus::Validated, actor, note.as_deref(), now)
            }
            DisputeOutcome::Reject { reason } => claim.reject(actor, reason, now),
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Delivery tracking
    // -----------------------------------------------------------------------

    pub async fn update_delivery_status(
        &self,
        claim_id: DbId,
        actor: Actor,
        status: DeliveryStatus,
        notes: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| {
            claim.update_delivery_status(actor, status, notes, now)
        })
        .await
    }

    /// Replace the shipment of a `shipped` claim with a new label.
    pub async fn reship(
        &self,
        claim_id: DbId,
        actor: Actor,
        provider: &str,
        tracking_number: &str,
        eta: Option<NaiveDate>,
        cancel: &CancellationToken,
    ) -> Result<ClaimUpdate, CoreError> {
        self.mutate(claim_id, cancel, |claim, now| {
            claim.reship(actor, provider, tracking_number, eta, now)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Annotations (timeline only)
    // -----------------------------------------------------------------------

    pub async fn add_note(
        &self,
        claim_id: DbId,
        actor: Actor,
        content: &str,
        customer_visible: bool,
        cancel: &CancellationToken,
    ) -> Result<TimelineEntry, CoreError> {
        if content.trim().is_empty() {
            return Err(CoreError::Validation("Note content is required".to_string()));
        }
        self.annotate(claim_id, cancel, |now| {
            NewTimelineEntry::note_added(claim_id, actor, content.trim(), customer_visible, now)
        })
        .await
    }

    pub async fn record_attachment(
        &self,
        claim_id: DbId,
        actor: Actor,
        attachment_id: &str,
        filename: &str,
        cancel: &CancellationToken,
    ) -> Result<TimelineEntry, CoreError> {
        if attachment_id.trim().is_empty() || filename.trim().is_empty() {
            return Err(CoreError::Validation(
                "Attachment id and filename are required".to_string(),
            ));
        }
        self.annotate(claim_id, cancel, |now| {
            NewTimelineEntry::attachment_uploaded(claim_id, actor, attachment_id, filename, now)
        })
        .await
    }

    pub async fn record_customer_contact(
        &self,
        claim_id: DbId,
        actor: Actor,
        method: &str,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<TimelineEntry, CoreError> {
        if method.trim().is_empty() || reason.trim().is_empty() {
            return Err(CoreError::Validation(
                "Contact method and reason are required".to_string(),
            ));
        }
        self.annotate(claim_id, cancel, |now| {
            NewTimelineEntry::customer_contact(claim_id, actor, method, reason, now)
        })
        .await
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn mutate<F>(
        &self,
        claim_id: DbId,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<ClaimUpdate, CoreError>
    where
        F: FnOnce(&mut Claim, Timestamp) -> Result<NewTimelineEntry, CoreError>,
    {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let claim = self.get(claim_id).await?;
        self.apply(claim, cancel, f).await
    }

    /// Apply `f` to a loaded claim and persist it with the returned entry.
    async fn apply<F>(
        &self,
        mut claim: Claim,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<ClaimUpdate, CoreError>
    where
        F: FnOnce(&mut Claim, Timestamp) -> Result<NewTimelineEntry, CoreError>,
    {
        let expected_version = claim.version;
        let now = self.clock.now();
        let entry = f(&mut claim, now)?;
        entry.validate()?;

        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }

        let (saved, mut entries) = self
            .claims
            .save_with_timeline(&claim, expected_version, &[entry])
            .await?;
        let entry = entries.pop().ok_or_else(|| {
            CoreError::Internal(format!("Claim {} saved without a timeline entry", saved.id))
        })?;

        tracing::debug!(
            claim_id = saved.id,
            event_type = %entry.event_type,
            status = %saved.status,
            version = saved.version,
            "Claim updated"
        );
        self.notify_after(&saved, &entry);
        Ok(ClaimUpdate {
            claim: saved,
            entry,
        })
    }

    async fn annotate<F>(
        &self,
        claim_id: DbId,
        cancel: &CancellationToken,
        build: F,
    ) -> Result<TimelineEntry, CoreError>
    where
        F: FnOnce(Timestamp) -> NewTimelineEntry,
    {
        self.get(claim_id).await?;
        let entry = build(self.clock.now());
        entry.validate()?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        self.timeline.append(&entry).await
    }

    /// Cancel a ticket opened for a repair start that did not go through.
    async fn withdraw_ticket(&self, mut ticket: RepairTicket, cause: &CoreError) {
        let (claim_id, ticket_id) = (ticket.claim_id, ticket.id);
        let withdrawn = match ticket.cancel(Some("Repair start failed"), self.clock.now()) {
            Ok(()) => self.repairs.save(&ticket).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = withdrawn {
            tracing::warn!(claim_id, ticket_id, cause = %cause, error = %e, "Orphaned repair ticket left open");
        }
    }

    fn notify_after(&self, claim: &Claim, entry: &TimelineEntry) {
        let event = match (entry.event_type, entry.to_status) {
            (TimelineEventType::StatusChange, Some(ClaimStatus::Validated)) => {
                let Some(validated_by) = entry.actor_id else {
                    return;
                };
                WarrantyEvent::ClaimValidated {
                    claim_id: claim.id,
                    claim_number: claim.claim_number.clone(),
                    storefront_id: claim.storefront_id,
                    customer_id: claim.customer_id,
                    validated_by,
                    at: entry.created_at,
                }
            }
            (TimelineEventType::StatusChange, Some(ClaimStatus::Shipped))
            | (TimelineEventType::ShipmentCreated, _) => {
                let (Some(provider), Some(tracking)) =
                    (&claim.shipping_provider, &claim.tracking_number)
                else {
                    return;
                };
                WarrantyEvent::ShipmentCreated {
                    claim_id: claim.id,
                    claim_number: claim.claim_number.clone(),
                    storefront_id: claim.storefront_id,
                    customer_id: claim.customer_id,
                    shipping_provider: provider.clone(),
                    tracking_number: tracking.clone(),
                    estimated_delivery_date: claim.estimated_delivery_date,
                    at: entry.created_at,
                }
            }
            (TimelineEventType::StatusChange, Some(ClaimStatus::Completed)) => {
                WarrantyEvent::ClaimCompleted {
                    claim_id: claim.id,
                    claim_number: claim.claim_number.clone(),
                    storefront_id: claim.storefront_id,
                    customer_id: claim.customer_id,
                    at: entry.created_at,
                }
            }
            _ => return,
        };
        self.notifier.notify(event);
    }
}
