//! Technician-facing operations on repair tickets.
//!
//! Starting and completing work are visible on the claim timeline
//! (`repair_started` / `repair_completed`); the remaining bookkeeping only
//! touches the ticket.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

use super::repair::{PartUsage, PhotoKind, RepairTicket};
use super::status::ClaimStatus;
use super::timeline::{Actor, NewTimelineEntry};
use crate::error::CoreError;
use crate::ports::{ClaimStore, Clock, RepairStore, TimelineStore};
use crate::types::{DbId, Money, Timestamp};

pub struct RepairService {
    repairs: Arc<dyn RepairStore>,
    claims: Arc<dyn ClaimStore>,
    timeline: Arc<dyn TimelineStore>,
    clock: Arc<dyn Clock>,
}

impl RepairService {
    pub fn new(
        repairs: Arc<dyn RepairStore>,
        claims: Arc<dyn ClaimStore>,
        timeline: Arc<dyn TimelineStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repairs,
            claims,
            timeline,
            clock,
        }
    }

    pub async fn get(&self, ticket_id: DbId) -> Result<RepairTicket, CoreError> {
        self.repairs
            .find_by_id(ticket_id)
            .await?
            .ok_or_else(|| CoreError::not_found("repair_ticket", ticket_id))
    }

    /// `assigned -> in_progress`. The parent claim must be `in_repair`.
    pub async fn begin_work(
        &self,
        ticket_id: DbId,
        actor: Actor,
        diagnosis: &str,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        actor.validate()?;
        let ticket = self.get(ticket_id).await?;
        let claim = self
            .claims
            .find_by_id(ticket.claim_id)
            .await?
            .ok_or_else(|| CoreError::not_found("claim", ticket.claim_id))?;
        if claim.status != ClaimStatus::InRepair {
            return Err(CoreError::Validation(format!(
                "Claim {} is {}, not in_repair",
                claim.id, claim.status
            )));
        }

        let saved = self
            .apply(ticket, cancel, |t, now| t.begin_work(diagnosis, now))
            .await?;
        let now = saved.updated_at;
        self.timeline
            .append(&NewTimelineEntry::repair_started(
                saved.claim_id,
                actor,
                saved.id,
                saved.technician_id,
                now,
            ))
            .await?;
        tracing::info!(ticket_id = saved.id, claim_id = saved.claim_id, "Repair started");
        Ok(saved)
    }

    pub async fn wait_for_parts(
        &self,
        ticket_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| t.wait_for_parts(now))
            .await
    }

    pub async fn resume(
        &self,
        ticket_id: DbId,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| t.resume(now)).await
    }

    pub async fn add_step(
        &self,
        ticket_id: DbId,
        description: &str,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| t.add_step(description, now))
            .await
    }

    pub async fn add_part(
        &self,
        ticket_id: DbId,
        part: PartUsage,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| t.add_part(part, now))
            .await
    }

    pub async fn log_labor(
        &self,
        ticket_id: DbId,
        hours: Decimal,
        hourly_rate: Option<Money>,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| {
            t.log_labor(hours, hourly_rate, now)
        })
        .await
    }

    pub async fn record_test(
        &self,
        ticket_id: DbId,
        name: &str,
        passed: bool,
        notes: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| {
            t.record_test(name, passed, notes, now)
        })
        .await
    }

    pub async fn add_photo(
        &self,
        ticket_id: DbId,
        kind: PhotoKind,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| t.add_photo(kind, url, now))
            .await
    }

    pub async fn record_quality_check(
        &self,
        ticket_id: DbId,
        passed: bool,
        notes: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| {
            t.record_quality_check(passed, notes, now)
        })
        .await
    }

    /// `in_progress -> completed`, unblocking `complete_repair` on the claim.
    pub async fn complete(
        &self,
        ticket_id: DbId,
        actor: Actor,
        notes: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        actor.validate()?;
        let saved = self
            .update(ticket_id, cancel, |t, now| t.complete(notes, now))
            .await?;
        self.timeline
            .append(&NewTimelineEntry::repair_completed(
                saved.claim_id,
                actor,
                saved.id,
                saved.technician_id,
                saved.updated_at,
            ))
            .await?;
        tracing::info!(
            ticket_id = saved.id,
            claim_id = saved.claim_id,
            total_cost = %saved.total_cost,
            "Repair completed"
        );
        Ok(saved)
    }

    pub async fn fail(
        &self,
        ticket_id: DbId,
        reason: &str,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        let saved = self
            .update(ticket_id, cancel, |t, now| t.fail(reason, now))
            .await?;
        tracing::warn!(ticket_id = saved.id, claim_id = saved.claim_id, reason, "Repair failed");
        Ok(saved)
    }

    pub async fn cancel(
        &self,
        ticket_id: DbId,
        reason: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RepairTicket, CoreError> {
        self.update(ticket_id, cancel, |t, now| t.cancel(reason, now))
            .await
    }

    async fn update<F>(
        &self,
        ticket_id: DbId,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<RepairTicket, CoreError>
    where
        F: FnOnce(&mut RepairTicket, Timestamp) -> Result<(), CoreError>,
    {
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        let ticket = self.get(ticket_id).await?;
        self.apply(ticket, cancel, f).await
    }

    async fn apply<F>(
        &self,
        mut ticket: RepairTicket,
        cancel: &CancellationToken,
        f: F,
    ) -> Result<RepairTicket, CoreError>
    where
        F: FnOnce(&mut RepairTicket, Timestamp) -> Result<(), CoreError>,
    {
        f(&mut ticket, self.clock.now())?;
        if cancel.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        self.repairs.save(&ticket).await
    }
}
