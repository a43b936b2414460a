//! Barcode lifecycle state machine and warranty expiry.
//!
//! Transition rules (`expired` is terminal):
//! - `generated`   -> `distributed`, `activated`, `expired`
//! - `distributed` -> `activated`, `expired`
//! - `activated`   -> `used`, `expired`
//! - `used`        -> `expired`

use std::sync::Arc;

use chrono::{Months, NaiveDate};

use super::codec::BarcodeCodec;
use super::model::{Barcode, BarcodeStatus};
use crate::error::CoreError;
use crate::notification::WarrantyEvent;
use crate::ports::{BarcodeStore, Clock, NotificationSink};
use crate::types::{DbId, Timestamp};

/// Statuses from which a barcode expires automatically.
pub const AUTO_EXPIRING_STATUSES: &[BarcodeStatus] = &[
    BarcodeStatus::Generated,
    BarcodeStatus::Distributed,
    BarcodeStatus::Activated,
];

/// Maximum length of the free-text distribution and purchase fields.
pub const MAX_DISTRIBUTION_FIELD_LENGTH: usize = 500;

// ---------------------------------------------------------------------------
// Transition rules
// ---------------------------------------------------------------------------

/// Statuses reachable from `from` in one step.
pub fn valid_transitions(from: BarcodeStatus) -> &'static [BarcodeStatus] {
    use BarcodeStatus::*;
    match from {
        Generated => &[Distributed, Activated, Expired],
        Distributed => &[Activated, Expired],
        Activated => &[Used, Expired],
        Used => &[Expired],
        Expired => &[],
    }
}

pub fn validate_transition(from: BarcodeStatus, to: BarcodeStatus) -> Result<(), CoreError> {
    if valid_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "barcode",
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// `purchase_date + months`, in calendar months.
///
/// Month ends clamp: 2024-01-31 + 1 month is 2024-02-29.
pub fn compute_expiry(purchase_date: NaiveDate, months: i32) -> Result<NaiveDate, CoreError> {
    let months = u32::try_from(months)
        .ok()
        .filter(|m| *m > 0)
        .ok_or_else(|| {
            CoreError::Validation(format!(
                "warranty_period_months must be at least 1 (got {months})"
            ))
        })?;
    purchase_date
        .checked_add_months(Months::new(months))
        .ok_or_else(|| CoreError::Validation("Warranty expiry date out of range".to_string()))
}

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input for handing a barcode to a distributor.
#[derive(Debug, Clone, Default)]
pub struct DistributeRequest {
    pub recipient: String,
    pub batch_id: Option<DbId>,
    pub notes: Option<String>,
}

/// Input for binding a barcode to a customer purchase.
#[derive(Debug, Clone)]
pub struct ActivationRequest {
    pub customer_id: DbId,
    pub purchase_date: NaiveDate,
    pub purchase_location: Option<String>,
    pub purchase_invoice: Option<String>,
}

fn check_length(field: &str, value: Option<&str>) -> Result<(), CoreError> {
    if value.is_some_and(|v| v.len() > MAX_DISTRIBUTION_FIELD_LENGTH) {
        return Err(CoreError::Validation(format!(
            "{field} exceeds maximum length of {MAX_DISTRIBUTION_FIELD_LENGTH} characters"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entity transitions
// ---------------------------------------------------------------------------

impl Barcode {
    fn transition(&mut self, to: BarcodeStatus, now: Timestamp) -> Result<(), CoreError> {
        validate_transition(self.status, to)?;
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    /// `generated -> distributed`.
    pub fn mark_distributed(
        &mut self,
        req: &DistributeRequest,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        if req.recipient.trim().is_empty() {
            return Err(CoreError::Validation(
                "Distribution recipient must not be empty".to_string(),
            ));
        }
        check_length("distributed_to", Some(&req.recipient))?;
        check_length("distribution_notes", req.notes.as_deref())?;
        self.transition(BarcodeStatus::Distributed, now)?;
        self.distributed_at = Some(now);
        self.distributed_to = Some(req.recipient.trim().to_string());
        self.distribution_notes = req.notes.clone();
        if req.batch_id.is_some() {
            self.batch_id = req.batch_id;
        }
        Ok(())
    }

    /// `generated | distributed -> activated`, fixing the expiry date.
    pub fn activate(&mut self, req: &ActivationRequest, now: Timestamp) -> Result<(), CoreError> {
        check_length("purchase_location", req.purchase_location.as_deref())?;
        check_length("purchase_invoice", req.purchase_invoice.as_deref())?;
        if req.purchase_date > now.date_naive() {
            return Err(CoreError::Validation(format!(
                "Purchase date {} is in the future",
                req.purchase_date
            )));
        }
        let expiry = compute_expiry(req.purchase_date, self.warranty_period_months)?;

        self.transition(BarcodeStatus::Activated, now)?;
        self.activated_at = Some(now);
        self.customer_id = Some(req.customer_id);
        self.purchase_date = Some(req.purchase_date);
        self.purchase_location = req.purchase_location.clone();
        self.purchase_invoice = req.purchase_invoice.clone();
        self.expiry_date = Some(expiry);
        Ok(())
    }

    /// `activated -> used`.
    pub fn mark_used(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.transition(BarcodeStatus::Used, now)
    }

    /// Expire the barcode if its warranty has lapsed.
    ///
    /// Idempotent. `used` barcodes are left alone: the claim that consumed
    /// them owns further state. Returns whether the status changed.
    pub fn apply_expiry(&mut self, now: Timestamp) -> bool {
        let lapsed = self
            .expiry_date
            .is_some_and(|expiry| expiry < now.date_naive());
        if lapsed && AUTO_EXPIRING_STATUSES.contains(&self.status) {
            self.status = BarcodeStatus::Expired;
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    /// Whether a claim may be opened against this barcode at `now`.
    pub fn is_claimable(&self, now: Timestamp) -> bool {
        self.status == BarcodeStatus::Activated
            && self
                .expiry_date
                .is_some_and(|expiry| expiry >= now.date_naive())
    }

    /// Whole days of warranty left at `now` (negative once lapsed).
    pub fn days_remaining(&self, now: Timestamp) -> Option<i64> {
        self.expiry_date
            .map(|expiry| (expiry - now.date_naive()).num_days())
    }
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Applies lifecycle transitions to persisted barcodes.
pub struct BarcodeLifecycle {
    codec: BarcodeCodec,
    barcodes: Arc<dyn BarcodeStore>,
    clock: Arc<dyn Clock>,
    notifier: Arc<dyn NotificationSink>,
}

impl BarcodeLifecycle {
    pub fn new(
        codec: BarcodeCodec,
        barcodes: Arc<dyn BarcodeStore>,
        clock: Arc<dyn Clock>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            codec,
            barcodes,
            clock,
            notifier,
        }
    }

    /// Look a barcode up by its (possibly untidy) scanned number.
    pub async fn lookup(&self, number: &str) -> Result<Barcode, CoreError> {
        let number = BarcodeCodec::normalize(number);
        self.codec.validate(&number)?;
        self.barcodes
            .find_by_number(&number)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "barcode",
                key: number,
            })
    }

    pub async fn mark_distributed(
        &self,
        number: &str,
        req: &DistributeRequest,
    ) -> Result<Barcode, CoreError> {
        let mut barcode = self.lookup(number).await?;
        let from = barcode.status;
        barcode.mark_distributed(req, self.clock.now())?;
        let saved = self.barcodes.save(&barcode, from).await?;
        tracing::debug!(barcode = %saved.barcode_number, recipient = %req.recipient, "Barcode distributed");
        Ok(saved)
    }

    /// Activate a barcode for a customer purchase.
    ///
    /// Activation with a purchase date so old that the warranty has already
    /// lapsed succeeds; the next expiry check moves it to `expired`.
    pub async fn activate(
        &self,
        number: &str,
        req: &ActivationRequest,
    ) -> Result<Barcode, CoreError> {
        let now = self.clock.now();
        let mut barcode = self.lookup(number).await?;
        let from = barcode.status;
        barcode.activate(req, now)?;
        let saved = self.barcodes.save(&barcode, from).await?;

        tracing::info!(
            barcode = %saved.barcode_number,
            customer_id = req.customer_id,
            expiry_date = ?saved.expiry_date,
            "Barcode activated"
        );
        if let Some(expiry_date) = saved.expiry_date {
            self.notifier.notify(WarrantyEvent::BarcodeActivated {
                barcode_id: saved.id,
                barcode_number: saved.barcode_number.clone(),
                storefront_id: saved.storefront_id,
                customer_id: req.customer_id,
                expiry_date,
                at: now,
            });
        }
        Ok(saved)
    }

    /// Consume an activated barcode. Of two concurrent callers only one
    /// succeeds; the other sees [`CoreError::InvalidTransition`].
    pub async fn mark_used(&self, number: &str) -> Result<Barcode, CoreError> {
        let mut barcode = self.lookup(number).await?;
        let from = barcode.status;
        barcode.mark_used(self.clock.now())?;
        self.barcodes.save(&barcode, from).await
    }

    /// Put a barcode consumed by [`mark_used`](Self::mark_used) back to the
    /// snapshot taken before, as long as nobody touched it since.
    pub(crate) async fn restore_used(&self, before: &Barcode) -> Result<Barcode, CoreError> {
        self.barcodes.save(before, BarcodeStatus::Used).await
    }

    /// Persist an expiry if the warranty has lapsed. Safe to call repeatedly.
    pub async fn check_expiry(&self, barcode: Barcode) -> Result<Barcode, CoreError> {
        let mut barcode = barcode;
        let from = barcode.status;
        if barcode.apply_expiry(self.clock.now()) {
            let saved = self.barcodes.save(&barcode, from).await?;
            tracing::info!(barcode = %saved.barcode_number, "Barcode expired");
            return Ok(saved);
        }
        Ok(barcode)
    }

    /// Whether a claim may be opened against the barcode now.
    ///
    /// Runs a best-effort expiry check first; a failure to persist the
    /// expiry is logged and does not change the answer.
    pub async fn is_claimable(&self, number: &str) -> Result<bool, CoreError> {
        let barcode = self.lookup(number).await?;
        let now = self.clock.now();
        let claimable = barcode.is_claimable(now);
        if let Err(e) = self.check_expiry(barcode).await {
            tracing::warn!(barcode = %number, error = %e, "Expiry check failed");
        }
        Ok(claimable)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
