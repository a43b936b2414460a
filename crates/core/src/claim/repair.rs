//! Repair tickets: the technician-side work item nested in a claim.
//!
//! ```text
//! assigned -> in_progress <-> waiting_parts
//! in_progress -> completed | failed | cancelled
//! waiting_parts -> failed | cancelled
//! assigned -> cancelled
//! ```

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::model::{add_money, mul_money, validate_money, MONEY_SCALE};
use crate::error::CoreError;
use crate::types::{DbId, Money, Timestamp};

status_enum! {
    pub enum RepairStatus {
        Assigned => "assigned",
        InProgress => "in_progress",
        WaitingParts => "waiting_parts",
        Completed => "completed",
        Failed => "failed",
        Cancelled => "cancelled",
    }
}

impl RepairStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    pub fn valid_transitions(self) -> &'static [RepairStatus] {
        use RepairStatus::*;
        match self {
            Assigned => &[InProgress, Cancelled],
            InProgress => &[WaitingParts, Completed, Failed, Cancelled],
            WaitingParts => &[InProgress, Failed, Cancelled],
            Completed | Failed | Cancelled => &[],
        }
    }
}

pub fn validate_repair_transition(from: RepairStatus, to: RepairStatus) -> Result<(), CoreError> {
    if from.valid_transitions().contains(&to) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "repair_ticket",
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

status_enum! {
    pub enum PhotoKind {
        Before => "before",
        After => "after",
        Process => "process",
    }
}

/// Largest value of the `labor_hours` column (`NUMERIC(8, 2)`).
pub fn max_labor_hours() -> Decimal {
    Decimal::new(99_999_999, 2)
}

/// A part consumed by the repair. `total_cost = quantity * unit_cost`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartUsage {
    pub part_number: String,
    pub name: String,
    pub quantity: i32,
    pub unit_cost: Money,
    pub total_cost: Money,
}

impl PartUsage {
    pub fn new(
        part_number: &str,
        name: &str,
        quantity: i32,
        unit_cost: Money,
    ) -> Result<Self, CoreError> {
        if part_number.trim().is_empty() || name.trim().is_empty() {
            return Err(CoreError::Validation(
                "Part number and name are required".to_string(),
            ));
        }
        if quantity < 1 {
            return Err(CoreError::Validation(format!(
                "Part quantity must be at least 1 (got {quantity})"
            )));
        }
        validate_money("unit_cost", unit_cost)?;
        let total_cost = mul_money("Part total_cost", unit_cost, Decimal::from(quantity))?;
        Ok(Self {
            part_number: part_number.trim().to_string(),
            name: name.trim().to_string(),
            quantity,
            unit_cost,
            total_cost,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairStep {
    pub step_number: i32,
    pub description: String,
    pub performed_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub name: String,
    pub passed: bool,
    pub notes: Option<String>,
    pub tested_at: Timestamp,
}

/// A persisted repair ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepairTicket {
    pub id: DbId,
    pub claim_id: DbId,
    pub technician_id: DbId,
    pub assigned_at: Timestamp,
    pub start_date: Option<Timestamp>,
    pub target_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<Timestamp>,
    pub status: RepairStatus,

    pub diagnosis: Option<String>,
    pub repair_steps: Vec<RepairStep>,
    pub parts_used: Vec<PartUsage>,
    pub labor_hours: Decimal,
    pub hourly_rate: Option<Money>,
    pub parts_cost: Money,
    pub labor_cost: Money,
    pub total_cost: Money,

    pub quality_check_passed: Option<bool>,
    pub quality_check_notes: Option<String>,
    pub test_results: Vec<TestResult>,
    pub before_photos: Vec<String>,
    pub after_photos: Vec<String>,
    pub process_photos: Vec<String>,

    pub outcome_notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for opening a ticket in `assigned`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRepairTicket {
    pub claim_id: DbId,
    pub technician_id: DbId,
    pub assigned_at: Timestamp,
    pub target_completion_date: Option<NaiveDate>,
}

impl NewRepairTicket {
    pub fn into_ticket(self, id: DbId) -> RepairTicket {
        RepairTicket {
            id,
            claim_id: self.claim_id,
            technician_id: self.technician_id,
            assigned_at: self.assigned_at,
            start_date: None,
            target_completion_date: self.target_completion_date,
            actual_completion_date: None,
            status: RepairStatus::Assigned,
            diagnosis: None,
            repair_steps: Vec::new(),
            parts_used: Vec::new(),
            labor_hours: Decimal::ZERO,
            hourly_rate: None,
            parts_cost: Money::ZERO,
            labor_cost: Money::ZERO,
            total_cost: Money::ZERO,
            quality_check_passed: None,
            quality_check_notes: None,
            test_results: Vec::new(),
            before_photos: Vec::new(),
            after_photos: Vec::new(),
            process_photos: Vec::new(),
            outcome_notes: None,
            created_at: self.assigned_at,
            updated_at: self.assigned_at,
        }
    }
}

impl RepairTicket {
    fn transition(&mut self, to: RepairStatus, now: Timestamp) -> Result<(), CoreError> {
        validate_repair_transition(self.status, to)?;
        self.status = to;
        self.updated_at = now;
        Ok(())
    }

    fn ensure_open(&self) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::Validation(format!(
                "Repair ticket {} is {} and can no longer change",
                self.id, self.status
            )));
        }
        Ok(())
    }

    /// Recompute `parts_cost`, `labor_cost`, and `total_cost`. Nothing
    /// changes if a sum no longer fits a money column.
    pub fn recompute_costs(&mut self) -> Result<(), CoreError> {
        let parts_cost = self
            .parts_used
            .iter()
            .try_fold(Money::ZERO, |sum, p| add_money("parts_cost", sum, p.total_cost))?;
        let labor_cost = match self.hourly_rate {
            Some(rate) => mul_money("labor_cost", rate, self.labor_hours)?,
            None => Money::ZERO,
        };
        self.total_cost = add_money("Repair total_cost", parts_cost, labor_cost)?;
        self.parts_cost = parts_cost;
        self.labor_cost = labor_cost;
        Ok(())
    }

    /// `assigned -> in_progress`. A diagnosis is required from here on.
    pub fn begin_work(&mut self, diagnosis: &str, now: Timestamp) -> Result<(), CoreError> {
        let diagnosis = diagnosis.trim();
        if diagnosis.is_empty() {
            return Err(CoreError::Validation(
                "A diagnosis is required to start work".to_string(),
            ));
        }
        if self.status != RepairStatus::Assigned {
            return Err(CoreError::InvalidTransition {
                entity: "repair_ticket",
                from: self.status.to_string(),
                to: RepairStatus::InProgress.to_string(),
            });
        }
        self.transition(RepairStatus::InProgress, now)?;
        self.diagnosis = Some(diagnosis.to_string());
        self.start_date = Some(now);
        Ok(())
    }

    /// `in_progress -> waiting_parts`.
    pub fn wait_for_parts(&mut self, now: Timestamp) -> Result<(), CoreError> {
        self.transition(RepairStatus::WaitingParts, now)
    }

    /// `waiting_parts -> in_progress`.
    pub fn resume(&mut self, now: Timestamp) -> Result<(), CoreError> {
        if self.status != RepairStatus::WaitingParts {
            return Err(CoreError::InvalidTransition {
                entity: "repair_ticket",
                from: self.status.to_string(),
                to: RepairStatus::InProgress.to_string(),
            });
        }
        self.transition(RepairStatus::InProgress, now)
    }

    pub fn add_step(&mut self, description: &str, now: Timestamp) -> Result<(), CoreError> {
        self.ensure_open()?;
        if description.trim().is_empty() {
            return Err(CoreError::Validation(
                "Repair step description is required".to_string(),
            ));
        }
        let step_number = self.repair_steps.len() as i32 + 1;
        self.repair_steps.push(RepairStep {
            step_number,
            description: description.trim().to_string(),
            performed_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn add_part(&mut self, part: PartUsage, now: Timestamp) -> Result<(), CoreError> {
        self.ensure_open()?;
        let mut next = self.clone();
        next.parts_used.push(part);
        next.recompute_costs()?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    /// Add worked hours; `hourly_rate` replaces the current rate when given.
    pub fn log_labor(
        &mut self,
        hours: Decimal,
        hourly_rate: Option<Money>,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        self.ensure_open()?;
        if hours.is_sign_negative() && !hours.is_zero() {
            return Err(CoreError::Validation(format!(
                "Labor hours must not be negative (got {hours})"
            )));
        }
        if hours.normalize().scale() > MONEY_SCALE {
            return Err(CoreError::Validation(format!(
                "Labor hours have more than {MONEY_SCALE} decimal places (got {hours})"
            )));
        }
        let mut next = self.clone();
        if let Some(rate) = hourly_rate {
            validate_money("hourly_rate", rate)?;
            next.hourly_rate = Some(rate);
        }
        next.labor_hours = self
            .labor_hours
            .checked_add(hours)
            .filter(|total| *total <= max_labor_hours())
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Labor hours exceed the maximum of {}",
                    max_labor_hours()
                ))
            })?;
        next.recompute_costs()?;
        next.updated_at = now;
        *self = next;
        Ok(())
    }

    pub fn record_test(
        &mut self,
        name: &str,
        passed: bool,
        notes: Option<&str>,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        self.ensure_open()?;
        if name.trim().is_empty() {
            return Err(CoreError::Validation("Test name is required".to_string()));
        }
        self.test_results.push(TestResult {
            name: name.trim().to_string(),
            passed,
            notes: notes.map(str::to_string),
            tested_at: now,
        });
        self.updated_at = now;
        Ok(())
    }

    pub fn add_photo(&mut self, kind: PhotoKind, url: &str, now: Timestamp) -> Result<(), CoreError> {
        self.ensure_open()?;
        if url.trim().is_empty() {
            return Err(CoreError::Validation("Photo URL is required".to_string()));
        }
        let list = match kind {
            PhotoKind::Before => &mut self.before_photos,
            PhotoKind::After => &mut self.after_photos,
            PhotoKind::Process => &mut self.process_photos,
        };
        list.push(url.trim().to_string());
        self.updated_at = now;
        Ok(())
    }

    pub fn record_quality_check(
        &mut self,
        passed: bool,
        notes: Option<&str>,
        now: Timestamp,
    ) -> Result<(), CoreError> {
        self.ensure_open()?;
        self.quality_check_passed = Some(passed);
        self.quality_check_notes = notes.map(str::to_string);
        self.updated_at = now;
        Ok(())
    }

    /// `in_progress -> completed`. A failed quality check blocks completion.
    pub fn complete(&mut self, notes: Option<&str>, now: Timestamp) -> Result<(), CoreError> {
        if self.diagnosis.is_none() {
            return Err(CoreError::Validation(
                "Cannot complete a repair without a diagnosis".to_string(),
            ));
        }
        if self.quality_check_passed == Some(false) {
            return Err(CoreError::Validation(
                "Cannot complete a repair that failed its quality check".to_string(),
            ));
        }
        self.transition(RepairStatus::Completed, now)?;
        self.actual_completion_date = Some(now);
        self.outcome_notes = notes.map(str::to_string);
        Ok(())
    }

    /// `in_progress | waiting_parts -> failed`.
    pub fn fail(&mut self, reason: &str, now: Timestamp) -> Result<(), CoreError> {
        if reason.trim().is_empty() {
            return Err(CoreError::Validation("A failure reason is required".to_string()));
        }
        self.transition(RepairStatus::Failed, now)?;
        self.actual_completion_date = Some(now);
        self.outcome_notes = Some(reason.trim().to_string());
        Ok(())
    }

    pub fn cancel(&mut self, reason: Option<&str>, now: Timestamp) -> Result<(), CoreError> {
        self.transition(RepairStatus::Cancelled, now)?;
        self.outcome_notes = reason.map(str::to_string);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
