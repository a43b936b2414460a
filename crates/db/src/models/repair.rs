//! Row of the `repair_tickets` table.

use chrono::NaiveDate;
use rex_core::claim::repair::{PartUsage, RepairStep, RepairTicket, TestResult};
use rex_core::error::CoreError;
use rex_core::types::{DbId, Money, Timestamp};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::FromRow;

/// A row from the `repair_tickets` table. Steps, parts, and test results
/// are JSONB arrays; photo URLs are `TEXT[]`.
#[derive(Debug, Clone, FromRow)]
pub struct RepairTicketRow {
    pub id: DbId,
    pub claim_id: DbId,
    pub technician_id: DbId,
    pub assigned_at: Timestamp,
    pub start_date: Option<Timestamp>,
    pub target_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<Timestamp>,
    pub status: String,
    pub diagnosis: Option<String>,
    pub repair_steps: Json<Vec<RepairStep>>,
    pub parts_used: Json<Vec<PartUsage>>,
    pub labor_hours: Decimal,
    pub hourly_rate: Option<Money>,
    pub parts_cost: Money,
    pub labor_cost: Money,
    pub total_cost: Money,
    pub quality_check_passed: Option<bool>,
    pub quality_check_notes: Option<String>,
    pub test_results: Json<Vec<TestResult>>,
    pub before_photos: Vec<String>,
    pub after_photos: Vec<String>,
    pub process_photos: Vec<String>,
    pub outcome_notes: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<RepairTicketRow> for RepairTicket {
    type Error = CoreError;

    fn try_from(row: RepairTicketRow) -> Result<Self, Self::Error> {
        Ok(RepairTicket {
            status: row.status.parse()?,
            id: row.id,
            claim_id: row.claim_id,
            technician_id: row.technician_id,
            assigned_at: row.assigned_at,
            start_date: row.start_date,
            target_completion_date: row.target_completion_date,
            actual_completion_date: row.actual_completion_date,
            diagnosis: row.diagnosis,
            repair_steps: row.repair_steps.0,
            parts_used: row.parts_used.0,
            labor_hours: row.labor_hours,
            hourly_rate: row.hourly_rate,
            parts_cost: row.parts_cost,
            labor_cost: row.labor_cost,
            total_cost: row.total_cost,
            quality_check_passed: row.quality_check_passed,
            quality_check_notes: row.quality_check_notes,
            test_results: row.test_results.0,
            before_photos: row.before_photos,
            after_photos: row.after_photos,
            process_photos: row.process_photos,
            outcome_notes: row.outcome_notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
