//! Repository for the `repair_tickets` table.

use rex_core::claim::repair::{NewRepairTicket, RepairStatus, RepairTicket};
use rex_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::repair::RepairTicketRow;

/// Column list for `repair_tickets` queries.
const COLUMNS: &str = "\
    id, claim_id, technician_id, assigned_at, start_date, target_completion_date, \
    actual_completion_date, status, diagnosis, repair_steps, parts_used, \
    labor_hours, hourly_rate, parts_cost, labor_cost, total_cost, \
    quality_check_passed, quality_check_notes, test_results, \
    before_photos, after_photos, process_photos, outcome_notes, created_at, updated_at";

/// Terminal ticket statuses, excluded when looking for the open ticket.
const TERMINAL_STATUSES: [RepairStatus; 3] = [
    RepairStatus::Completed,
    RepairStatus::Failed,
    RepairStatus::Cancelled,
];

/// Provides persistence for repair tickets.
pub struct RepairRepo;

impl RepairRepo {
    /// Open a ticket in `assigned` state.
    pub async fn insert(
        pool: &PgPool,
        input: &NewRepairTicket,
    ) -> Result<RepairTicketRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO repair_tickets \
                (claim_id, technician_id, assigned_at, target_completion_date, status, \
                 created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $3, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RepairTicketRow>(&query)
            .bind(input.claim_id)
            .bind(input.technician_id)
            .bind(input.assigned_at)
            .bind(input.target_completion_date)
            .bind(RepairStatus::Assigned.as_str())
            .fetch_one(pool)
            .await
    }

    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<RepairTicketRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM repair_tickets WHERE id = $1");
        sqlx::query_as::<_, RepairTicketRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// The newest non-terminal ticket of a claim.
    pub async fn find_open_for_claim(
        pool: &PgPool,
        claim_id: DbId,
    ) -> Result<Option<RepairTicketRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM repair_tickets \
             WHERE claim_id = $1 AND status NOT IN ($2, $3, $4) \
             ORDER BY id DESC LIMIT 1"
        );
        sqlx::query_as::<_, RepairTicketRow>(&query)
            .bind(claim_id)
            .bind(TERMINAL_STATUSES[0].as_str())
            .bind(TERMINAL_STATUSES[1].as_str())
            .bind(TERMINAL_STATUSES[2].as_str())
            .fetch_optional(pool)
            .await
    }

    /// The most recently assigned ticket of a claim, in any status.
    pub async fn find_latest_for_claim(
        pool: &PgPool,
        claim_id: DbId,
    ) -> Result<Option<RepairTicketRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM repair_tickets \
             WHERE claim_id = $1 \
             ORDER BY assigned_at DESC, id DESC LIMIT 1"
        );
        sqlx::query_as::<_, RepairTicketRow>(&query)
            .bind(claim_id)
            .fetch_optional(pool)
            .await
    }

    /// Write every mutable column. Returns `None` if the ticket does not
    /// exist.
    pub async fn update(
        pool: &PgPool,
        ticket: &RepairTicket,
    ) -> Result<Option<RepairTicketRow>, sqlx::Error> {
        let query = format!(
            "UPDATE repair_tickets SET \
                start_date = $2, target_completion_date = $3, actual_completion_date = $4, \
                status = $5, diagnosis = $6, repair_steps = $7, parts_used = $8, \
                labor_hours = $9, hourly_rate = $10, parts_cost = $11, labor_cost = $12, \
                total_cost = $13, quality_check_passed = $14, quality_check_notes = $15, \
                test_results = $16, before_photos = $17, after_photos = $18, \
                process_photos = $19, outcome_notes = $20, updated_at = $21 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RepairTicketRow>(&query)
            .bind(ticket.id)
            .bind(ticket.start_date)
            .bind(ticket.target_completion_date)
            .bind(ticket.actual_completion_date)
            .bind(ticket.status.as_str())
            .bind(&ticket.diagnosis)
            .bind(Json(&ticket.repair_steps))
            .bind(Json(&ticket.parts_used))
            .bind(ticket.labor_hours)
            .bind(ticket.hourly_rate)
            .bind(ticket.parts_cost)
            .bind(ticket.labor_cost)
            .bind(ticket.total_cost)
            .bind(ticket.quality_check_passed)
            .bind(&ticket.quality_check_notes)
            .bind(Json(&ticket.test_results))
            .bind(&ticket.before_photos)
            .bind(&ticket.after_photos)
            .bind(&ticket.process_photos)
            .bind(&ticket.outcome_notes)
            .bind(ticket.updated_at)
            .fetch_optional(pool)
            .await
    }
}
