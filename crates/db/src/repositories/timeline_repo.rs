//! Repository for the append-only `claim_timeline` table.
//!
//! Rows are only ever inserted.

use rex_core::claim::status::ClaimStatus;
use rex_core::claim::timeline::NewTimelineEntry;
use rex_core::types::DbId;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::timeline::TimelineRow;

const COLUMNS: &str = "\
    id, claim_id, event_type, from_status, to_status, actor_id, actor_type, \
    description, metadata, is_customer_visible, created_at";

pub struct TimelineRepo;

impl TimelineRepo {
    pub async fn insert(
        conn: &mut PgConnection,
        entry: &NewTimelineEntry,
    ) -> Result<TimelineRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO claim_timeline \
                (claim_id, event_type, from_status, to_status, actor_id, actor_type, \
                 description, metadata, is_customer_visible, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, TimelineRow>(&query)
            .bind(entry.claim_id)
            .bind(entry.event_type.as_str())
            .bind(entry.from_status.map(ClaimStatus::as_str))
            .bind(entry.to_status.map(ClaimStatus::as_str))
            .bind(entry.actor_id)
            .bind(entry.actor_type.as_str())
            .bind(&entry.description)
            .bind(Json(&entry.metadata))
            .bind(entry.is_customer_visible)
            .bind(entry.created_at)
            .fetch_one(conn)
            .await
    }

    /// Entries of a claim in chronological order (ties broken by id).
    pub async fn list_for_claim(
        pool: &PgPool,
        claim_id: DbId,
        customer_visible_only: bool,
    ) -> Result<Vec<TimelineRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM claim_timeline \
             WHERE claim_id = $1 AND ($2 = FALSE OR is_customer_visible) \
             ORDER BY created_at, id"
        );
        sqlx::query_as::<_, TimelineRow>(&query)
            .bind(claim_id)
            .bind(customer_visible_only)
            .fetch_all(pool)
            .await
    }
}
