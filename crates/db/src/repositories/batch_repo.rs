//! Repository for the `barcode_batches` table.

use rex_core::barcode::model::{BatchClosure, BatchStatus, NewBatchRecord};
use rex_core::types::DbId;
use sqlx::PgPool;

use crate::models::barcode::BatchRow;

/// Column list for `barcode_batches` queries.
const COLUMNS: &str = "\
    id, batch_number, product_id, storefront_id, requested_quantity, \
    generated_quantity, failed_quantity, collision_count, retry_count, \
    generation_started_at, generation_completed_at, generation_status, \
    average_generation_time_ms, intended_recipient, distribution_notes, requested_by";

/// Provides persistence for barcode generation batches.
pub struct BatchRepo;

impl BatchRepo {
    /// Record the start of a batch in `in_progress` state.
    pub async fn open(pool: &PgPool, input: &NewBatchRecord) -> Result<BatchRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO barcode_batches \
                (batch_number, product_id, storefront_id, requested_quantity, \
                 generation_started_at, generation_status, intended_recipient, \
                 distribution_notes, requested_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(&input.batch_number)
            .bind(input.product_id)
            .bind(input.storefront_id)
            .bind(input.requested_quantity)
            .bind(input.generation_started_at)
            .bind(BatchStatus::InProgress.as_str())
            .bind(&input.intended_recipient)
            .bind(&input.distribution_notes)
            .bind(input.requested_by)
            .fetch_one(pool)
            .await
    }

    /// Write final counters and status. Returns `None` if the batch does
    /// not exist.
    pub async fn close(
        pool: &PgPool,
        id: DbId,
        closure: &BatchClosure,
    ) -> Result<Option<BatchRow>, sqlx::Error> {
        let query = format!(
            "UPDATE barcode_batches SET \
                generated_quantity = $2, failed_quantity = $3, collision_count = $4, \
                retry_count = $5, generation_completed_at = $6, generation_status = $7, \
                average_generation_time_ms = $8 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(id)
            .bind(closure.generated_quantity)
            .bind(closure.failed_quantity)
            .bind(closure.collision_count)
            .bind(closure.retry_count)
            .bind(closure.generation_completed_at)
            .bind(closure.generation_status.as_str())
            .bind(closure.average_generation_time_ms)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<BatchRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM barcode_batches WHERE id = $1");
        sqlx::query_as::<_, BatchRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
