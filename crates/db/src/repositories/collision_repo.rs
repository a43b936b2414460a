//! Repository for the append-only `barcode_collisions` table.

use rex_core::barcode::model::NewCollisionEvent;
use rex_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::barcode::CollisionRow;

const COLUMNS: &str = "id, attempted_barcode, collision_attempt, batch_id, detected_at";

pub struct CollisionRepo;

impl CollisionRepo {
    pub async fn insert(
        pool: &PgPool,
        input: &NewCollisionEvent,
    ) -> Result<CollisionRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO barcode_collisions \
                (attempted_barcode, collision_attempt, batch_id, detected_at) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, CollisionRow>(&query)
            .bind(&input.attempted_barcode)
            .bind(input.collision_attempt)
            .bind(input.batch_id)
            .bind(input.detected_at)
            .fetch_one(pool)
            .await
    }

    /// Collisions in detection order, optionally limited to one batch.
    pub async fn list(
        pool: &PgPool,
        batch_id: Option<DbId>,
    ) -> Result<Vec<CollisionRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM barcode_collisions \
             WHERE ($1::BIGINT IS NULL OR batch_id = $1) \
             ORDER BY detected_at, id"
        );
        sqlx::query_as::<_, CollisionRow>(&query)
            .bind(batch_id)
            .fetch_all(pool)
            .await
    }

    pub async fn count_since(pool: &PgPool, since: Timestamp) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM barcode_collisions WHERE detected_at >= $1")
            .bind(since)
            .fetch_one(pool)
            .await
    }
}
