//! Repository for the `barcodes` table.

use chrono::NaiveDate;
use rex_core::barcode::lifecycle::AUTO_EXPIRING_STATUSES;
use rex_core::barcode::model::{Barcode, BarcodeStatus, NewBarcode};
use rex_core::types::DbId;
use sqlx::{PgConnection, PgPool};

use crate::models::barcode::BarcodeRow;

/// Column list for `barcodes` queries.
const COLUMNS: &str = "\
    id, barcode_number, storefront_id, product_id, \
    generated_at, generation_method, entropy_bits, generation_attempt, collision_checked, \
    batch_id, batch_number, distributed_at, distributed_to, distribution_notes, \
    activated_at, customer_id, purchase_date, purchase_location, purchase_invoice, \
    status, warranty_period_months, expiry_date, \
    created_by, created_at, updated_at";

/// Provides persistence for warranty barcodes.
pub struct BarcodeRepo;

impl BarcodeRepo {
    /// Insert a freshly generated barcode in `generated` state.
    ///
    /// Takes a connection so bulk inserts can share one transaction.
    pub async fn insert(
        conn: &mut PgConnection,
        input: &NewBarcode,
    ) -> Result<BarcodeRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO barcodes \
                (barcode_number, storefront_id, product_id, generated_at, generation_method, \
                 entropy_bits, generation_attempt, collision_checked, batch_id, batch_number, \
                 warranty_period_months, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $4, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BarcodeRow>(&query)
            .bind(&input.barcode_number)
            .bind(input.storefront_id)
            .bind(input.product_id)
            .bind(input.generated_at)
            .bind(&input.generation_method)
            .bind(input.entropy_bits)
            .bind(input.generation_attempt)
            .bind(input.collision_checked)
            .bind(input.batch_id)
            .bind(&input.batch_number)
            .bind(input.warranty_period_months)
            .bind(input.created_by)
            .fetch_one(conn)
            .await
    }

    /// Insert every barcode in a single transaction. A failure on any row
    /// rolls back the whole set.
    pub async fn insert_many(
        pool: &PgPool,
        inputs: &[NewBarcode],
    ) -> Result<Vec<BarcodeRow>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let mut rows = Vec::with_capacity(inputs.len());
        for input in inputs {
            rows.push(Self::insert(&mut tx, input).await?);
        }
        tx.commit().await?;
        Ok(rows)
    }

    pub async fn find_by_number(
        pool: &PgPool,
        number: &str,
    ) -> Result<Option<BarcodeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM barcodes WHERE barcode_number = $1");
        sqlx::query_as::<_, BarcodeRow>(&query)
            .bind(number)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<BarcodeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM barcodes WHERE id = $1");
        sqlx::query_as::<_, BarcodeRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn number_exists(pool: &PgPool, number: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM barcodes WHERE barcode_number = $1)")
            .bind(number)
            .fetch_one(pool)
            .await
    }

    /// Write the lifecycle columns of an existing barcode whose stored
    /// status is still `expected`. Returns `None` if no such row exists.
    pub async fn update_lifecycle(
        pool: &PgPool,
        barcode: &Barcode,
        expected: BarcodeStatus,
    ) -> Result<Option<BarcodeRow>, sqlx::Error> {
        let query = format!(
            "UPDATE barcodes SET \
                status = $2, distributed_at = $3, distributed_to = $4, distribution_notes = $5, \
                activated_at = $6, customer_id = $7, purchase_date = $8, \
                purchase_location = $9, purchase_invoice = $10, expiry_date = $11, \
                updated_at = $12 \
             WHERE id = $1 AND status = $13 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, BarcodeRow>(&query)
            .bind(barcode.id)
            .bind(barcode.status.as_str())
            .bind(barcode.distributed_at)
            .bind(&barcode.distributed_to)
            .bind(&barcode.distribution_notes)
            .bind(barcode.activated_at)
            .bind(barcode.customer_id)
            .bind(barcode.purchase_date)
            .bind(&barcode.purchase_location)
            .bind(&barcode.purchase_invoice)
            .bind(barcode.expiry_date)
            .bind(barcode.updated_at)
            .bind(expected.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Barcodes past their expiry date that are still in an auto-expiring
    /// status, oldest expiry first.
    pub async fn list_due_for_expiry(
        pool: &PgPool,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<BarcodeRow>, sqlx::Error> {
        let statuses: Vec<&str> = AUTO_EXPIRING_STATUSES.iter().map(|s| s.as_str()).collect();
        let query = format!(
            "SELECT {COLUMNS} FROM barcodes \
             WHERE status = ANY($1) AND expiry_date < $2 \
             ORDER BY expiry_date, id \
             LIMIT $3"
        );
        sqlx::query_as::<_, BarcodeRow>(&query)
            .bind(statuses)
            .bind(today)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
