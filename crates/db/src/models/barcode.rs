//! Rows of `barcodes`, `barcode_batches`, and `barcode_collisions`.

use chrono::NaiveDate;
use rex_core::barcode::model::{Barcode, BatchRecord, CollisionEvent};
use rex_core::error::CoreError;
use rex_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `barcodes` table.
#[derive(Debug, Clone, FromRow)]
pub struct BarcodeRow {
    pub id: DbId,
    pub barcode_number: String,
    pub storefront_id: DbId,
    pub product_id: DbId,
    pub generated_at: Timestamp,
    pub generation_method: String,
    pub entropy_bits: i32,
    pub generation_attempt: i32,
    pub collision_checked: bool,
    pub batch_id: Option<DbId>,
    pub batch_number: Option<String>,
    pub distributed_at: Option<Timestamp>,
    pub distributed_to: Option<String>,
    pub distribution_notes: Option<String>,
    pub activated_at: Option<Timestamp>,
    pub customer_id: Option<DbId>,
    pub purchase_date: Option<NaiveDate>,
    pub purchase_location: Option<String>,
    pub purchase_invoice: Option<String>,
    pub status: String,
    pub warranty_period_months: i32,
    pub expiry_date: Option<NaiveDate>,
    pub created_by: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<BarcodeRow> for Barcode {
    type Error = CoreError;

    fn try_from(row: BarcodeRow) -> Result<Self, Self::Error> {
        Ok(Barcode {
            status: row.status.parse()?,
            id: row.id,
            barcode_number: row.barcode_number,
            storefront_id: row.storefront_id,
            product_id: row.product_id,
            generated_at: row.generated_at,
            generation_method: row.generation_method,
            entropy_bits: row.entropy_bits,
            generation_attempt: row.generation_attempt,
            collision_checked: row.collision_checked,
            batch_id: row.batch_id,
            batch_number: row.batch_number,
            distributed_at: row.distributed_at,
            distributed_to: row.distributed_to,
            distribution_notes: row.distribution_notes,
            activated_at: row.activated_at,
            customer_id: row.customer_id,
            purchase_date: row.purchase_date,
            purchase_location: row.purchase_location,
            purchase_invoice: row.purchase_invoice,
            warranty_period_months: row.warranty_period_months,
            expiry_date: row.expiry_date,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A row from the `barcode_batches` table.
#[derive(Debug, Clone, FromRow)]
pub struct BatchRow {
    pub id: DbId,
    pub batch_number: String,
    pub product_id: DbId,
    pub storefront_id: DbId,
    pub requested_quantity: i32,
    pub generated_quantity: i32,
    pub failed_quantity: i32,
    pub collision_count: i32,
    pub retry_count: i32,
    pub generation_started_at: Timestamp,
    pub generation_completed_at: Option<Timestamp>,
    pub generation_status: String,
    pub average_generation_time_ms: Option<f64>,
    pub intended_recipient: Option<String>,
    pub distribution_notes: Option<String>,
    pub requested_by: DbId,
}

impl TryFrom<BatchRow> for BatchRecord {
    type Error = CoreError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        Ok(BatchRecord {
            generation_status: row.generation_status.parse()?,
            id: row.id,
            batch_number: row.batch_number,
            product_id: row.product_id,
            storefront_id: row.storefront_id,
            requested_quantity: row.requested_quantity,
            generated_quantity: row.generated_quantity,
            failed_quantity: row.failed_quantity,
            collision_count: row.collision_count,
            retry_count: row.retry_count,
            generation_started_at: row.generation_started_at,
            generation_completed_at: row.generation_completed_at,
            average_generation_time_ms: row.average_generation_time_ms,
            intended_recipient: row.intended_recipient,
            distribution_notes: row.distribution_notes,
            requested_by: row.requested_by,
        })
    }
}

/// A row from the append-only `barcode_collisions` table.
#[derive(Debug, Clone, FromRow)]
pub struct CollisionRow {
    pub id: DbId,
    pub attempted_barcode: String,
    pub collision_attempt: i32,
    pub batch_id: Option<DbId>,
    pub detected_at: Timestamp,
}

impl From<CollisionRow> for CollisionEvent {
    fn from(row: CollisionRow) -> Self {
        CollisionEvent {
            id: row.id,
            attempted_barcode: row.attempted_barcode,
            collision_attempt: row.collision_attempt,
            batch_id: row.batch_id,
            detected_at: row.detected_at,
        }
    }
}
