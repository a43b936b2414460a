//! Barcode, batch, and collision entities.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Value of `generation_method` for every barcode issued by this engine.
pub const GENERATION_METHOD_CSPRNG: &str = "CSPRNG";

status_enum! {
    /// Lifecycle status of a warranty barcode.
    pub enum BarcodeStatus {
        /// Issued, not yet handed to anyone.
        Generated => "generated",
        /// Handed to a distributor or printed on packaging.
        Distributed => "distributed",
        /// Bound to a customer purchase.
        Activated => "activated",
        /// Consumed by a warranty claim.
        Used => "used",
        /// Warranty period elapsed.
        Expired => "expired",
    }
}

impl BarcodeStatus {
    /// No transition leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Expired)
    }
}

status_enum! {
    /// Outcome of a batch generation run.
    pub enum BatchStatus {
        InProgress => "in_progress",
        Completed => "completed",
        Partial => "partial",
        Failed => "failed",
    }
}

// ---------------------------------------------------------------------------
// Barcode
// ---------------------------------------------------------------------------

/// A persisted warranty barcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Barcode {
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

    pub status: BarcodeStatus,
    pub warranty_period_months: i32,
    pub expiry_date: Option<NaiveDate>,

    pub created_by: DbId,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// A barcode that passed the uniqueness check and awaits insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBarcode {
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
    pub warranty_period_months: i32,
    pub created_by: DbId,
}

// ---------------------------------------------------------------------------
// Batch record
// ---------------------------------------------------------------------------

/// Bookkeeping for one batch generation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchRecord {
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
    pub generation_status: BatchStatus,
    pub average_generation_time_ms: Option<f64>,
    pub intended_recipient: Option<String>,
    pub distribution_notes: Option<String>,
    pub requested_by: DbId,
}

/// DTO for opening a batch record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewBatchRecord {
    pub batch_number: String,
    pub product_id: DbId,
    pub storefront_id: DbId,
    pub requested_quantity: i32,
    pub generation_started_at: Timestamp,
    pub intended_recipient: Option<String>,
    pub distribution_notes: Option<String>,
    pub requested_by: DbId,
}

/// Final counters written when a batch record is closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchClosure {
    pub generated_quantity: i32,
    pub failed_quantity: i32,
    pub collision_count: i32,
    pub retry_count: i32,
    pub generation_completed_at: Timestamp,
    pub generation_status: BatchStatus,
    pub average_generation_time_ms: f64,
}

// ---------------------------------------------------------------------------
// Collision events
// ---------------------------------------------------------------------------

/// A candidate barcode that already existed. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub id: DbId,
    pub attempted_barcode: String,
    pub collision_attempt: i32,
    pub batch_id: Option<DbId>,
    pub detected_at: Timestamp,
}

/// DTO for logging a collision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCollisionEvent {
    pub attempted_barcode: String,
    pub collision_attempt: i32,
    pub batch_id: Option<DbId>,
    pub detected_at: Timestamp,
}
