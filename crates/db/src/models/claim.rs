//! Row of the `claims` table.

use chrono::NaiveDate;
use rex_core::claim::model::{Address, Claim, CustomerSnapshot};
use rex_core::error::CoreError;
use rex_core::types::{DbId, Money, Timestamp};
use sqlx::types::Json;
use sqlx::FromRow;

use super::parse_opt;

/// A row from the `claims` table. The customer snapshot is flattened into
/// `customer_*` columns plus a JSONB `pickup_address`.
#[derive(Debug, Clone, FromRow)]
pub struct ClaimRow {
    pub id: DbId,
    pub claim_number: String,
    pub storefront_id: DbId,
    pub customer_id: DbId,
    pub product_id: DbId,
    pub barcode_id: DbId,
    pub issue_description: String,
    pub issue_category: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub severity: String,
    pub priority: String,
    pub tags: Vec<String>,
    pub claim_date: Timestamp,
    pub status: String,
    pub previous_status: Option<String>,
    pub status_updated_at: Timestamp,
    pub status_updated_by: Option<DbId>,
    pub validated_at: Option<Timestamp>,
    pub validated_by: Option<DbId>,
    pub completed_at: Option<Timestamp>,
    pub assigned_technician_id: Option<DbId>,
    pub estimated_completion_date: Option<NaiveDate>,
    pub actual_completion_date: Option<Timestamp>,
    pub resolution_type: Option<String>,
    pub repair_notes: Option<String>,
    pub replacement_product_id: Option<DbId>,
    pub refund_amount: Option<Money>,
    pub rejection_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub dispute_reason: Option<String>,
    pub repair_cost: Option<Money>,
    pub shipping_cost: Option<Money>,
    pub replacement_cost: Option<Money>,
    pub total_cost: Money,
    pub shipping_provider: Option<String>,
    pub tracking_number: Option<String>,
    pub estimated_delivery_date: Option<NaiveDate>,
    pub actual_delivery_date: Option<Timestamp>,
    pub delivery_status: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub pickup_address: Json<Address>,
    pub customer_feedback: Option<String>,
    pub customer_satisfaction_rating: Option<i16>,
    pub version: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ClaimRow> for Claim {
    type Error = CoreError;

    fn try_from(row: ClaimRow) -> Result<Self, Self::Error> {
        Ok(Claim {
            severity: row.severity.parse()?,
            priority: row.priority.parse()?,
            status: row.status.parse()?,
            previous_status: parse_opt(row.previous_status.as_deref())?,
            resolution_type: parse_opt(row.resolution_type.as_deref())?,
            delivery_status: row.delivery_status.parse()?,
            id: row.id,
            claim_number: row.claim_number,
            storefront_id: row.storefront_id,
            customer_id: row.customer_id,
            product_id: row.product_id,
            barcode_id: row.barcode_id,
            issue_description: row.issue_description,
            issue_category: row.issue_category,
            issue_date: row.issue_date,
            tags: row.tags,
            claim_date: row.claim_date,
            status_updated_at: row.status_updated_at,
            status_updated_by: row.status_updated_by,
            validated_at: row.validated_at,
            validated_by: row.validated_by,
            completed_at: row.completed_at,
            assigned_technician_id: row.assigned_technician_id,
            estimated_completion_date: row.estimated_completion_date,
            actual_completion_date: row.actual_completion_date,
            repair_notes: row.repair_notes,
            replacement_product_id: row.replacement_product_id,
            refund_amount: row.refund_amount,
            rejection_reason: row.rejection_reason,
            cancellation_reason: row.cancellation_reason,
            dispute_reason: row.dispute_reason,
            repair_cost: row.repair_cost,
            shipping_cost: row.shipping_cost,
            replacement_cost: row.replacement_cost,
            total_cost: row.total_cost,
            shipping_provider: row.shipping_provider,
            tracking_number: row.tracking_number,
            estimated_delivery_date: row.estimated_delivery_date,
            actual_delivery_date: row.actual_delivery_date,
            customer: CustomerSnapshot {
                name: row.customer_name,
                email: row.customer_email,
                phone: row.customer_phone,
                pickup_address: row.pickup_address.0,
            },
            customer_feedback: row.customer_feedback,
            customer_satisfaction_rating: row.customer_satisfaction_rating,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
