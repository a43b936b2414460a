//! Repository for the `claims` and `claim_sequences` tables.

use rex_core::claim::model::{Claim, DeliveryStatus, NewClaim};
use rex_core::claim::status::ClaimStatus;
use rex_core::types::DbId;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};

use crate::models::claim::ClaimRow;

/// Column list for `claims` queries.
const COLUMNS: &str = "\
    id, claim_number, storefront_id, customer_id, product_id, barcode_id, \
    issue_description, issue_category, issue_date, severity, priority, tags, claim_date, \
    status, previous_status, status_updated_at, status_updated_by, \
    validated_at, validated_by, completed_at, \
    assigned_technician_id, estimated_completion_date, actual_completion_date, \
    resolution_type, repair_notes, replacement_product_id, refund_amount, \
    rejection_reason, cancellation_reason, dispute_reason, \
    repair_cost, shipping_cost, replacement_cost, total_cost, \
    shipping_provider, tracking_number, estimated_delivery_date, actual_delivery_date, \
    delivery_status, customer_name, customer_email, customer_phone, pickup_address, \
    customer_feedback, customer_satisfaction_rating, version, created_at, updated_at";

/// Provides persistence for warranty claims.
pub struct ClaimRepo;

impl ClaimRepo {
    /// Allocate the next claim sequence number of a storefront.
    ///
    /// The upsert takes a row lock, so concurrent callers receive distinct
    /// values.
    pub async fn next_sequence(pool: &PgPool, storefront_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO claim_sequences (storefront_id, last_value) VALUES ($1, 1) \
             ON CONFLICT (storefront_id) \
             DO UPDATE SET last_value = claim_sequences.last_value + 1 \
             RETURNING last_value",
        )
        .bind(storefront_id)
        .fetch_one(pool)
        .await
    }

    /// Insert a claim in `pending` at version 1.
    pub async fn insert(
        conn: &mut PgConnection,
        input: &NewClaim,
    ) -> Result<ClaimRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO claims \
                (claim_number, storefront_id, customer_id, product_id, barcode_id, \
                 issue_description, issue_category, issue_date, severity, priority, tags, \
                 claim_date, status, status_updated_at, delivery_status, total_cost, \
                 customer_name, customer_email, customer_phone, pickup_address, \
                 version, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $12, $14, 0, \
                     $15, $16, $17, $18, 1, $12, $12) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ClaimRow>(&query)
            .bind(&input.claim_number)
            .bind(input.storefront_id)
            .bind(input.customer_id)
            .bind(input.product_id)
            .bind(input.barcode_id)
            .bind(&input.issue_description)
            .bind(&input.issue_category)
            .bind(input.issue_date)
            .bind(input.severity.as_str())
            .bind(input.priority.as_str())
            .bind(&input.tags)
            .bind(input.claim_date)
            .bind(ClaimStatus::Pending.as_str())
            .bind(DeliveryStatus::NotShipped.as_str())
            .bind(&input.customer.name)
            .bind(&input.customer.email)
            .bind(&input.customer.phone)
            .bind(Json(&input.customer.pickup_address))
            .fetch_one(conn)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<ClaimRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM claims WHERE id = $1");
        sqlx::query_as::<_, ClaimRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn exists(conn: &mut PgConnection, id: DbId) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM claims WHERE id = $1)")
            .bind(id)
            .fetch_one(conn)
            .await
    }

    /// Compare-and-swap update of every mutable claim column.
    ///
    /// Writes only when the stored `version` equals `expected_version` and
    /// bumps it by one. Returns `None` when no row matched (missing claim or
    /// stale version).
    pub async fn update_if_version(
        conn: &mut PgConnection,
        claim: &Claim,
        expected_version: i64,
    ) -> Result<Option<ClaimRow>, sqlx::Error> {
        let query = format!(
            "UPDATE claims SET \
                issue_category = $3, priority = $4, tags = $5, \
                status = $6, previous_status = $7, status_updated_at = $8, status_updated_by = $9, \
                validated_at = $10, validated_by = $11, completed_at = $12, \
                assigned_technician_id = $13, estimated_completion_date = $14, \
                actual_completion_date = $15, \
                resolution_type = $16, repair_notes = $17, replacement_product_id = $18, \
                refund_amount = $19, rejection_reason = $20, cancellation_reason = $21, \
                dispute_reason = $22, \
                repair_cost = $23, shipping_cost = $24, replacement_cost = $25, total_cost = $26, \
                shipping_provider = $27, tracking_number = $28, estimated_delivery_date = $29, \
                actual_delivery_date = $30, delivery_status = $31, \
                customer_feedback = $32, customer_satisfaction_rating = $33, \
                version = version + 1, updated_at = $34 \
             WHERE id = $1 AND version = $2 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ClaimRow>(&query)
            .bind(claim.id)
            .bind(expected_version)
            .bind(&claim.issue_category)
            .bind(claim.priority.as_str())
            .bind(&claim.tags)
            .bind(claim.status.as_str())
            .bind(claim.previous_status.map(ClaimStatus::as_str))
            .bind(claim.status_updated_at)
            .bind(claim.status_updated_by)
            .bind(claim.validated_at)
            .bind(claim.validated_by)
            .bind(claim.completed_at)
            .bind(claim.assigned_technician_id)
            .bind(claim.estimated_completion_date)
            .bind(claim.actual_completion_date)
            .bind(claim.resolution_type.map(|r| r.as_str()))
            .bind(&claim.repair_notes)
            .bind(claim.replacement_product_id)
            .bind(claim.refund_amount)
            .bind(&claim.rejection_reason)
            .bind(&claim.cancellation_reason)
            .bind(&claim.dispute_reason)
            .bind(claim.repair_cost)
            .bind(claim.shipping_cost)
            .bind(claim.replacement_cost)
            .bind(claim.total_cost)
            .bind(&claim.shipping_provider)
            .bind(&claim.tracking_number)
            .bind(claim.estimated_delivery_date)
            .bind(claim.actual_delivery_date)
            .bind(claim.delivery_status.as_str())
            .bind(&claim.customer_feedback)
            .bind(claim.customer_satisfaction_rating)
            .bind(claim.updated_at)
            .fetch_optional(conn)
            .await
    }
}
