//! PostgreSQL implementation of the `rex_core` store ports.

use async_trait::async_trait;
use chrono::NaiveDate;
use rex_core::barcode::model::{
    Barcode, BarcodeStatus, BatchClosure, BatchRecord, CollisionEvent, NewBarcode, NewBatchRecord,
    NewCollisionEvent,
};
use rex_core::claim::model::{Claim, NewClaim};
use rex_core::claim::repair::{NewRepairTicket, RepairTicket};
use rex_core::claim::timeline::{NewTimelineEntry, TimelineEntry};
use rex_core::error::CoreError;
use rex_core::ports::{
    BarcodeStore, BatchStore, ClaimStore, CollisionStore, RepairStore, TimelineStore,
};
use rex_core::types::{DbId, Timestamp};
use sqlx::{PgConnection, PgPool};

use crate::error::{corrupt_row, map_db_error};
use crate::repositories::{
    BarcodeRepo, BatchRepo, ClaimRepo, CollisionRepo, RepairRepo, TimelineRepo,
};

/// Convert a row into its domain type, reporting undecodable rows as
/// [`CoreError::Internal`].
fn decode<R, T>(entity: &'static str, row: R) -> Result<T, CoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    T::try_from(row).map_err(|e| corrupt_row(entity, e))
}

fn decode_all<R, T>(entity: &'static str, rows: Vec<R>) -> Result<Vec<T>, CoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(|row| decode(entity, row)).collect()
}

/// Every warranty store port over one connection pool.
#[derive(Clone)]
pub struct PgWarrantyStore {
    pool: PgPool,
}

impl PgWarrantyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert timeline entries for `claim_id` on an open transaction.
    async fn insert_entries(
        conn: &mut PgConnection,
        claim_id: DbId,
        entries: &[NewTimelineEntry],
    ) -> Result<Vec<TimelineEntry>, CoreError> {
        let mut stored = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut entry = entry.clone();
            entry.claim_id = claim_id;
            let row = TimelineRepo::insert(conn, &entry)
                .await
                .map_err(|e| map_db_error("claim", claim_id, e))?;
            stored.push(decode("timeline_entry", row)?);
        }
        Ok(stored)
    }
}

// ---------------------------------------------------------------------------
// Barcodes
// ---------------------------------------------------------------------------

#[async_trait]
impl BarcodeStore for PgWarrantyStore {
    async fn insert(&self, barcode: &NewBarcode) -> Result<Barcode, CoreError> {
        let key = &barcode.barcode_number;
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_db_error("barcode", key, e))?;
        let row = BarcodeRepo::insert(&mut conn, barcode)
            .await
            .map_err(|e| map_db_error("barcode", key, e))?;
        decode("barcode", row)
    }

    async fn insert_many(&self, barcodes: &[NewBarcode]) -> Result<Vec<Barcode>, CoreError> {
        let key = format!("bulk insert of {}", barcodes.len());
        let rows = BarcodeRepo::insert_many(&self.pool, barcodes)
            .await
            .map_err(|e| map_db_error("barcode", &key, e))?;
        decode_all("barcode", rows)
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<Barcode>, CoreError> {
        BarcodeRepo::find_by_number(&self.pool, number)
            .await
            .map_err(|e| map_db_error("barcode", number, e))?
            .map(|row| decode("barcode", row))
            .transpose()
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Barcode>, CoreError> {
        BarcodeRepo::find_by_id(&self.pool, id)
            .await
            .map_err(|e| map_db_error("barcode", id, e))?
            .map(|row| decode("barcode", row))
            .transpose()
    }

    async fn is_unique(&self, number: &str) -> Result<bool, CoreError> {
        let exists = BarcodeRepo::number_exists(&self.pool, number)
            .await
            .map_err(|e| map_db_error("barcode", number, e))?;
        Ok(!exists)
    }

    async fn save(
        &self,
        barcode: &Barcode,
        expected: BarcodeStatus,
    ) -> Result<Barcode, CoreError> {
        let updated = BarcodeRepo::update_lifecycle(&self.pool, barcode, expected)
            .await
            .map_err(|e| map_db_error("barcode", &barcode.barcode_number, e))?;
        if let Some(row) = updated {
            return decode("barcode", row);
        }
        match BarcodeStore::find_by_id(self, barcode.id).await? {
            Some(current) => Err(CoreError::InvalidTransition {
                entity: "barcode",
                from: current.status.to_string(),
                to: barcode.status.to_string(),
            }),
            None => Err(CoreError::not_found("barcode", barcode.id)),
        }
    }

    async fn list_due_for_expiry(
        &self,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Barcode>, CoreError> {
        let rows = BarcodeRepo::list_due_for_expiry(&self.pool, today, limit)
            .await
            .map_err(|e| map_db_error("barcode", today, e))?;
        decode_all("barcode", rows)
    }
}

#[async_trait]
impl CollisionStore for PgWarrantyStore {
    async fn log_collision(&self, event: &NewCollisionEvent) -> Result<CollisionEvent, CoreError> {
        let row = CollisionRepo::insert(&self.pool, event)
            .await
            .map_err(|e| map_db_error("collision_event", &event.attempted_barcode, e))?;
        Ok(row.into())
    }

    async fn list_collisions(
        &self,
        batch_id: Option<DbId>,
    ) -> Result<Vec<CollisionEvent>, CoreError> {
        let key = batch_id.map_or_else(|| "all".to_string(), |id| id.to_string());
        let rows = CollisionRepo::list(&self.pool, batch_id)
            .await
            .map_err(|e| map_db_error("collision_event", key, e))?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn count_collisions_since(&self, since: Timestamp) -> Result<i64, CoreError> {
        CollisionRepo::count_since(&self.pool, since)
            .await
            .map_err(|e| map_db_error("collision_event", since, e))
    }
}

#[async_trait]
impl BatchStore for PgWarrantyStore {
    async fn open(&self, batch: &NewBatchRecord) -> Result<BatchRecord, CoreError> {
        let row = BatchRepo::open(&self.pool, batch)
            .await
            .map_err(|e| map_db_error("batch", &batch.batch_number, e))?;
        decode("batch", row)
    }

    async fn close(&self, id: DbId, closure: &BatchClosure) -> Result<BatchRecord, CoreError> {
        let row = BatchRepo::close(&self.pool, id, closure)
            .await
            .map_err(|e| map_db_error("batch", id, e))?
            .ok_or_else(|| CoreError::not_found("batch", id))?;
        decode("batch", row)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<BatchRecord>, CoreError> {
        BatchRepo::find_by_id(&self.pool, id)
            .await
            .map_err(|e| map_db_error("batch", id, e))?
            .map(|row| decode("batch", row))
            .transpose()
    }
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[async_trait]
impl ClaimStore for PgWarrantyStore {
    async fn next_claim_sequence(&self, storefront_id: DbId) -> Result<i64, CoreError> {
        ClaimRepo::next_sequence(&self.pool, storefront_id)
            .await
            .map_err(|e| map_db_error("claim_sequence", storefront_id, e))
    }

    async fn create(
        &self,
        claim: &NewClaim,
        entries: &[NewTimelineEntry],
    ) -> Result<(Claim, Vec<TimelineEntry>), CoreError> {
        let key = &claim.claim_number;
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("claim", key, e))?;

        let row = ClaimRepo::insert(&mut tx, claim)
            .await
            .map_err(|e| map_db_error("claim", key, e))?;
        let created: Claim = decode("claim", row)?;
        let stored = Self::insert_entries(&mut tx, created.id, entries).await?;

        tx.commit()
            .await
            .map_err(|e| map_db_error("claim", key, e))?;
        Ok((created, stored))
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Claim>, CoreError> {
        ClaimRepo::find_by_id(&self.pool, id)
            .await
            .map_err(|e| map_db_error("claim", id, e))?
            .map(|row| decode("claim", row))
            .transpose()
    }

    async fn save_with_timeline(
        &self,
        claim: &Claim,
        expected_version: i64,
        entries: &[NewTimelineEntry],
    ) -> Result<(Claim, Vec<TimelineEntry>), CoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_db_error("claim", claim.id, e))?;

        let updated = ClaimRepo::update_if_version(&mut tx, claim, expected_version)
            .await
            .map_err(|e| map_db_error("claim", claim.id, e))?;
        let Some(row) = updated else {
            let exists = ClaimRepo::exists(&mut tx, claim.id)
                .await
                .map_err(|e| map_db_error("claim", claim.id, e))?;
            return Err(if exists {
                CoreError::ConflictingTransition {
                    claim_id: claim.id,
                    expected_version,
                }
            } else {
                CoreError::not_found("claim", claim.id)
            });
        };
        let saved: Claim = decode("claim", row)?;
        let stored = Self::insert_entries(&mut tx, saved.id, entries).await?;

        tx.commit()
            .await
            .map_err(|e| map_db_error("claim", claim.id, e))?;
        Ok((saved, stored))
    }
}

#[async_trait]
impl TimelineStore for PgWarrantyStore {
    async fn append(&self, entry: &NewTimelineEntry) -> Result<TimelineEntry, CoreError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| map_db_error("claim", entry.claim_id, e))?;
        let row = TimelineRepo::insert(&mut conn, entry)
            .await
            .map_err(|e| map_db_error("claim", entry.claim_id, e))?;
        decode("timeline_entry", row)
    }

    async fn list_for_claim(
        &self,
        claim_id: DbId,
        customer_visible_only: bool,
    ) -> Result<Vec<TimelineEntry>, CoreError> {
        let rows = TimelineRepo::list_for_claim(&self.pool, claim_id, customer_visible_only)
            .await
            .map_err(|e| map_db_error("claim", claim_id, e))?;
        decode_all("timeline_entry", rows)
    }
}

#[async_trait]
impl RepairStore for PgWarrantyStore {
    async fn create(&self, ticket: &NewRepairTicket) -> Result<RepairTicket, CoreError> {
        let row = RepairRepo::insert(&self.pool, ticket)
            .await
            .map_err(|e| map_db_error("claim", ticket.claim_id, e))?;
        decode("repair_ticket", row)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<RepairTicket>, CoreError> {
        RepairRepo::find_by_id(&self.pool, id)
            .await
            .map_err(|e| map_db_error("repair_ticket", id, e))?
            .map(|row| decode("repair_ticket", row))
            .transpose()
    }

    async fn find_open_for_claim(
        &self,
        claim_id: DbId,
    ) -> Result<Option<RepairTicket>, CoreError> {
        RepairRepo::find_open_for_claim(&self.pool, claim_id)
            .await
            .map_err(|e| map_db_error("repair_ticket", claim_id, e))?
            .map(|row| decode("repair_ticket", row))
            .transpose()
    }

    async fn find_latest_for_claim(
        &self,
        claim_id: DbId,
    ) -> Result<Option<RepairTicket>, CoreError> {
        RepairRepo::find_latest_for_claim(&self.pool, claim_id)
            .await
            .map_err(|e| map_db_error("repair_ticket", claim_id, e))?
            .map(|row| decode("repair_ticket", row))
            .transpose()
    }

    async fn save(&self, ticket: &RepairTicket) -> Result<RepairTicket, CoreError> {
        let row = RepairRepo::update(&self.pool, ticket)
            .await
            .map_err(|e| map_db_error("repair_ticket", ticket.id, e))?
            .ok_or_else(|| CoreError::not_found("repair_ticket", ticket.id))?;
        decode("repair_ticket", row)
    }
}
