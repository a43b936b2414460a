//! Outbound contracts of the warranty engine.
//!
//! Stores are async traits so the engine can run against PostgreSQL
//! (`rex_db::PgWarrantyStore`) or the in-process [`InMemoryStore`](crate::memory::InMemoryStore).
//! Every store method reports failures as [`CoreError`]; unavailable
//! backends surface as [`CoreError::StoreUnavailable`].

use async_trait::async_trait;
use chrono::Utc;
use rand::TryRngCore;

use crate::barcode::model::{
    Barcode, BarcodeStatus, BatchClosure, BatchRecord, CollisionEvent, NewBarcode, NewBatchRecord,
    NewCollisionEvent,
};
use crate::claim::model::{Claim, NewClaim};
use crate::claim::repair::{NewRepairTicket, RepairTicket};
use crate::claim::timeline::{NewTimelineEntry, TimelineEntry};
use crate::error::CoreError;
use crate::notification::WarrantyEvent;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Barcodes
// ---------------------------------------------------------------------------

#[async_trait]
pub trait BarcodeStore: Send + Sync {
    /// Insert one barcode. Fails with [`CoreError::DuplicateKey`] if the
    /// number already exists.
    async fn insert(&self, barcode: &NewBarcode) -> Result<Barcode, CoreError>;

    /// Insert many barcodes atomically: all become visible or none do.
    async fn insert_many(&self, barcodes: &[NewBarcode]) -> Result<Vec<Barcode>, CoreError>;

    async fn find_by_number(&self, number: &str) -> Result<Option<Barcode>, CoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Barcode>, CoreError>;

    /// Whether no barcode with this number exists yet.
    async fn is_unique(&self, number: &str) -> Result<bool, CoreError>;

    /// Persist a state transition of an existing barcode.
    ///
    /// The write only lands while the stored status is still `expected`;
    /// otherwise it fails with [`CoreError::InvalidTransition`] from the
    /// status actually stored.
    async fn save(&self, barcode: &Barcode, expected: BarcodeStatus)
        -> Result<Barcode, CoreError>;

    /// Barcodes whose expiry date lies before `today` but whose status still
    /// allows an automatic expiry.
    async fn list_due_for_expiry(
        &self,
        today: chrono::NaiveDate,
        limit: i64,
    ) -> Result<Vec<Barcode>, CoreError>;
}

#[async_trait]
pub trait CollisionStore: Send + Sync {
    /// Append a collision event. Events are never updated.
    async fn log_collision(&self, event: &NewCollisionEvent) -> Result<CollisionEvent, CoreError>;

    async fn list_collisions(&self, batch_id: Option<DbId>)
        -> Result<Vec<CollisionEvent>, CoreError>;

    async fn count_collisions_since(&self, since: Timestamp) -> Result<i64, CoreError>;
}

#[async_trait]
pub trait BatchStore: Send + Sync {
    /// Persist a batch record in `in_progress` state.
    async fn open(&self, batch: &NewBatchRecord) -> Result<BatchRecord, CoreError>;

    /// Write the final counters and status of a batch.
    async fn close(&self, id: DbId, closure: &BatchClosure) -> Result<BatchRecord, CoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<BatchRecord>, CoreError>;
}

// ---------------------------------------------------------------------------
// Claims
// ---------------------------------------------------------------------------

#[async_trait]
pub trait ClaimStore: Send + Sync {
    /// Next claim sequence number for a storefront (monotonically increasing).
    async fn next_claim_sequence(&self, storefront_id: DbId) -> Result<i64, CoreError>;

    /// Insert a new claim together with its initial timeline entries.
    ///
    /// The `claim_id` of each entry is replaced with the id of the new claim.
    async fn create(
        &self,
        claim: &NewClaim,
        entries: &[NewTimelineEntry],
    ) -> Result<(Claim, Vec<TimelineEntry>), CoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<Claim>, CoreError>;

    /// Compare-and-swap update of a claim plus the timeline entries that
    /// describe the change.
    ///
    /// Succeeds only when the stored version equals `expected_version`; the
    /// stored version is then incremented. Otherwise nothing is written and
    /// [`CoreError::ConflictingTransition`] is returned.
    async fn save_with_timeline(
        &self,
        claim: &Claim,
        expected_version: i64,
        entries: &[NewTimelineEntry],
    ) -> Result<(Claim, Vec<TimelineEntry>), CoreError>;
}

#[async_trait]
pub trait TimelineStore: Send + Sync {
    /// Append one entry. There is no update or delete.
    async fn append(&self, entry: &NewTimelineEntry) -> Result<TimelineEntry, CoreError>;

    /// Entries of a claim, oldest first.
    async fn list_for_claim(
        &self,
        claim_id: DbId,
        customer_visible_only: bool,
    ) -> Result<Vec<TimelineEntry>, CoreError>;
}

#[async_trait]
pub trait RepairStore: Send + Sync {
    async fn create(&self, ticket: &NewRepairTicket) -> Result<RepairTicket, CoreError>;

    async fn find_by_id(&self, id: DbId) -> Result<Option<RepairTicket>, CoreError>;

    /// The non-terminal ticket of a claim, if any.
    async fn find_open_for_claim(&self, claim_id: DbId)
        -> Result<Option<RepairTicket>, CoreError>;

    /// The most recently assigned ticket of a claim, in any state.
    async fn find_latest_for_claim(
        &self,
        claim_id: DbId,
    ) -> Result<Option<RepairTicket>, CoreError>;

    async fn save(&self, ticket: &RepairTicket) -> Result<RepairTicket, CoreError>;
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Wall-clock source, injected for testability.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The system UTC clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

// ---------------------------------------------------------------------------
// Entropy
// ---------------------------------------------------------------------------

/// Cryptographically secure random bytes.
pub trait EntropySource: Send + Sync {
    /// Fill `buf` completely, or fail if the underlying generator fails.
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<(), CoreError>;
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<(), CoreError> {
        rand::rngs::OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CoreError::Internal(format!("OS random generator failed: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Fire-and-forget receiver of warranty events.
///
/// Implementations must not block; delivery is at most once and the engine
/// never waits for or retries it.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, event: WarrantyEvent);
}

/// Sink used when no receiver is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotificationSink;

impl NotificationSink for NoopNotificationSink {
    fn notify(&self, _event: WarrantyEvent) {}
}
