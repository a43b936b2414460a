//! In-process implementations of the outbound ports.
//!
//! [`InMemoryStore`] keeps every table behind one mutex, which makes each
//! store call atomic and linearizable. It backs the test suites and embedded
//! callers that do not need PostgreSQL. [`FixedClock`], [`ScriptedEntropy`],
//! and [`RecordingSink`] make time, randomness, and notifications
//! deterministic.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};

use crate::barcode::lifecycle::AUTO_EXPIRING_STATUSES;
use crate::barcode::model::{
    Barcode, BarcodeStatus, BatchClosure, BatchRecord, BatchStatus, CollisionEvent, NewBarcode,
    NewBatchRecord, NewCollisionEvent,
};
use crate::claim::model::{Claim, NewClaim};
use crate::claim::repair::{NewRepairTicket, RepairTicket};
use crate::claim::timeline::{NewTimelineEntry, TimelineEntry};
use crate::error::CoreError;
use crate::notification::WarrantyEvent;
use crate::ports::{
    BarcodeStore, BatchStore, ClaimStore, Clock, CollisionStore, EntropySource,
    NotificationSink, RepairStore, TimelineStore,
};
use crate::types::{DbId, Timestamp};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct Tables {
    barcodes: BTreeMap<DbId, Barcode>,
    barcode_numbers: HashMap<String, DbId>,
    collisions: Vec<CollisionEvent>,
    batches: BTreeMap<DbId, BatchRecord>,
    claims: BTreeMap<DbId, Claim>,
    claim_sequences: HashMap<DbId, i64>,
    timeline: Vec<TimelineEntry>,
    repairs: BTreeMap<DbId, RepairTicket>,
}

impl Tables {
    fn materialize(&mut self, new: &NewBarcode) -> Barcode {
        let id = self.barcodes.len() as DbId + 1;
        let barcode = Barcode {
            id,
            barcode_number: new.barcode_number.clone(),
            storefront_id: new.storefront_id,
            product_id: new.product_id,
            generated_at: new.generated_at,
            generation_method: new.generation_method.clone(),
            entropy_bits: new.entropy_bits,
            generation_attempt: new.generation_attempt,
            collision_checked: new.collision_checked,
            batch_id: new.batch_id,
            batch_number: new.batch_number.clone(),
            distributed_at: None,
            distributed_to: None,
            distribution_notes: None,
            activated_at: None,
            customer_id: None,
            purchase_date: None,
            purchase_location: None,
            purchase_invoice: None,
            status: BarcodeStatus::Generated,
            warranty_period_months: new.warranty_period_months,
            expiry_date: None,
            created_by: new.created_by,
            created_at: new.generated_at,
            updated_at: new.generated_at,
        };
        self.barcode_numbers.insert(barcode.barcode_number.clone(), id);
        self.barcodes.insert(id, barcode.clone());
        barcode
    }

    fn append_timeline(&mut self, entry: NewTimelineEntry) -> TimelineEntry {
        let saved = entry.into_entry(self.timeline.len() as DbId + 1);
        self.timeline.push(saved.clone());
        saved
    }
}

fn duplicate_barcode(number: &str) -> CoreError {
    CoreError::DuplicateKey {
        entity: "barcode",
        key: number.to_string(),
    }
}

/// Every store port over in-memory tables.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
    bulk_insert_race: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, CoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(CoreError::StoreUnavailable(
                "in-memory store marked unavailable".to_string(),
            ));
        }
        Ok(lock(&self.tables))
    }

    /// Make every subsequent call fail with [`CoreError::StoreUnavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Let the next `insert_many` lose a race: its first row is inserted as
    /// if by another writer and the call fails with a duplicate key.
    pub fn arm_bulk_insert_race(&self) {
        self.bulk_insert_race.store(true, Ordering::SeqCst);
    }

    pub fn barcode_count(&self) -> usize {
        lock(&self.tables).barcodes.len()
    }

    pub fn barcode_by_number(&self, number: &str) -> Option<Barcode> {
        let tables = lock(&self.tables);
        tables
            .barcode_numbers
            .get(number)
            .and_then(|id| tables.barcodes.get(id))
            .cloned()
    }

    pub fn list_collisions_blocking(&self, batch_id: Option<DbId>) -> Vec<CollisionEvent> {
        lock(&self.tables)
            .collisions
            .iter()
            .filter(|c| batch_id.is_none() || c.batch_id == batch_id)
            .cloned()
            .collect()
    }

    pub fn timeline_blocking(&self, claim_id: DbId) -> Vec<TimelineEntry> {
        lock(&self.tables)
            .timeline
            .iter()
            .filter(|e| e.claim_id == claim_id)
            .cloned()
            .collect()
    }

    pub fn claim_blocking(&self, claim_id: DbId) -> Option<Claim> {
        lock(&self.tables).claims.get(&claim_id).cloned()
    }
}

#[async_trait]
impl BarcodeStore for InMemoryStore {
    async fn insert(&self, barcode: &NewBarcode) -> Result<Barcode, CoreError> {
        let mut tables = self.tables()?;
        if tables.barcode_numbers.contains_key(&barcode.barcode_number) {
            return Err(duplicate_barcode(&barcode.barcode_number));
        }
        Ok(tables.materialize(barcode))
    }

    async fn insert_many(&self, barcodes: &[NewBarcode]) -> Result<Vec<Barcode>, CoreError> {
        let mut tables = self.tables()?;

        if self.bulk_insert_race.swap(false, Ordering::SeqCst) {
            if let Some(first) = barcodes.first() {
                let mut rival = first.clone();
                rival.batch_id = None;
                rival.batch_number = None;
                tables.materialize(&rival);
                return Err(duplicate_barcode(&first.barcode_number));
            }
        }

        let mut seen = std::collections::HashSet::with_capacity(barcodes.len());
        for b in barcodes {
            if tables.barcode_numbers.contains_key(&b.barcode_number)
                || !seen.insert(b.barcode_number.as_str())
            {
                return Err(duplicate_barcode(&b.barcode_number));
            }
        }
        Ok(barcodes.iter().map(|b| tables.materialize(b)).collect())
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<Barcode>, CoreError> {
        let tables = self.tables()?;
        Ok(tables
            .barcode_numbers
            .get(number)
            .and_then(|id| tables.barcodes.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Barcode>, CoreError> {
        Ok(self.tables()?.barcodes.get(&id).cloned())
    }

    async fn is_unique(&self, number: &str) -> Result<bool, CoreError> {
        Ok(!self.tables()?.barcode_numbers.contains_key(number))
    }

    async fn save(
        &self,
        barcode: &Barcode,
        expected: BarcodeStatus,
    ) -> Result<Barcode, CoreError> {
        let mut tables = self.tables()?;
        let slot = tables
            .barcodes
            .get_mut(&barcode.id)
            .ok_or_else(|| CoreError::not_found("barcode", barcode.id))?;
        if slot.status != expected {
            return Err(CoreError::InvalidTransition {
                entity: "barcode",
                from: slot.status.to_string(),
                to: barcode.status.to_string(),
            });
        }
        *slot = barcode.clone();
        Ok(barcode.clone())
    }

    async fn list_due_for_expiry(
        &self,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Barcode>, CoreError> {
        Ok(self
            .tables()?
            .barcodes
            .values()
            .filter(|b| {
                AUTO_EXPIRING_STATUSES.contains(&b.status)
                    && b.expiry_date.is_some_and(|d| d < today)
            })
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CollisionStore for InMemoryStore {
    async fn log_collision(&self, event: &NewCollisionEvent) -> Result<CollisionEvent, CoreError> {
        let mut tables = self.tables()?;
        let saved = CollisionEvent {
            id: tables.collisions.len() as DbId + 1,
            attempted_barcode: event.attempted_barcode.clone(),
            collision_attempt: event.collision_attempt,
            batch_id: event.batch_id,
            detected_at: event.detected_at,
        };
        tables.collisions.push(saved.clone());
        Ok(saved)
    }

    async fn list_collisions(
        &self,
        batch_id: Option<DbId>,
    ) -> Result<Vec<CollisionEvent>, CoreError> {
        self.tables()?;
        Ok(self.list_collisions_blocking(batch_id))
    }

    async fn count_collisions_since(&self, since: Timestamp) -> Result<i64, CoreError> {
        Ok(self
            .tables()?
            .collisions
            .iter()
            .filter(|c| c.detected_at >= since)
            .count() as i64)
    }
}

#[async_trait]
impl BatchStore for InMemoryStore {
    async fn open(&self, batch: &NewBatchRecord) -> Result<BatchRecord, CoreError> {
        let mut tables = self.tables()?;
        let record = BatchRecord {
            id: tables.batches.len() as DbId + 1,
            batch_number: batch.batch_number.clone(),
            product_id: batch.product_id,
            storefront_id: batch.storefront_id,
            requested_quantity: batch.requested_quantity,
            generated_quantity: 0,
            failed_quantity: 0,
            collision_count: 0,
            retry_count: 0,
            generation_started_at: batch.generation_started_at,
            generation_completed_at: None,
            generation_status: BatchStatus::InProgress,
            average_generation_time_ms: None,
            intended_recipient: batch.intended_recipient.clone(),
            distribution_notes: batch.distribution_notes.clone(),
            requested_by: batch.requested_by,
        };
        tables.batches.insert(record.id, record.clone());
        Ok(record)
    }

    async fn close(&self, id: DbId, closure: &BatchClosure) -> Result<BatchRecord, CoreError> {
        let mut tables = self.tables()?;
        let record = tables
            .batches
            .get_mut(&id)
            .ok_or_else(|| CoreError::not_found("batch", id))?;
        record.generated_quantity = closure.generated_quantity;
        record.failed_quantity = closure.failed_quantity;
        record.collision_count = closure.collision_count;
        record.retry_count = closure.retry_count;
        record.generation_completed_at = Some(closure.generation_completed_at);
        record.generation_status = closure.generation_status;
        record.average_generation_time_ms = Some(closure.average_generation_time_ms);
        Ok(record.clone())
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<BatchRecord>, CoreError> {
        Ok(self.tables()?.batches.get(&id).cloned())
    }
}

#[async_trait]
impl ClaimStore for InMemoryStore {
    async fn next_claim_sequence(&self, storefront_id: DbId) -> Result<i64, CoreError> {
        let mut tables = self.tables()?;
        let seq = tables.claim_sequences.entry(storefront_id).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    async fn create(
        &self,
        claim: &NewClaim,
        entries: &[NewTimelineEntry],
    ) -> Result<(Claim, Vec<TimelineEntry>), CoreError> {
        let mut tables = self.tables()?;
        let taken = tables.claims.values().any(|c| {
            c.storefront_id == claim.storefront_id && c.claim_number == claim.claim_number
        });
        if taken {
            return Err(CoreError::DuplicateKey {
                entity: "claim",
                key: claim.claim_number.clone(),
            });
        }

        let id = tables.claims.len() as DbId + 1;
        let saved = claim.clone().into_claim(id);
        tables.claims.insert(id, saved.clone());
        let entries: Vec<TimelineEntry> = entries
            .iter()
            .cloned()
            .map(|mut e| {
                e.claim_id = id;
                tables.append_timeline(e)
            })
            .collect();
        Ok((saved, entries))
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Claim>, CoreError> {
        Ok(self.tables()?.claims.get(&id).cloned())
    }

    async fn save_with_timeline(
        &self,
        claim: &Claim,
        expected_version: i64,
        entries: &[NewTimelineEntry],
    ) -> Result<(Claim, Vec<TimelineEntry>), CoreError> {
        let mut tables = self.tables()?;
        let stored = tables
            .claims
            .get_mut(&claim.id)
            .ok_or_else(|| CoreError::not_found("claim", claim.id))?;
        if stored.version != expected_version {
            return Err(CoreError::ConflictingTransition {
                claim_id: claim.id,
                expected_version,
            });
        }
        let mut saved = claim.clone();
        saved.version = expected_version + 1;
        *stored = saved.clone();

        let entries: Vec<TimelineEntry> = entries
            .iter()
            .cloned()
            .map(|e| tables.append_timeline(e))
            .collect();
        Ok((saved, entries))
    }
}

#[async_trait]
impl TimelineStore for InMemoryStore {
    async fn append(&self, entry: &NewTimelineEntry) -> Result<TimelineEntry, CoreError> {
        let mut tables = self.tables()?;
        if !tables.claims.contains_key(&entry.claim_id) {
            return Err(CoreError::not_found("claim", entry.claim_id));
        }
        Ok(tables.append_timeline(entry.clone()))
    }

    async fn list_for_claim(
        &self,
        claim_id: DbId,
        customer_visible_only: bool,
    ) -> Result<Vec<TimelineEntry>, CoreError> {
        let mut entries: Vec<_> = self
            .tables()?
            .timeline
            .iter()
            .filter(|e| e.claim_id == claim_id)
            .filter(|e| !customer_visible_only || e.is_customer_visible)
            .cloned()
            .collect();
        entries.sort_by_key(|e| (e.created_at, e.id));
        Ok(entries)
    }
}

#[async_trait]
impl RepairStore for InMemoryStore {
    async fn create(&self, ticket: &NewRepairTicket) -> Result<RepairTicket, CoreError> {
        let mut tables = self.tables()?;
        if !tables.claims.contains_key(&ticket.claim_id) {
            return Err(CoreError::not_found("claim", ticket.claim_id));
        }
        let id = tables.repairs.len() as DbId + 1;
        let saved = ticket.clone().into_ticket(id);
        tables.repairs.insert(id, saved.clone());
        Ok(saved)
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<RepairTicket>, CoreError> {
        Ok(self.tables()?.repairs.get(&id).cloned())
    }

    async fn find_open_for_claim(
        &self,
        claim_id: DbId,
    ) -> Result<Option<RepairTicket>, CoreError> {
        Ok(self
            .tables()?
            .repairs
            .values()
            .rev()
            .find(|t| t.claim_id == claim_id && !t.status.is_terminal())
            .cloned())
    }

    async fn find_latest_for_claim(
        &self,
        claim_id: DbId,
    ) -> Result<Option<RepairTicket>, CoreError> {
        Ok(self
            .tables()?
            .repairs
            .values()
            .rev()
            .find(|t| t.claim_id == claim_id)
            .cloned())
    }

    async fn save(&self, ticket: &RepairTicket) -> Result<RepairTicket, CoreError> {
        let mut tables = self.tables()?;
        let slot = tables
            .repairs
            .get_mut(&ticket.id)
            .ok_or_else(|| CoreError::not_found("repair_ticket", ticket.id))?;
        *slot = ticket.clone();
        Ok(ticket.clone())
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// A clock that only moves when told to.
pub struct FixedClock {
    now: Mutex<Timestamp>,
}

impl FixedClock {
    pub fn new(now: Timestamp) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: Timestamp) {
        *lock(&self.now) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        *lock(&self.now)
    }
}

// ---------------------------------------------------------------------------
// Entropy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Script {
    /// Call `k` encodes `k` in 5-bit groups, so every call differs.
    Counting,
    /// The first `n` calls repeat call 0, then counting resumes.
    RepeatThenCount(u64),
    Constant(u8),
}

/// Deterministic stand-in for the OS CSPRNG.
pub struct ScriptedEntropy {
    script: Script,
    calls: AtomicU64,
}

impl ScriptedEntropy {
    fn with(script: Script) -> Self {
        Self {
            script,
            calls: AtomicU64::new(0),
        }
    }

    pub fn counting() -> Self {
        Self::with(Script::Counting)
    }

    pub fn repeat_then_count(n: u64) -> Self {
        Self::with(Script::RepeatThenCount(n))
    }

    pub fn constant(byte: u8) -> Self {
        Self::with(Script::Constant(byte))
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl EntropySource for ScriptedEntropy {
    fn fill_bytes(&self, buf: &mut [u8]) -> Result<(), CoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let counter = match self.script {
            Script::Constant(byte) => {
                buf.fill(byte);
                return Ok(());
            }
            Script::Counting => call,
            Script::RepeatThenCount(n) if call < n => 0,
            Script::RepeatThenCount(n) => call + 1 - n,
        };
        for (i, b) in buf.iter_mut().enumerate() {
            let shift = 5 * i as u32;
            *b = if shift < 64 {
                ((counter >> shift) & 0x1f) as u8
            } else {
                0
            };
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Sink that keeps every event it receives.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<WarrantyEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<WarrantyEvent> {
        lock(&self.events).clone()
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, event: WarrantyEvent) {
        lock(&self.events).push(event);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
