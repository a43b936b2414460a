//! Shared wiring for the scenario tests: every service over one
//! [`InMemoryStore`] with a settable clock and scripted entropy.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use rex_core::barcode::batch::BatchCoordinator;
use rex_core::barcode::codec::BarcodeCodec;
use rex_core::barcode::generator::{BarcodeGenerator, GenerateBarcodeRequest};
use rex_core::barcode::lifecycle::{ActivationRequest, BarcodeLifecycle};
use rex_core::barcode::model::{Barcode, BarcodeStatus, NewBarcode};
use rex_core::claim::model::{Address, Claim, CustomerSnapshot, NewClaim, Priority, Severity};
use rex_core::claim::repair::{NewRepairTicket, RepairTicket};
use rex_core::claim::repair_service::RepairService;
use rex_core::claim::timeline::{NewTimelineEntry, TimelineEntry};
use rex_core::claim::workflow::{ClaimWorkflow, SubmitClaimRequest};
use rex_core::config::GeneratorConfig;
use rex_core::error::CoreError;
use rex_core::memory::{FixedClock, InMemoryStore, RecordingSink, ScriptedEntropy};
use rex_core::ports::{BarcodeStore, ClaimStore, EntropySource, OsEntropy, RepairStore};
use rex_core::types::{DbId, Timestamp};
use tokio_util::sync::CancellationToken;

pub const STOREFRONT: i64 = 1;
pub const PRODUCT: i64 = 7;
pub const CUSTOMER: i64 = 42;
pub const ADMIN: i64 = 900;
pub const TECHNICIAN: i64 = 55;

pub fn at(y: i32, m: u32, d: u32) -> Timestamp {
    Utc.with_ymd_and_hms(y, m, d, 9, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    /// Barcode, claim, and repair writes of the lifecycle and the claim
    /// workflow go through here.
    pub faults: Arc<FaultyStore>,
    pub clock: Arc<FixedClock>,
    pub sink: Arc<RecordingSink>,
    pub generator: Arc<BarcodeGenerator>,
    pub batches: BatchCoordinator,
    pub lifecycle: Arc<BarcodeLifecycle>,
    pub claims: ClaimWorkflow,
    pub repairs: RepairService,
    pub cancel: CancellationToken,
}

impl Harness {
    pub fn new(now: Timestamp, entropy: impl EntropySource + 'static) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let faults = Arc::new(FaultyStore::new(store.clone()));
        let clock = Arc::new(FixedClock::new(now));
        let sink = Arc::new(RecordingSink::new());
        let config = GeneratorConfig::default();

        let generator = Arc::new(BarcodeGenerator::new(
            config.clone(),
            Arc::new(entropy),
            clock.clone(),
            store.clone(),
            store.clone(),
        ));
        let batches = BatchCoordinator::new(generator.clone(), store.clone(), store.clone());
        let lifecycle = Arc::new(BarcodeLifecycle::new(
            BarcodeCodec::new(&config),
            faults.clone(),
            clock.clone(),
            sink.clone(),
        ));
        let claims = ClaimWorkflow::new(
            faults.clone(),
            store.clone(),
            faults.clone(),
            lifecycle.clone(),
            clock.clone(),
            sink.clone(),
        );
        let repairs = RepairService::new(store.clone(), store.clone(), store.clone(), clock.clone());

        Self {
            store,
            faults,
            clock,
            sink,
            generator,
            batches,
            lifecycle,
            claims,
            repairs,
            cancel: CancellationToken::new(),
        }
    }

    pub fn scripted(now: Timestamp) -> Self {
        Self::new(now, ScriptedEntropy::counting())
    }

    pub fn os(now: Timestamp) -> Self {
        Self::new(now, OsEntropy)
    }

    pub async fn issue(&self, warranty_period_months: i32) -> Barcode {
        self.generator
            .generate_one(
                &GenerateBarcodeRequest {
                    product_id: PRODUCT,
                    storefront_id: STOREFRONT,
                    actor_id: ADMIN,
                    warranty_period_months,
                },
                &self.cancel,
            )
            .await
            .unwrap()
    }

    pub async fn activate(&self, barcode: &Barcode, purchase_date: NaiveDate) -> Barcode {
        self.lifecycle
            .activate(
                &barcode.barcode_number,
                &ActivationRequest {
                    customer_id: CUSTOMER,
                    purchase_date,
                    purchase_location: Some("Online".to_string()),
                    purchase_invoice: Some("INV-1".to_string()),
                },
            )
            .await
            .unwrap()
    }
}

pub fn customer() -> CustomerSnapshot {
    CustomerSnapshot {
        name: "Dana Reyes".to_string(),
        email: "dana@example.com".to_string(),
        phone: Some("+1 555 0100".to_string()),
        pickup_address: Address {
            line1: "12 Harbor Rd".to_string(),
            line2: None,
            city: "Portland".to_string(),
            state: Some("OR".to_string()),
            postal_code: "97201".to_string(),
            country: "US".to_string(),
        },
    }
}

pub fn submission(barcode_number: &str) -> SubmitClaimRequest {
    SubmitClaimRequest {
        barcode_number: barcode_number.to_string(),
        storefront_id: STOREFRONT,
        product_id: PRODUCT,
        customer_id: CUSTOMER,
        issue_description: "Unit does not power on after a week of use".to_string(),
        issue_category: Some("power".to_string()),
        issue_date: None,
        severity: Severity::High,
        priority: Priority::Normal,
        tags: vec!["power".to_string()],
        customer: customer(),
    }
}

// ---------------------------------------------------------------------------
// Fault injection
// ---------------------------------------------------------------------------

/// Writes that [`FaultyStore`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    BarcodeSave,
    ClaimCreate,
    ClaimSave,
    TicketCreate,
}

/// Passes every call through to an [`InMemoryStore`], except the writes
/// armed with [`FaultyStore::fail`], which return `StoreUnavailable`.
pub struct FaultyStore {
    inner: Arc<InMemoryStore>,
    barcode_save: AtomicBool,
    claim_create: AtomicBool,
    claim_save: AtomicBool,
    ticket_create: AtomicBool,
}

impl FaultyStore {
    pub fn new(inner: Arc<InMemoryStore>) -> Self {
        Self {
            inner,
            barcode_save: AtomicBool::new(false),
            claim_create: AtomicBool::new(false),
            claim_save: AtomicBool::new(false),
            ticket_create: AtomicBool::new(false),
        }
    }

    pub fn fail(&self, fault: Fault, on: bool) {
        self.flag(fault).store(on, Ordering::SeqCst);
    }

    fn flag(&self, fault: Fault) -> &AtomicBool {
        match fault {
            Fault::BarcodeSave => &self.barcode_save,
            Fault::ClaimCreate => &self.claim_create,
            Fault::ClaimSave => &self.claim_save,
            Fault::TicketCreate => &self.ticket_create,
        }
    }

    fn check(&self, fault: Fault) -> Result<(), CoreError> {
        if self.flag(fault).load(Ordering::SeqCst) {
            return Err(CoreError::StoreUnavailable(format!("{fault:?} failed")));
        }
        Ok(())
    }
}

#[async_trait]
impl BarcodeStore for FaultyStore {
    async fn insert(&self, barcode: &NewBarcode) -> Result<Barcode, CoreError> {
        self.inner.insert(barcode).await
    }

    async fn insert_many(&self, barcodes: &[NewBarcode]) -> Result<Vec<Barcode>, CoreError> {
        self.inner.insert_many(barcodes).await
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<Barcode>, CoreError> {
        self.inner.find_by_number(number).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Barcode>, CoreError> {
        BarcodeStore::find_by_id(&*self.inner, id).await
    }

    async fn is_unique(&self, number: &str) -> Result<bool, CoreError> {
        self.inner.is_unique(number).await
    }

    async fn save(
        &self,
        barcode: &Barcode,
        expected: BarcodeStatus,
    ) -> Result<Barcode, CoreError> {
        self.check(Fault::BarcodeSave)?;
        BarcodeStore::save(&*self.inner, barcode, expected).await
    }

    async fn list_due_for_expiry(
        &self,
        today: NaiveDate,
        limit: i64,
    ) -> Result<Vec<Barcode>, CoreError> {
        self.inner.list_due_for_expiry(today, limit).await
    }
}

#[async_trait]
impl ClaimStore for FaultyStore {
    async fn next_claim_sequence(&self, storefront_id: DbId) -> Result<i64, CoreError> {
        self.inner.next_claim_sequence(storefront_id).await
    }

    async fn create(
        &self,
        claim: &NewClaim,
        entries: &[NewTimelineEntry],
    ) -> Result<(Claim, Vec<TimelineEntry>), CoreError> {
        self.check(Fault::ClaimCreate)?;
        ClaimStore::create(&*self.inner, claim, entries).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<Claim>, CoreError> {
        ClaimStore::find_by_id(&*self.inner, id).await
    }

    async fn save_with_timeline(
        &self,
        claim: &Claim,
        expected_version: i64,
        entries: &[NewTimelineEntry],
    ) -> Result<(Claim, Vec<TimelineEntry>), CoreError> {
        self.check(Fault::ClaimSave)?;
        self.inner
            .save_with_timeline(claim, expected_version, entries)
            .await
    }
}

#[async_trait]
impl RepairStore for FaultyStore {
    async fn create(&self, ticket: &NewRepairTicket) -> Result<RepairTicket, CoreError> {
        self.check(Fault::TicketCreate)?;
        RepairStore::create(&*self.inner, ticket).await
    }

    async fn find_by_id(&self, id: DbId) -> Result<Option<RepairTicket>, CoreError> {
        RepairStore::find_by_id(&*self.inner, id).await
    }

    async fn find_open_for_claim(
        &self,
        claim_id: DbId,
    ) -> Result<Option<RepairTicket>, CoreError> {
        self.inner.find_open_for_claim(claim_id).await
    }

    async fn find_latest_for_claim(
        &self,
        claim_id: DbId,
    ) -> Result<Option<RepairTicket>, CoreError> {
        self.inner.find_latest_for_claim(claim_id).await
    }

    async fn save(&self, ticket: &RepairTicket) -> Result<RepairTicket, CoreError> {
        RepairStore::save(&*self.inner, ticket).await
    }
}
