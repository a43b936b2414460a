//! Secure barcode generation with retry-on-collision.
//!
//! Each candidate is `random_length` bytes from the CSPRNG folded onto the
//! alphabet. A candidate that already exists is logged as a
//! [`CollisionEvent`](super::model::CollisionEvent) and redrawn, up to
//! `max_retries` draws in total.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::codec::BarcodeCodec;
use super::model::{Barcode, NewBarcode, NewCollisionEvent, GENERATION_METHOD_CSPRNG};
use super::stats::GenerationStats;
use crate::config::GeneratorConfig;
use crate::error::CoreError;
use crate::ports::{BarcodeStore, Clock, CollisionStore, EntropySource};
use crate::types::{DbId, Timestamp};

/// Input for issuing a single barcode.
#[derive(Debug, Clone)]
pub struct GenerateBarcodeRequest {
    pub product_id: DbId,
    pub storefront_id: DbId,
    /// User issuing the barcode (recorded as `created_by`).
    pub actor_id: DbId,
    pub warranty_period_months: i32,
}

/// A unique candidate reserved by a batch run but not yet inserted.
#[derive(Debug, Clone)]
pub struct AcquiredCandidate {
    pub barcode_number: String,
    pub generated_at: Timestamp,
    /// 1-based draw on which the candidate was found unique.
    pub attempt: u32,
}

/// Validate a warranty period in months.
pub fn validate_warranty_period(months: i32) -> Result<(), CoreError> {
    if months < 1 {
        return Err(CoreError::Validation(format!(
            "warranty_period_months must be at least 1 (got {months})"
        )));
    }
    Ok(())
}

/// Draws barcode candidates and checks them against the store.
pub struct BarcodeGenerator {
    config: GeneratorConfig,
    codec: BarcodeCodec,
    entropy: Arc<dyn EntropySource>,
    clock: Arc<dyn Clock>,
    barcodes: Arc<dyn BarcodeStore>,
    collisions: Arc<dyn CollisionStore>,
}

impl BarcodeGenerator {
    pub fn new(
        config: GeneratorConfig,
        entropy: Arc<dyn EntropySource>,
        clock: Arc<dyn Clock>,
        barcodes: Arc<dyn BarcodeStore>,
        collisions: Arc<dyn CollisionStore>,
    ) -> Self {
        let codec = BarcodeCodec::new(&config);
        Self {
            config,
            codec,
            entropy,
            clock,
            barcodes,
            collisions,
        }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn codec(&self) -> &BarcodeCodec {
        &self.codec
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Draw one candidate number stamped with the current year.
    pub fn draw_candidate(&self) -> Result<(String, Timestamp), CoreError> {
        let mut bytes = vec![0u8; self.codec.random_length()];
        self.entropy.fill_bytes(&mut bytes)?;
        let now = self.clock.now();
        let number = self.codec.format(now, &self.codec.encode_random(&bytes));
        Ok((number, now))
    }

    /// Issue and persist one barcode.
    ///
    /// A candidate rejected by the store's unique constraint after passing
    /// [`BarcodeStore::is_unique`] counts as a collision like any other.
    pub async fn generate_one(
        &self,
        req: &GenerateBarcodeRequest,
        cancel: &CancellationToken,
    ) -> Result<Barcode, CoreError> {
        validate_warranty_period(req.warranty_period_months)?;
        let max = self.config.max_retries();

        for attempt in 1..=max {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            let (candidate, generated_at) = self.draw_candidate()?;
            if !self.barcodes.is_unique(&candidate).await? {
                self.record_collision(&candidate, attempt, None).await?;
                continue;
            }

            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }

            let new = NewBarcode {
                barcode_number: candidate.clone(),
                storefront_id: req.storefront_id,
                product_id: req.product_id,
                generated_at,
                generation_method: GENERATION_METHOD_CSPRNG.to_string(),
                entropy_bits: self.config.entropy_bits() as i32,
                generation_attempt: attempt as i32,
                collision_checked: true,
                batch_id: None,
                batch_number: None,
                warranty_period_months: req.warranty_period_months,
                created_by: req.actor_id,
            };

            match self.barcodes.insert(&new).await {
                Ok(barcode) => {
                    tracing::debug!(
                        barcode = %barcode.barcode_number,
                        attempt,
                        "Barcode issued"
                    );
                    return Ok(barcode);
                }
                Err(CoreError::DuplicateKey { .. }) => {
                    self.record_collision(&candidate, attempt, None).await?;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::error!(attempts = max, "Barcode generation exhausted");
        Err(CoreError::GenerationExhausted {
            attempts: max,
            batch_id: None,
        })
    }

    /// Find a candidate that is unique in the store and not in `reserved`.
    ///
    /// Updates `stats` with every draw. On success the candidate is added to
    /// `reserved`; after `max_retries` collisions the barcode counts as
    /// failed and [`CoreError::GenerationExhausted`] is returned.
    pub async fn acquire_candidate(
        &self,
        batch_id: Option<DbId>,
        reserved: &mut HashSet<String>,
        stats: &mut GenerationStats,
    ) -> Result<AcquiredCandidate, CoreError> {
        let max = self.config.max_retries();

        for attempt in 1..=max {
            stats.attempts += 1;
            if attempt > 1 {
                stats.retries += 1;
            }

            let (candidate, generated_at) = self.draw_candidate()?;
            let taken =
                reserved.contains(&candidate) || !self.barcodes.is_unique(&candidate).await?;
            if taken {
                stats.collisions += 1;
                self.record_collision(&candidate, attempt, batch_id).await?;
                continue;
            }

            reserved.insert(candidate.clone());
            stats.successes += 1;
            return Ok(AcquiredCandidate {
                barcode_number: candidate,
                generated_at,
                attempt,
            });
        }

        stats.failures += 1;
        Err(CoreError::GenerationExhausted {
            attempts: max,
            batch_id,
        })
    }

    /// Append a collision event and warn.
    pub async fn record_collision(
        &self,
        candidate: &str,
        attempt: u32,
        batch_id: Option<DbId>,
    ) -> Result<(), CoreError> {
        tracing::warn!(
            barcode = %candidate,
            attempt,
            batch_id = ?batch_id,
            "Barcode collision detected"
        );
        self.collisions
            .log_collision(&NewCollisionEvent {
                attempted_barcode: candidate.to_string(),
                collision_attempt: attempt as i32,
                batch_id,
                detected_at: self.clock.now(),
            })
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
