//! Batch generation runs.
//!
//! A run opens a [`BatchRecord`] before drawing anything, acquires
//! `quantity` unique candidates through the [`BarcodeGenerator`], inserts the
//! successful ones in one atomic bulk insert, and closes the record with
//! counters and a status derived from `(generated, failed)`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use super::generator::{validate_warranty_period, BarcodeGenerator};
use super::model::{
    Barcode, BatchClosure, BatchRecord, BatchStatus, NewBarcode, NewBatchRecord,
    GENERATION_METHOD_CSPRNG,
};
use super::stats::{BatchStatistics, GenerationStats, SecurityScore};
use crate::config::DEFAULT_MAX_BATCH_QUANTITY;
use crate::error::CoreError;
use crate::ports::{BarcodeStore, BatchStore};
use crate::types::{DbId, Timestamp};

/// Smallest batch a seller may request.
pub const MIN_BATCH_QUANTITY: u32 = 1;

/// Maximum length of a caller-supplied batch number.
pub const MAX_BATCH_NUMBER_LENGTH: usize = 64;

/// Input for a batch generation run.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub product_id: DbId,
    pub storefront_id: DbId,
    pub quantity: u32,
    pub warranty_period_months: i32,
    /// Accepted verbatim when present.
    pub batch_number: Option<String>,
    pub intended_recipient: Option<String>,
    pub distribution_notes: Option<String>,
    pub requested_by: DbId,
}

/// Outcome of a batch run.
#[derive(Debug, Clone)]
pub struct BatchResult {
    /// The closed batch record.
    pub batch: BatchRecord,
    /// Barcodes that were persisted.
    pub barcodes: Vec<Barcode>,
    pub statistics: BatchStatistics,
}

/// Auto-generated batch number: `BATCH-YYYY-MM-DD-HHMMSS`.
pub fn default_batch_number(started_at: Timestamp) -> String {
    started_at.format("BATCH-%Y-%m-%d-%H%M%S").to_string()
}

/// Final status of a batch from its counters.
pub fn derive_batch_status(generated: u32, failed: u32) -> BatchStatus {
    if generated == 0 {
        BatchStatus::Failed
    } else if failed == 0 {
        BatchStatus::Completed
    } else {
        BatchStatus::Partial
    }
}

/// Validate a batch request against the configured size limit.
pub fn validate_batch_request(req: &BatchRequest, max_quantity: u32) -> Result<(), CoreError> {
    if req.quantity < MIN_BATCH_QUANTITY || req.quantity > max_quantity {
        return Err(CoreError::Validation(format!(
            "Batch quantity must be between {MIN_BATCH_QUANTITY} and {max_quantity} (got {})",
            req.quantity
        )));
    }
    validate_warranty_period(req.warranty_period_months)?;
    if let Some(number) = &req.batch_number {
        if number.trim().is_empty() {
            return Err(CoreError::Validation(
                "Batch number must not be blank".to_string(),
            ));
        }
        if number.len() > MAX_BATCH_NUMBER_LENGTH {
            return Err(CoreError::Validation(format!(
                "Batch number exceeds maximum length of {MAX_BATCH_NUMBER_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

/// Drives batch runs end to end.
pub struct BatchCoordinator {
    generator: Arc<BarcodeGenerator>,
    barcodes: Arc<dyn BarcodeStore>,
    batches: Arc<dyn BatchStore>,
    max_quantity: u32,
}

impl BatchCoordinator {
    pub fn new(
        generator: Arc<BarcodeGenerator>,
        barcodes: Arc<dyn BarcodeStore>,
        batches: Arc<dyn BatchStore>,
    ) -> Self {
        Self {
            generator,
            barcodes,
            batches,
            max_quantity: DEFAULT_MAX_BATCH_QUANTITY,
        }
    }

    pub fn with_max_quantity(mut self, max_quantity: u32) -> Self {
        self.max_quantity = max_quantity;
        self
    }

    /// Run a batch.
    ///
    /// Individual exhausted barcodes are counted as failed rather than
    /// aborting the run. A run that produces nothing (and was not cancelled)
    /// closes the record as `failed` and returns
    /// [`CoreError::GenerationExhausted`]. On cancellation the run stops
    /// drawing, flushes what it has, and closes as `partial` or `failed`.
    pub async fn generate(
        &self,
        req: &BatchRequest,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, CoreError> {
        validate_batch_request(req, self.max_quantity)?;

        let clock = self.generator.clock().clone();
        let started_at = clock.now();
        let timer = Instant::now();

        let batch = self
            .batches
            .open(&NewBatchRecord {
                batch_number: req
                    .batch_number
                    .clone()
                    .unwrap_or_else(|| default_batch_number(started_at)),
                product_id: req.product_id,
                storefront_id: req.storefront_id,
                requested_quantity: req.quantity as i32,
                generation_started_at: started_at,
                intended_recipient: req.intended_recipient.clone(),
                distribution_notes: req.distribution_notes.clone(),
                requested_by: req.requested_by,
            })
            .await?;

        tracing::info!(
            batch_id = batch.id,
            batch_number = %batch.batch_number,
            quantity = req.quantity,
            "Batch generation started"
        );

        let mut reserved = HashSet::with_capacity(req.quantity as usize);
        let mut stats = GenerationStats::default();
        let mut pending = Vec::with_capacity(req.quantity as usize);
        let mut cancelled = false;

        for _ in 0..req.quantity {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            match self
                .generator
                .acquire_candidate(Some(batch.id), &mut reserved, &mut stats)
                .await
            {
                Ok(candidate) => pending.push(self.to_new_barcode(req, &batch, candidate)),
                Err(CoreError::GenerationExhausted { .. }) => {}
                Err(e) => return Err(self.abort(&batch, &stats, timer, e).await),
            }
        }

        let inserted = match self
            .bulk_insert(req, &batch, pending, &mut reserved, &mut stats)
            .await
        {
            Ok(rows) => rows,
            Err(e) => return Err(self.abort(&batch, &stats, timer, e).await),
        };

        let generated = inserted.len() as u32;
        let failed = req.quantity - generated;
        let elapsed_ms = timer.elapsed().as_secs_f64() * 1000.0;
        let closure = BatchClosure {
            generated_quantity: generated as i32,
            failed_quantity: failed as i32,
            collision_count: stats.collisions as i32,
            retry_count: stats.retries as i32,
            generation_completed_at: clock.now(),
            generation_status: derive_batch_status(generated, failed),
            average_generation_time_ms: elapsed_ms / generated.max(1) as f64,
        };
        let batch = self.batches.close(batch.id, &closure).await?;

        stats.successes = generated;
        let statistics =
            BatchStatistics::from_stats(req.quantity, &stats, self.generator.config(), cancelled);

        if statistics.security_score == SecurityScore::Poor {
            tracing::error!(
                batch_id = batch.id,
                collision_rate_pct = statistics.collision_rate_pct,
                "Batch collision rate above critical threshold"
            );
        }
        tracing::info!(
            batch_id = batch.id,
            generated,
            failed,
            collisions = stats.collisions,
            status = %batch.generation_status,
            cancelled,
            "Batch generation finished"
        );

        if generated == 0 && !cancelled {
            return Err(CoreError::GenerationExhausted {
                attempts: self.generator.config().max_retries(),
                batch_id: Some(batch.id),
            });
        }

        Ok(BatchResult {
            batch,
            barcodes: inserted,
            statistics,
        })
    }

    fn to_new_barcode(
        &self,
        req: &BatchRequest,
        batch: &BatchRecord,
        candidate: super::generator::AcquiredCandidate,
    ) -> NewBarcode {
        NewBarcode {
            barcode_number: candidate.barcode_number,
            storefront_id: req.storefront_id,
            product_id: req.product_id,
            generated_at: candidate.generated_at,
            generation_method: GENERATION_METHOD_CSPRNG.to_string(),
            entropy_bits: self.generator.config().entropy_bits() as i32,
            generation_attempt: candidate.attempt as i32,
            collision_checked: true,
            batch_id: Some(batch.id),
            batch_number: Some(batch.batch_number.clone()),
            warranty_period_months: req.warranty_period_months,
            created_by: req.requested_by,
        }
    }

    /// Insert the accepted candidates, replacing any that another run
    /// inserted first.
    ///
    /// A bulk insert that trips the unique constraint writes nothing, so each
    /// candidate is re-checked; losers are logged as collisions and redrawn.
    async fn bulk_insert(
        &self,
        req: &BatchRequest,
        batch: &BatchRecord,
        mut pending: Vec<NewBarcode>,
        reserved: &mut HashSet<String>,
        stats: &mut GenerationStats,
    ) -> Result<Vec<Barcode>, CoreError> {
        let max_rounds = self.generator.config().max_retries();
        let mut round = 0;

        loop {
            match self.barcodes.insert_many(&pending).await {
                Ok(rows) => return Ok(rows),
                Err(CoreError::DuplicateKey { key, .. }) if round < max_rounds => {
                    round += 1;
                    tracing::warn!(
                        batch_id = batch.id,
                        round,
                        key = %key,
                        "Bulk insert lost a uniqueness race, redrawing"
                    );

                    let mut kept = Vec::with_capacity(pending.len());
                    for candidate in pending {
                        if self.barcodes.is_unique(&candidate.barcode_number).await? {
                            kept.push(candidate);
                            continue;
                        }
                        stats.collisions += 1;
                        stats.successes = stats.successes.saturating_sub(1);
                        self.generator
                            .record_collision(
                                &candidate.barcode_number,
                                candidate.generation_attempt as u32,
                                Some(batch.id),
                            )
                            .await?;
                        match self
                            .generator
                            .acquire_candidate(Some(batch.id), reserved, stats)
                            .await
                        {
                            Ok(replacement) => {
                                kept.push(self.to_new_barcode(req, batch, replacement))
                            }
                            Err(CoreError::GenerationExhausted { .. }) => {}
                            Err(e) => return Err(e),
                        }
                    }
                    pending = kept;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Close the batch as failed after a hard error and hand the error back.
    ///
    /// Nothing has been inserted at this point, so every barcode counts as
    /// failed. A failure to close is logged; the original error wins.
    async fn abort(
        &self,
        batch: &BatchRecord,
        stats: &GenerationStats,
        timer: Instant,
        error: CoreError,
    ) -> CoreError {
        let closure = BatchClosure {
            generated_quantity: 0,
            failed_quantity: batch.requested_quantity,
            collision_count: stats.collisions as i32,
            retry_count: stats.retries as i32,
            generation_completed_at: self.generator.clock().now(),
            generation_status: BatchStatus::Failed,
            average_generation_time_ms: timer.elapsed().as_secs_f64() * 1000.0,
        };
        if let Err(close_err) = self.batches.close(batch.id, &closure).await {
            tracing::error!(
                batch_id = batch.id,
                error = %close_err,
                "Failed to close aborted batch"
            );
        }
        tracing::error!(batch_id = batch.id, error = %error, "Batch generation aborted");
        error
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn request(quantity: u32) -> BatchRequest {
        BatchRequest {
            product_id: 1,
            storefront_id: 1,
            quantity,
            warranty_period_months: 24,
            batch_number: None,
            intended_recipient: None,
            distribution_notes: None,
            requested_by: 1,
        }
    }

    #[test]
    fn batch_number_format() {
        let ts = Utc.with_ymd_and_hms(2025, 1, 9, 7, 5, 3).unwrap();
        assert_eq!(default_batch_number(ts), "BATCH-2025-01-09-070503");
    }

    #[test]
    fn status_derivation_table() {
        assert_eq!(derive_batch_status(10, 0), BatchStatus::Completed);
        assert_eq!(derive_batch_status(7, 3), BatchStatus::Partial);
        assert_eq!(derive_batch_status(0, 10), BatchStatus::Failed);
    }

    #[test]
    fn quantity_bounds() {
        assert!(validate_batch_request(&request(0), 10_000).is_err());
        assert!(validate_batch_request(&request(1), 10_000).is_ok());
        assert!(validate_batch_request(&request(10_000), 10_000).is_ok());
        assert!(validate_batch_request(&request(10_001), 10_000).is_err());
    }

    #[test]
    fn zero_warranty_rejected() {
        let mut req = request(5);
        req.warranty_period_months = 0;
        assert!(validate_batch_request(&req, 10_000).is_err());
    }

    #[test]
    fn blank_batch_number_rejected() {
        let mut req = request(5);
        req.batch_number = Some("  ".to_string());
        assert!(validate_batch_request(&req, 10_000).is_err());
    }
}
