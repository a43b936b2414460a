//! Periodic barcode expiry sweep.
//!
//! Barcodes only expire lazily when someone looks at them. The sweep walks
//! every barcode whose `expiry_date` has passed while it is still
//! `generated`, `distributed`, or `activated`, and applies the lifecycle's
//! expiry check to it. A barcode that fails to save is logged and skipped;
//! the next sweep picks it up again.

use std::sync::Arc;
use std::time::Duration;

use rex_core::barcode::lifecycle::BarcodeLifecycle;
use rex_core::error::CoreError;
use rex_core::ports::{BarcodeStore, Clock};
use tokio_util::sync::CancellationToken;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Barcodes returned by the due-for-expiry query.
    pub examined: usize,
    pub expired: usize,
    pub failed: usize,
}

pub struct ExpirySweeper {
    barcodes: Arc<dyn BarcodeStore>,
    lifecycle: Arc<BarcodeLifecycle>,
    clock: Arc<dyn Clock>,
    batch_size: i64,
}

impl ExpirySweeper {
    pub fn new(
        barcodes: Arc<dyn BarcodeStore>,
        lifecycle: Arc<BarcodeLifecycle>,
        clock: Arc<dyn Clock>,
        batch_size: i64,
    ) -> Self {
        Self {
            barcodes,
            lifecycle,
            clock,
            batch_size: batch_size.max(1),
        }
    }

    /// Expire everything currently due.
    ///
    /// Pages through the due barcodes `batch_size` at a time. Stops after a
    /// short page, or after a page in which nothing could be expired, so a
    /// persistently failing barcode cannot spin the loop.
    pub async fn sweep_once(&self, cancel: &CancellationToken) -> Result<SweepReport, CoreError> {
        let mut report = SweepReport::default();
        loop {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled);
            }
            let today = self.clock.now().date_naive();
            let due = self.barcodes.list_due_for_expiry(today, self.batch_size).await?;
            let page_len = due.len();
            let mut page_expired = 0;

            for barcode in due {
                let number = barcode.barcode_number.clone();
                let before = barcode.status;
                match self.lifecycle.check_expiry(barcode).await {
                    Ok(saved) if saved.status != before => page_expired += 1,
                    Ok(_) => {}
                    Err(e) => {
                        report.failed += 1;
                        tracing::warn!(barcode = %number, error = %e, "Expiry sweep: barcode skipped");
                    }
                }
            }

            report.examined += page_len;
            report.expired += page_expired;
            if (page_len as i64) < self.batch_size || page_expired == 0 {
                break;
            }
        }
        Ok(report)
    }

    /// Sweep every `interval` until `cancel` fires. The first sweep runs
    /// immediately.
    pub async fn run(self, interval: Duration, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = interval.as_secs(),
            batch_size = self.batch_size,
            "Expiry sweep started"
        );

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Expiry sweep stopping");
                    break;
                }
                _ = ticker.tick() => {
                    match self.sweep_once(&cancel).await {
                        Ok(report) if report.examined > 0 => {
                            tracing::info!(
                                examined = report.examined,
                                expired = report.expired,
                                failed = report.failed,
                                "Expiry sweep finished"
                            );
                        }
                        Ok(_) => tracing::debug!("Expiry sweep: nothing due"),
                        Err(CoreError::Cancelled) => {}
                        Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
