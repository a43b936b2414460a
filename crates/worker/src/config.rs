use std::time::Duration;

use anyhow::{bail, Context};
use rex_core::config::WarrantyConfig;

/// Default pause between expiry sweeps: one hour.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Default number of barcodes examined per page.
pub const DEFAULT_SWEEP_BATCH_SIZE: i64 = 500;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub sweep_interval: Duration,
    pub sweep_batch_size: i64,
    pub warranty: WarrantyConfig,
}

impl WorkerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                       | Default |
    /// |-------------------------------|---------|
    /// | `DATABASE_URL`                | required |
    /// | `EXPIRY_SWEEP_INTERVAL_SECS`  | `3600`  |
    /// | `EXPIRY_SWEEP_BATCH_SIZE`     | `500`   |
    ///
    /// The generator and QR settings come from [`WarrantyConfig::from_env`].
    pub fn from_env() -> anyhow::Result<Self> {
        let warranty = WarrantyConfig::from_env().context("Invalid warranty configuration")?;
        Self::from_lookup(|key| std::env::var(key).ok(), warranty)
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        warranty: WarrantyConfig,
    ) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;

        let interval_secs: u64 = match lookup("EXPIRY_SWEEP_INTERVAL_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("EXPIRY_SWEEP_INTERVAL_SECS must be a valid u64, got '{raw}'"))?,
            None => DEFAULT_SWEEP_INTERVAL_SECS,
        };
        if interval_secs == 0 {
            bail!("EXPIRY_SWEEP_INTERVAL_SECS must be positive");
        }

        let sweep_batch_size: i64 = match lookup("EXPIRY_SWEEP_BATCH_SIZE") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("EXPIRY_SWEEP_BATCH_SIZE must be a valid i64, got '{raw}'"))?,
            None => DEFAULT_SWEEP_BATCH_SIZE,
        };
        if sweep_batch_size < 1 {
            bail!("EXPIRY_SWEEP_BATCH_SIZE must be at least 1");
        }

        Ok(Self {
            database_url,
            sweep_interval: Duration::from_secs(interval_secs),
            sweep_batch_size,
            warranty,
        })
    }
}
