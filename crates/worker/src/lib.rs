//! Background jobs for the warranty engine.
//!
//! [`expiry::ExpirySweeper`] periodically moves barcodes whose warranty has
//! run out into `expired`. It runs until its [`CancellationToken`] fires.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod config;
pub mod expiry;
