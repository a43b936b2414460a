//! Warranty barcodes: format, secure issuance, batch runs, and lifecycle.

pub mod batch;
pub mod codec;
pub mod generator;
pub mod lifecycle;
pub mod model;
pub mod stats;
