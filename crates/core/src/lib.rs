//! Warranty lifecycle engine.
//!
//! Pure domain logic for the storefront warranty workflow: barcode issuance
//! and lifecycle, batch generation, the claim workflow with its nested repair
//! tickets, and the append-only claim timeline. Persistence, clocks, entropy
//! and notifications are reached through the traits in [`ports`].

#[macro_use]
mod macros;

pub mod barcode;
pub mod claim;
pub mod config;
pub mod error;
pub mod memory;
pub mod notification;
pub mod ports;
pub mod types;
