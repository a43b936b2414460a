//! Warranty claims: the 12-state workflow, nested repair tickets, and the
//! append-only claim timeline.

pub mod model;
pub mod repair;
pub mod repair_service;
pub mod status;
pub mod timeline;
pub mod workflow;
