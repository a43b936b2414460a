//! Warranty event bus and notification delivery.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`PlatformEvent`]: the event envelope carried on the bus.
//! - [`BusNotificationSink`]: the notification port implementation that
//!   forwards every [`rex_core::notification::WarrantyEvent`] onto the bus.

pub mod bus;
pub mod sink;

pub use bus::{EventBus, PlatformEvent};
pub use sink::BusNotificationSink;
