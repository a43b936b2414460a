//! Notification port backed by the [`EventBus`].

use std::sync::Arc;

use rex_core::notification::WarrantyEvent;
use rex_core::ports::NotificationSink;

use crate::bus::{EventBus, PlatformEvent};

/// Forwards every [`WarrantyEvent`] onto an [`EventBus`].
///
/// Delivery is at most once: with no subscribers, or with a subscriber that
/// lags past the channel capacity, the event is lost.
#[derive(Clone)]
pub struct BusNotificationSink {
    bus: Arc<EventBus>,
}

impl BusNotificationSink {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}

/// Build the bus envelope for a warranty event.
pub fn to_platform_event(event: &WarrantyEvent) -> PlatformEvent {
    let (entity_type, entity_id) = event.source();
    let payload = match serde_json::to_value(event) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, event_type = event.event_type(), "Event payload not serializable");
            serde_json::Value::Object(Default::default())
        }
    };

    let mut platform = PlatformEvent::new(event.event_type(), event.occurred_at())
        .with_source(entity_type, entity_id)
        .with_storefront(event.storefront_id())
        .with_payload(payload);
    if let WarrantyEvent::ClaimValidated { validated_by, .. } = event {
        platform = platform.with_actor(*validated_by);
    }
    platform
}

impl NotificationSink for BusNotificationSink {
    fn notify(&self, event: WarrantyEvent) {
        let platform = to_platform_event(&event);
        let delivered = self.bus.publish(platform);
        tracing::debug!(
            event_type = event.event_type(),
            customer_id = event.customer_id(),
            delivered,
            "Warranty event published",
        );
    }
}
