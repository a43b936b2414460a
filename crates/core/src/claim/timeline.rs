//! Append-only claim timeline.
//!
//! Each meaningful claim mutation produces exactly one entry. Entries are
//! built through the semantic constructors on [`NewTimelineEntry`], which
//! fill the event type, the metadata the event needs, and the default
//! customer visibility. There is no update or delete.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::status::ClaimStatus;
use crate::error::CoreError;
use crate::types::{DbId, Timestamp};

status_enum! {
    /// Kind of event recorded on a claim timeline.
    pub enum TimelineEventType {
        StatusChange => "status_change",
        NoteAdded => "note_added",
        AttachmentUploaded => "attachment_uploaded",
        AssignmentChanged => "assignment_changed",
        RepairStarted => "repair_started",
        RepairCompleted => "repair_completed",
        ShipmentCreated => "shipment_created",
        DeliveryUpdate => "delivery_update",
        CustomerContact => "customer_contact",
        SystemUpdate => "system_update",
    }
}

status_enum! {
    /// Who performed a recorded action.
    pub enum ActorType {
        Customer => "customer",
        Admin => "admin",
        Technician => "technician",
        System => "system",
    }
}

/// The party performing a claim operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<DbId>,
    pub kind: ActorType,
}

impl Actor {
    pub fn customer(id: DbId) -> Self {
        Self {
            id: Some(id),
            kind: ActorType::Customer,
        }
    }

    pub fn admin(id: DbId) -> Self {
        Self {
            id: Some(id),
            kind: ActorType::Admin,
        }
    }

    pub fn technician(id: DbId) -> Self {
        Self {
            id: Some(id),
            kind: ActorType::Technician,
        }
    }

    pub fn system() -> Self {
        Self {
            id: None,
            kind: ActorType::System,
        }
    }

    /// Every actor except the system must be identified.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.kind != ActorType::System && self.id.is_none() {
            return Err(CoreError::Validation(format!(
                "A {} actor must have an id",
                self.kind
            )));
        }
        Ok(())
    }
}

/// Structured metadata stored with a timeline entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technician_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repair_ticket_id: Option<DbId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shipping_provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_reason: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional: serde_json::Map<String, serde_json::Value>,
}

/// A persisted timeline entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub id: DbId,
    pub claim_id: DbId,
    pub event_type: TimelineEventType,
    pub from_status: Option<ClaimStatus>,
    pub to_status: Option<ClaimStatus>,
    pub actor_id: Option<DbId>,
    pub actor_type: ActorType,
    pub description: String,
    pub metadata: TimelineMetadata,
    pub is_customer_visible: bool,
    pub created_at: Timestamp,
}

/// A timeline entry awaiting insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTimelineEntry {
    pub claim_id: DbId,
    pub event_type: TimelineEventType,
    pub from_status: Option<ClaimStatus>,
    pub to_status: Option<ClaimStatus>,
    pub actor_id: Option<DbId>,
    pub actor_type: ActorType,
    pub description: String,
    pub metadata: TimelineMetadata,
    pub is_customer_visible: bool,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Semantic constructors
// ---------------------------------------------------------------------------

impl NewTimelineEntry {
    fn base(
        claim_id: DbId,
        event_type: TimelineEventType,
        actor: Actor,
        description: String,
        is_customer_visible: bool,
        now: Timestamp,
    ) -> Self {
        Self {
            claim_id,
            event_type,
            from_status: None,
            to_status: None,
            actor_id: actor.id,
            actor_type: actor.kind,
            description,
            metadata: TimelineMetadata::default(),
            is_customer_visible,
            created_at: now,
        }
    }

    /// Status transition. Customer-visible.
    pub fn status_change(
        claim_id: DbId,
        from: ClaimStatus,
        to: ClaimStatus,
        actor: Actor,
        note: Option<&str>,
        now: Timestamp,
    ) -> Self {
        let description = match note.map(str::trim).filter(|n| !n.is_empty()) {
            Some(n) => format!("Status changed from {from} to {to}: {n}"),
            None => format!("Status changed from {from} to {to}"),
        };
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::StatusChange,
            actor,
            description,
            true,
            now,
        );
        entry.from_status = Some(from);
        entry.to_status = Some(to);
        entry.metadata.old_value = Some(from.to_string());
        entry.metadata.new_value = Some(to.to_string());
        entry
    }

    /// Free-text note; the caller picks the visibility.
    pub fn note_added(
        claim_id: DbId,
        actor: Actor,
        content: &str,
        is_customer_visible: bool,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::NoteAdded,
            actor,
            "Note added".to_string(),
            is_customer_visible,
            now,
        );
        entry.metadata.note_content = Some(content.to_string());
        entry
    }

    /// File attached to the claim. Customer-visible.
    pub fn attachment_uploaded(
        claim_id: DbId,
        actor: Actor,
        attachment_id: &str,
        filename: &str,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::AttachmentUploaded,
            actor,
            format!("Attachment uploaded: {filename}"),
            true,
            now,
        );
        entry.metadata.attachment_id = Some(attachment_id.to_string());
        entry.metadata.filename = Some(filename.to_string());
        entry
    }

    /// Technician (re)assignment. Internal.
    pub fn assignment_changed(
        claim_id: DbId,
        actor: Actor,
        previous: Option<DbId>,
        technician_id: DbId,
        now: Timestamp,
    ) -> Self {
        let description = match previous {
            Some(prev) => format!("Technician reassigned from {prev} to {technician_id}"),
            None => format!("Technician {technician_id} assigned"),
        };
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::AssignmentChanged,
            actor,
            description,
            false,
            now,
        );
        entry.metadata.technician_id = Some(technician_id);
        entry.metadata.old_value = previous.map(|p| p.to_string());
        entry.metadata.new_value = Some(technician_id.to_string());
        entry
    }

    /// Work began on a repair ticket. Customer-visible.
    pub fn repair_started(
        claim_id: DbId,
        actor: Actor,
        ticket_id: DbId,
        technician_id: DbId,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::RepairStarted,
            actor,
            "Repair work started".to_string(),
            true,
            now,
        );
        entry.metadata.repair_ticket_id = Some(ticket_id);
        entry.metadata.technician_id = Some(technician_id);
        entry
    }

    /// A repair ticket finished successfully. Customer-visible.
    pub fn repair_completed(
        claim_id: DbId,
        actor: Actor,
        ticket_id: DbId,
        technician_id: DbId,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::RepairCompleted,
            actor,
            "Repair work completed".to_string(),
            true,
            now,
        );
        entry.metadata.repair_ticket_id = Some(ticket_id);
        entry.metadata.technician_id = Some(technician_id);
        entry
    }

    /// A shipment label was created. Customer-visible.
    pub fn shipment_created(
        claim_id: DbId,
        actor: Actor,
        provider: &str,
        tracking_number: &str,
        estimated_date: Option<NaiveDate>,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::ShipmentCreated,
            actor,
            format!("Shipment created with {provider} (tracking {tracking_number})"),
            true,
            now,
        );
        entry.metadata.shipping_provider = Some(provider.to_string());
        entry.metadata.tracking_number = Some(tracking_number.to_string());
        entry.metadata.estimated_date = estimated_date;
        entry
    }

    /// Carrier progress on an outgoing shipment. Customer-visible.
    pub fn delivery_update(
        claim_id: DbId,
        actor: Actor,
        delivery_status: &str,
        tracking_number: Option<&str>,
        actual_date: Option<Timestamp>,
        note: Option<&str>,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::DeliveryUpdate,
            actor,
            format!("Delivery status: {delivery_status}"),
            true,
            now,
        );
        entry.metadata.new_value = Some(delivery_status.to_string());
        entry.metadata.tracking_number = tracking_number.map(str::to_string);
        entry.metadata.actual_date = actual_date;
        entry.metadata.note_content = note.map(str::to_string);
        entry
    }

    /// Staff contacted the customer. Internal.
    pub fn customer_contact(
        claim_id: DbId,
        actor: Actor,
        method: &str,
        reason: &str,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::CustomerContact,
            actor,
            format!("Customer contacted via {method}"),
            false,
            now,
        );
        entry.metadata.contact_method = Some(method.to_string());
        entry.metadata.contact_reason = Some(reason.to_string());
        entry
    }

    /// Automated change. Internal, attributed to the system actor.
    pub fn system_update(
        claim_id: DbId,
        description: &str,
        additional: serde_json::Map<String, serde_json::Value>,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self::base(
            claim_id,
            TimelineEventType::SystemUpdate,
            Actor::system(),
            description.to_string(),
            false,
            now,
        );
        entry.metadata.additional = additional;
        entry
    }

    pub fn with_metadata(mut self, f: impl FnOnce(&mut TimelineMetadata)) -> Self {
        f(&mut self.metadata);
        self
    }

    /// Check the structural invariants before persisting.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.description.trim().is_empty() {
            return Err(CoreError::Validation(
                "Timeline entry description is required".to_string(),
            ));
        }
        if self.event_type == TimelineEventType::StatusChange
            && (self.from_status.is_none() || self.to_status.is_none())
        {
            return Err(CoreError::Validation(
                "Status change entries need both from_status and to_status".to_string(),
            ));
        }
        if self.actor_type != ActorType::System && self.actor_id.is_none() {
            return Err(CoreError::Validation(format!(
                "Timeline entries by a {} actor need an actor_id",
                self.actor_type
            )));
        }
        Ok(())
    }

    /// Materialize with a store-assigned id.
    pub fn into_entry(self, id: DbId) -> TimelineEntry {
        TimelineEntry {
            id,
            claim_id: self.claim_id,
            event_type: self.event_type,
            from_status: self.from_status,
            to_status: self.to_status,
            actor_id: self.actor_id,
            actor_type: self.actor_type,
            description: self.description,
            metadata: self.metadata,
            is_customer_visible: self.is_customer_visible,
            created_at: self.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// Display helpers (computed, never persisted)
// ---------------------------------------------------------------------------

/// Render the age of `at` relative to `now`, e.g. `"5 minutes ago"`.
pub fn relative_time(at: Timestamp, now: Timestamp) -> String {
    let secs = (now - at).num_seconds().max(0);
    let plural = |n: i64, unit: &str| {
        if n == 1 {
            format!("1 {unit} ago")
        } else {
            format!("{n} {unit}s ago")
        }
    };

    match secs {
        0..=59 => "just now".to_string(),
        60..=3_599 => plural(secs / 60, "minute"),
        3_600..=86_399 => plural(secs / 3_600, "hour"),
        86_400..=2_591_999 => plural(secs / 86_400, "day"),
        _ => at.format("%Y-%m-%d").to_string(),
    }
}

impl TimelineEntry {
    /// Icon name hint for front ends.
    pub fn icon(&self) -> &'static str {
        match self.event_type {
            TimelineEventType::StatusChange => "refresh-cw",
            TimelineEventType::NoteAdded => "message-square",
            TimelineEventType::AttachmentUploaded => "paperclip",
            TimelineEventType::AssignmentChanged => "user-check",
            TimelineEventType::RepairStarted => "tool",
            TimelineEventType::RepairCompleted => "check-circle",
            TimelineEventType::ShipmentCreated => "package",
            TimelineEventType::DeliveryUpdate => "truck",
            TimelineEventType::CustomerContact => "phone",
            TimelineEventType::SystemUpdate => "settings",
        }
    }

    /// Color hint for front ends.
    pub fn color(&self) -> &'static str {
        match (self.event_type, self.to_status) {
            (TimelineEventType::StatusChange, Some(ClaimStatus::Completed)) => "green",
            (
                TimelineEventType::StatusChange,
                Some(ClaimStatus::Rejected | ClaimStatus::Cancelled),
            ) => "red",
            (TimelineEventType::StatusChange, Some(ClaimStatus::Disputed)) => "orange",
            (TimelineEventType::StatusChange, _) => "blue",
            (TimelineEventType::RepairCompleted, _) => "green",
            (TimelineEventType::RepairStarted, _) => "yellow",
            (TimelineEventType::ShipmentCreated | TimelineEventType::DeliveryUpdate, _) => {
                "purple"
            }
            _ => "gray",
        }
    }

    /// Whether the entry deserves emphasis in a timeline view.
    pub fn is_important(&self) -> bool {
        match self.event_type {
            TimelineEventType::StatusChange => matches!(
                self.to_status,
                Some(
                    ClaimStatus::Validated
                        | ClaimStatus::Completed
                        | ClaimStatus::Rejected
                        | ClaimStatus::Shipped
                )
            ),
            TimelineEventType::RepairCompleted | TimelineEventType::ShipmentCreated => true,
            _ => false,
        }
    }

    pub fn relative_time(&self, now: Timestamp) -> String {
        relative_time(self.created_at, now)
    }
}

/// Keep only the entries a customer may see.
pub fn customer_view(entries: &[TimelineEntry]) -> Vec<TimelineEntry> {
    entries
        .iter()
        .filter(|e| e.is_customer_visible)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
