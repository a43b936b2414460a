//! Domain events handed to the optional notification sink.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

/// Event published after the owning transition has been persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WarrantyEvent {
    ClaimValidated {
        claim_id: DbId,
        claim_number: String,
        storefront_id: DbId,
        customer_id: DbId,
        validated_by: DbId,
        at: Timestamp,
    },
    ShipmentCreated {
        claim_id: DbId,
        claim_number: String,
        storefront_id: DbId,
        customer_id: DbId,
        shipping_provider: String,
        tracking_number: String,
        estimated_delivery_date: Option<NaiveDate>,
        at: Timestamp,
    },
    ClaimCompleted {
        claim_id: DbId,
        claim_number: String,
        storefront_id: DbId,
        customer_id: DbId,
        at: Timestamp,
    },
    BarcodeActivated {
        barcode_id: DbId,
        barcode_number: String,
        storefront_id: DbId,
        customer_id: DbId,
        expiry_date: NaiveDate,
        at: Timestamp,
    },
}

impl WarrantyEvent {
    /// Dot-separated event name, e.g. `"claim.validated"`.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ClaimValidated { .. } => "claim.validated",
            Self::ShipmentCreated { .. } => "claim.shipment_created",
            Self::ClaimCompleted { .. } => "claim.completed",
            Self::BarcodeActivated { .. } => "barcode.activated",
        }
    }

    /// Entity kind and id the event is about.
    pub fn source(&self) -> (&'static str, DbId) {
        match self {
            Self::ClaimValidated { claim_id, .. }
            | Self::ShipmentCreated { claim_id, .. }
            | Self::ClaimCompleted { claim_id, .. } => ("claim", *claim_id),
            Self::BarcodeActivated { barcode_id, .. } => ("barcode", *barcode_id),
        }
    }

    /// Customer the event concerns.
    pub fn customer_id(&self) -> DbId {
        match self {
            Self::ClaimValidated { customer_id, .. }
            | Self::ShipmentCreated { customer_id, .. }
            | Self::ClaimCompleted { customer_id, .. }
            | Self::BarcodeActivated { customer_id, .. } => *customer_id,
        }
    }

    pub fn storefront_id(&self) -> DbId {
        match self {
            Self::ClaimValidated { storefront_id, .. }
            | Self::ShipmentCreated { storefront_id, .. }
            | Self::ClaimCompleted { storefront_id, .. }
            | Self::BarcodeActivated { storefront_id, .. } => *storefront_id,
        }
    }

    /// When the owning transition happened.
    pub fn occurred_at(&self) -> Timestamp {
        match self {
            Self::ClaimValidated { at, .. }
            | Self::ShipmentCreated { at, .. }
            | Self::ClaimCompleted { at, .. }
            | Self::BarcodeActivated { at, .. } => *at,
        }
    }
}
