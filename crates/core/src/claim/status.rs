//! Claim status graph.
//!
//! ```text
//! pending   -> validated, rejected, cancelled
//! validated -> assigned, cancelled
//! assigned  -> in_repair, cancelled
//! in_repair -> repaired, replaced, disputed
//! repaired  -> shipped
//! replaced  -> shipped
//! shipped   -> delivered
//! delivered -> completed, disputed
//! disputed  -> validated, rejected
//! ```
//!
//! `completed`, `cancelled`, and `rejected` are terminal. A transition to the
//! current status is not a transition and is refused.

use crate::error::CoreError;

status_enum! {
    /// Where a warranty claim is in its workflow.
    pub enum ClaimStatus {
        Pending => "pending",
        Validated => "validated",
        Assigned => "assigned",
        InRepair => "in_repair",
        Repaired => "repaired",
        Replaced => "replaced",
        Shipped => "shipped",
        Delivered => "delivered",
        Completed => "completed",
        Cancelled => "cancelled",
        Rejected => "rejected",
        Disputed => "disputed",
    }
}

impl ClaimStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Rejected)
    }

    /// Statuses reachable in one step.
    pub fn valid_transitions(self) -> &'static [ClaimStatus] {
        use ClaimStatus::*;
        match self {
            Pending => &[Validated, Rejected, Cancelled],
            Validated => &[Assigned, Cancelled],
            Assigned => &[InRepair, Cancelled],
            InRepair => &[Repaired, Replaced, Disputed],
            Repaired | Replaced => &[Shipped],
            Shipped => &[Delivered],
            Delivered => &[Completed, Disputed],
            Disputed => &[Validated, Rejected],
            Completed | Cancelled | Rejected => &[],
        }
    }

    pub fn can_transition_to(self, next: ClaimStatus) -> bool {
        self.valid_transitions().contains(&next)
    }

    /// Whether the claim may still be cancelled by the customer or an admin.
    pub fn is_cancellable(self) -> bool {
        self.can_transition_to(Self::Cancelled)
    }
}

/// Validate that a claim may move from `current` to `next`.
pub fn validate_transition(current: ClaimStatus, next: ClaimStatus) -> Result<(), CoreError> {
    if current.can_transition_to(next) {
        Ok(())
    } else {
        Err(CoreError::InvalidTransition {
            entity: "claim",
            from: current.to_string(),
            to: next.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
