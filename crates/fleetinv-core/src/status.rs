//! Inventory status state machine

use fleetinv_api::{InventoryStatus, ResourceCategory};

use crate::error::CoreError;

/// Status of the parent a new resource is being created under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentStatus {
    pub status: InventoryStatus,
    pub category: ResourceCategory,
}

/// Outcome of re-reporting an existing resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rereport {
    /// Status carried forward unchanged
    Keep(InventoryStatus),
    /// Deleted resource reported again, reset to `NEW`
    Revive,
    /// Purge pending, the reported subtree is skipped
    Skip,
}

/// Rules governing inventory status changes
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusTransitionPolicy;

impl StatusTransitionPolicy {
    /// Check whether `from -> to` is a legal edge
    #[must_use]
    pub fn can_transition_to(from: InventoryStatus, to: InventoryStatus) -> bool {
        use InventoryStatus::{Committed, Deleted, Ignored, New, Uninventoried};

        matches!(
            (from, to),
            (New, Committed)
                | (New, Ignored)
                | (Ignored, New)
                | (Ignored, Committed)
                | (Committed, Deleted)
                | (Deleted, Uninventoried)
                | (Deleted, New)
        )
    }

    /// Validate a transition, treating a no-op as legal
    pub fn check(from: InventoryStatus, to: InventoryStatus) -> Result<(), CoreError> {
        if from == to || Self::can_transition_to(from, to) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { from, to })
        }
    }

    /// Initial status of a brand-new resource
    ///
    /// Auto-commit applies only under a committed parent, when the new
    /// resource is a service or the parent is a server.
    #[must_use]
    pub fn initial_status(parent: Option<ParentStatus>, category: ResourceCategory) -> InventoryStatus {
        match parent {
            Some(parent)
                if parent.status == InventoryStatus::Committed
                    && (category == ResourceCategory::Service
                        || parent.category == ResourceCategory::Server) =>
            {
                InventoryStatus::Committed
            }
            _ => InventoryStatus::New,
        }
    }

    /// Status of an existing resource after an agent reports it again
    ///
    /// The reported status is never consulted.
    #[must_use]
    pub fn on_rereport(existing: InventoryStatus) -> Rereport {
        match existing {
            InventoryStatus::Deleted => Rereport::Revive,
            InventoryStatus::Uninventoried => Rereport::Skip,
            status => Rereport::Keep(status),
        }
    }
}
