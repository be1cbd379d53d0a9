//! Listing lifecycle.
//!
//! ```text
//! DRAFT --submit--> PENDING --validate--> APPROVED --sell--> SOLD
//!   ^ edit                  \--refuse---> REJECTED
//! ```
//!
//! Creation always lands in DRAFT and deletion is allowed from any status,
//! so neither appears in the table.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::model::ListingStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingAction {
    Edit,
    Submit,
    Validate,
    Refuse,
    /// Sale completion, driven by an order collaborator outside this service.
    Sell,
}

impl fmt::Display for ListingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ListingAction::Edit => "edit",
            ListingAction::Submit => "submit",
            ListingAction::Validate => "validate",
            ListingAction::Refuse => "refuse",
            ListingAction::Sell => "sell",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("cannot {action} a listing in status {from}")]
pub struct TransitionError {
    pub from: ListingStatus,
    pub action: ListingAction,
}

impl ListingAction {
    /// The only status this action may be applied from.
    pub fn source(self) -> ListingStatus {
        match self {
            ListingAction::Edit | ListingAction::Submit => ListingStatus::Draft,
            ListingAction::Validate | ListingAction::Refuse => ListingStatus::Pending,
            ListingAction::Sell => ListingStatus::Approved,
        }
    }

    pub fn target(self) -> ListingStatus {
        match self {
            ListingAction::Edit => ListingStatus::Draft,
            ListingAction::Submit => ListingStatus::Pending,
            ListingAction::Validate => ListingStatus::Approved,
            ListingAction::Refuse => ListingStatus::Rejected,
            ListingAction::Sell => ListingStatus::Sold,
        }
    }
}

/// Returns the status reached by applying `action` to a listing in `from`.
pub fn transition(from: ListingStatus, action: ListingAction) -> Result<ListingStatus, TransitionError> {
    if from == action.source() {
        Ok(action.target())
    } else {
        Err(TransitionError { from, action })
    }
}
