//! Dispute entity -- a challenge raised against a ticket.
//!
//! Status only moves forward: Submitted -> UnderReview -> Approved | Rejected.
//! A ticket has at most one non-rejected dispute at a time.

use serde::{Deserialize, Serialize};

use crate::collection::Entity;
use crate::filter::FilterSpec;

/// Review status of a dispute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisputeStatus {
    Submitted,
    UnderReview,
    Approved,
    Rejected,
}

impl DisputeStatus {
    /// Wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    fn rank(self) -> u8 {
        match self {
            Self::Submitted => 0,
            Self::UnderReview => 1,
            Self::Approved | Self::Rejected => 2,
        }
    }

    /// Approved and rejected disputes never change again.
    pub fn is_terminal(self) -> bool {
        self.rank() == 2
    }

    /// Only rejected disputes free the ticket for a new one.
    pub fn is_active(self) -> bool {
        self != Self::Rejected
    }

    /// Whether moving from `self` to `next` keeps the status moving forward.
    pub fn can_become(self, next: DisputeStatus) -> bool {
        if self.is_terminal() {
            return next == self;
        }
        next.rank() >= self.rank()
    }
}

/// A dispute against one ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dispute {
    pub id: String,
    pub ticket_id: String,
    pub status: DisputeStatus,
    pub reason: String,
    /// Uploaded evidence references (file ids or URLs).
    #[serde(default)]
    pub evidence: Vec<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Entity for Dispute {
    fn id(&self) -> &str {
        &self.id
    }
}

impl Dispute {
    /// Merge a server copy into this one without letting the status move
    /// backwards. Returns `false` if the incoming status was a regression
    /// and was ignored.
    pub fn merge_from(&mut self, incoming: Dispute) -> bool {
        let forward = self.status.can_become(incoming.status);
        let status = if forward { incoming.status } else { self.status };
        *self = Dispute { status, ..incoming };
        forward
    }
}

/// Body of a dispute create request. The ticket id travels in the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDispute {
    pub reason: String,
    #[serde(default)]
    pub evidence: Vec<String>,
}

/// Dispute list filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisputeFilter {
    pub status: Option<DisputeStatus>,
    pub ticket_id: Option<String>,
}

/// One assignment to a [`DisputeFilter`] field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisputeFilterField {
    Status(Option<DisputeStatus>),
    TicketId(Option<String>),
}

impl FilterSpec<Dispute> for DisputeFilter {
    type Field = DisputeFilterField;

    fn set(&mut self, field: DisputeFilterField) {
        match field {
            DisputeFilterField::Status(status) => self.status = status,
            DisputeFilterField::TicketId(id) => self.ticket_id = id,
        }
    }

    fn matches(&self, dispute: &Dispute) -> bool {
        self.status.is_none_or(|s| dispute.status == s)
            && self
                .ticket_id
                .as_deref()
                .is_none_or(|id| dispute.ticket_id == id)
    }
}

impl DisputeFilter {
    /// Query parameters for the collection fetch.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(id) = &self.ticket_id {
            pairs.push(("ticketId", id.clone()));
        }
        pairs
    }
}
