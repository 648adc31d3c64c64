use super::ticket::{TicketId, TicketStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::ticket::ParseEnumError;

/// Short audit code recorded for a transition.
///
/// Derived from the validated `(from, to)` pair, never from request text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Assigned,
    Accepted,
    Approved,
    InProgress,
    Pending,
    Resolved,
    Closed,
    Rejected,
    Returned,
    Submitted,
    Reopened,
    Resubmitted,
}

impl HistoryAction {
    #[must_use]
    pub const fn for_transition(from: TicketStatus, to: TicketStatus) -> Self {
        match (from, to) {
            (TicketStatus::Closed, _) => Self::Reopened,
            (TicketStatus::Rejected | TicketStatus::Returned, TicketStatus::Submitted) => {
                Self::Resubmitted
            }
            (_, TicketStatus::Submitted) => Self::Submitted,
            (_, TicketStatus::Assigned) => Self::Assigned,
            (_, TicketStatus::Accepted) => Self::Accepted,
            (_, TicketStatus::Approved) => Self::Approved,
            (_, TicketStatus::InProgress) => Self::InProgress,
            (_, TicketStatus::Pending) => Self::Pending,
            (_, TicketStatus::Resolved) => Self::Resolved,
            (_, TicketStatus::Closed) => Self::Closed,
            (_, TicketStatus::Rejected) => Self::Rejected,
            (_, TicketStatus::Returned) => Self::Returned,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::Approved => "approved",
            Self::InProgress => "in_progress",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
            Self::Submitted => "submitted",
            Self::Reopened => "reopened",
            Self::Resubmitted => "resubmitted",
        }
    }

    /// Sentence fragment used in notification bodies.
    #[must_use]
    pub const fn phrase(self) -> &'static str {
        match self {
            Self::Assigned => "has been assigned",
            Self::Accepted => "has been accepted",
            Self::Approved => "has been approved",
            Self::InProgress => "is in progress",
            Self::Pending => "is pending feedback",
            Self::Resolved => "has been resolved",
            Self::Closed => "has been closed",
            Self::Rejected => "has been rejected",
            Self::Returned => "has been returned",
            Self::Submitted => "has been submitted",
            Self::Reopened => "has been reopened",
            Self::Resubmitted => "has been resubmitted",
        }
    }
}

impl fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryAction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "assigned" => Ok(Self::Assigned),
            "accepted" => Ok(Self::Accepted),
            "approved" => Ok(Self::Approved),
            "in_progress" => Ok(Self::InProgress),
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            "rejected" => Ok(Self::Rejected),
            "returned" => Ok(Self::Returned),
            "submitted" => Ok(Self::Submitted),
            "reopened" => Ok(Self::Reopened),
            "resubmitted" => Ok(Self::Resubmitted),
            _ => Err(ParseEnumError {
                expected: "history action",
                got: s.to_string(),
            }),
        }
    }
}

/// An audit record waiting to be appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHistoryEntry {
    pub ticket_id: TicketId,
    pub actor_id: UserId,
    pub action: HistoryAction,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl NewHistoryEntry {
    /// Build the record for a `from -> to` transition.
    #[must_use]
    pub fn for_transition(
        ticket_id: TicketId,
        actor_id: UserId,
        from: TicketStatus,
        to: TicketStatus,
        comment: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        let mut description = format!("status: {from} -> {to}");
        let comment = comment.trim();
        if !comment.is_empty() {
            description.push_str("; comment: ");
            description.push_str(comment);
        }
        Self {
            ticket_id,
            actor_id,
            action: HistoryAction::for_transition(from, to),
            description,
            created_at,
        }
    }

    #[must_use]
    pub fn with_id(self, id: u64) -> HistoryEntry {
        HistoryEntry {
            id,
            ticket_id: self.ticket_id,
            actor_id: self.actor_id,
            action: self.action,
            description: self.description,
            created_at: self.created_at,
        }
    }
}

/// Immutable audit record of one transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub ticket_id: TicketId,
    pub actor_id: UserId,
    pub action: HistoryAction,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
