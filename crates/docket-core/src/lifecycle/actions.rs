//! Named user-facing actions for graph edges.

use serde::Serialize;
use std::fmt;

use crate::model::TicketStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Assign,
    Accept,
    Claim,
    Approve,
    StartProgress,
    Resume,
    Suspend,
    Resolve,
    Close,
    Reject,
    Return,
    Reopen,
    Requeue,
    Resubmit,
    Reprocess,
    SendBack,
    Withdraw,
}

impl ActionKind {
    /// Name of the `from -> to` edge. The edge out of `closed` that matches
    /// `reopen_target` is [`Self::Reopen`]; the other keeps a plain name, so
    /// every convenience action accepts the edge it is named for.
    #[must_use]
    pub fn for_edge(from: TicketStatus, to: TicketStatus, reopen_target: TicketStatus) -> Self {
        use TicketStatus::{
            Accepted, Approved, Assigned, Closed, InProgress, Pending, Rejected, Resolved,
            Returned, Submitted,
        };
        match (from, to) {
            (Closed, _) if to == reopen_target => Self::Reopen,
            (Closed, Submitted) => Self::Requeue,
            (Closed | Resolved, InProgress) => Self::Reprocess,
            (_, Assigned) => Self::Assign,
            (Assigned, Accepted) => Self::Accept,
            (_, Accepted) => Self::Claim,
            (InProgress, Approved) => Self::SendBack,
            (_, Approved) => Self::Approve,
            (Pending, InProgress) => Self::Resume,
            (_, InProgress) => Self::StartProgress,
            (_, Pending) => Self::Suspend,
            (_, Resolved) => Self::Resolve,
            (_, Closed) => Self::Close,
            (_, Rejected) => Self::Reject,
            (_, Returned) => Self::Return,
            (Rejected | Returned, Submitted) => Self::Resubmit,
            (_, Submitted) => Self::Withdraw,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Assign => "assign",
            Self::Accept => "accept",
            Self::Claim => "claim",
            Self::Approve => "approve",
            Self::StartProgress => "start_progress",
            Self::Resume => "resume",
            Self::Suspend => "suspend",
            Self::Resolve => "resolve",
            Self::Close => "close",
            Self::Reject => "reject",
            Self::Return => "return",
            Self::Reopen => "reopen",
            Self::Requeue => "requeue",
            Self::Resubmit => "resubmit",
            Self::Reprocess => "reprocess",
            Self::SendBack => "send_back",
            Self::Withdraw => "withdraw",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Assign => "Assign ticket",
            Self::Accept => "Accept ticket",
            Self::Claim => "Take ticket",
            Self::Approve => "Approve",
            Self::StartProgress => "Start progress",
            Self::Resume => "Resume work",
            Self::Suspend => "Put on hold",
            Self::Resolve => "Mark resolved",
            Self::Close => "Close ticket",
            Self::Reject => "Reject",
            Self::Return => "Return for changes",
            Self::Reopen => "Reopen",
            Self::Requeue => "Reopen into queue",
            Self::Resubmit => "Resubmit",
            Self::Reprocess => "Reprocess",
            Self::SendBack => "Send back for approval",
            Self::Withdraw => "Withdraw assignment",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One action an actor may take on a ticket right now. `target` is always
/// reachable through a plain transition; `action` names the edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvailableAction {
    pub action: ActionKind,
    pub target: TicketStatus,
    pub label: &'static str,
}

impl AvailableAction {
    #[must_use]
    pub fn for_edge(from: TicketStatus, to: TicketStatus, reopen_target: TicketStatus) -> Self {
        let action = ActionKind::for_edge(from, to, reopen_target);
        Self {
            action,
            target: to,
            label: action.label(),
        }
    }
}
