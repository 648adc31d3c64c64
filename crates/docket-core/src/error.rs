use std::fmt;

use crate::lifecycle::policy::Requirement;
use crate::model::{TicketId, TicketStatus};
use crate::store::StoreError;

/// Machine-readable error codes for client-side decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    TicketNotFound,
    InvalidTransition,
    Forbidden,
    ValidationFailed,
    InvalidEnumValue,
    TransitionConflict,
    PersistenceFailed,
    CorruptRecord,
    NotificationFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::TicketNotFound => "E2001",
            Self::InvalidTransition => "E2002",
            Self::Forbidden => "E2003",
            Self::ValidationFailed => "E2004",
            Self::InvalidEnumValue => "E2005",
            Self::TransitionConflict => "E3001",
            Self::PersistenceFailed => "E5001",
            Self::CorruptRecord => "E5002",
            Self::NotificationFailed => "E6001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::TicketNotFound => "Ticket not found",
            Self::InvalidTransition => "Invalid status transition",
            Self::Forbidden => "Transition not permitted for this actor",
            Self::ValidationFailed => "Request validation failed",
            Self::InvalidEnumValue => "Invalid status/priority/type value",
            Self::TransitionConflict => "Ticket changed concurrently",
            Self::PersistenceFailed => "Storage write failed",
            Self::CorruptRecord => "Stored record is corrupt",
            Self::NotificationFailed => "Notification delivery failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and clients.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `dk init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .docket/config.toml and retry."),
            Self::TicketNotFound => None,
            Self::InvalidTransition => {
                Some("Pick one of the allowed transitions reported with this error.")
            }
            Self::Forbidden => Some("Ask someone holding one of the required roles to act."),
            Self::ValidationFailed => None,
            Self::InvalidEnumValue => Some("Use one of the documented status/priority/type values."),
            Self::TransitionConflict => {
                Some("Reload the ticket and retry against its current status.")
            }
            Self::PersistenceFailed => Some("Check database availability and disk space."),
            Self::CorruptRecord => Some("Inspect the offending row; it fails to decode."),
            Self::NotificationFailed => Some("Check the notification channel configuration."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures returned synchronously by the lifecycle service.
///
/// Notification failures never reach the caller and have no variant here.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("ticket {ticket_id} not found")]
    TicketNotFound { ticket_id: TicketId },

    #[error("cannot move ticket from {from} to {to}; allowed: {}", join_statuses(.allowed))]
    InvalidTransition {
        from: TicketStatus,
        to: TicketStatus,
        allowed: Vec<TicketStatus>,
    },

    #[error("moving ticket to {target} requires one of: {}", join_requirements(.required))]
    Forbidden {
        target: TicketStatus,
        required: Vec<Requirement>,
    },

    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("ticket {ticket_id} changed concurrently: {reason}")]
    Conflict { ticket_id: TicketId, reason: String },

    #[error(transparent)]
    Persistence(#[from] StoreError),
}

impl LifecycleError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::TicketNotFound { .. } => ErrorCode::TicketNotFound,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::Forbidden { .. } => ErrorCode::Forbidden,
            Self::Validation { .. } => ErrorCode::ValidationFailed,
            Self::Conflict { .. } => ErrorCode::TransitionConflict,
            Self::Persistence(err) => err.code(),
        }
    }

    /// Optional remediation hint for operators and clients.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

fn join_statuses(statuses: &[TicketStatus]) -> String {
    if statuses.is_empty() {
        return "none".to_string();
    }
    statuses
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_requirements(required: &[Requirement]) -> String {
    required
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
