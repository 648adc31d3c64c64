use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Numeric ticket identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(pub u64);

impl TicketId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Numeric user identity. Zero is never a valid user.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl UserId {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The ten lifecycle states. No other value is ever persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Submitted,
    Assigned,
    Accepted,
    Approved,
    InProgress,
    Pending,
    Resolved,
    Closed,
    Rejected,
    Returned,
}

impl TicketStatus {
    /// Every status, in lifecycle order.
    pub const ALL: [Self; 10] = [
        Self::Submitted,
        Self::Assigned,
        Self::Accepted,
        Self::Approved,
        Self::InProgress,
        Self::Pending,
        Self::Resolved,
        Self::Closed,
        Self::Rejected,
        Self::Returned,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::Assigned => "assigned",
            Self::Accepted => "accepted",
            Self::Approved => "approved",
            Self::InProgress => "in_progress",
            Self::Pending => "pending",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
            Self::Rejected => "rejected",
            Self::Returned => "returned",
        }
    }

    /// Whether a ticket in this status must carry an assignee.
    #[must_use]
    pub const fn requires_assignee(self) -> bool {
        !matches!(self, Self::Submitted | Self::Rejected | Self::Returned)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    pub const ALL: [Self; 4] = [Self::Low, Self::Normal, Self::High, Self::Critical];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketType {
    Bug,
    Feature,
    #[default]
    Support,
    Change,
    Custom,
}

impl TicketType {
    pub const ALL: [Self; 5] = [
        Self::Bug,
        Self::Feature,
        Self::Support,
        Self::Change,
        Self::Custom,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Bug => "bug",
            Self::Feature => "feature",
            Self::Support => "support",
            Self::Change => "change",
            Self::Custom => "custom",
        }
    }
}

/// A ticket as persisted. `status` is the single source of truth for the
/// lifecycle position; only the lifecycle service changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub title: String,
    pub description: String,
    pub ticket_type: TicketType,
    pub status: TicketStatus,
    pub priority: Priority,
    pub creator_id: UserId,
    pub assignee_id: Option<UserId>,
    pub category: String,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every persisted transition; the store rejects stale writes.
    pub version: u64,
}

impl Ticket {
    #[must_use]
    pub fn is_assignee(&self, user: UserId) -> bool {
        self.assignee_id == Some(user)
    }

    #[must_use]
    pub fn is_creator(&self, user: UserId) -> bool {
        self.creator_id == user
    }

    /// Past the due date and not yet resolved or closed.
    #[must_use]
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_date.is_some_and(|due| now > due)
            && !matches!(self.status, TicketStatus::Resolved | TicketStatus::Closed)
    }

    /// Creator and assignee, deduplicated, creator first.
    #[must_use]
    pub fn stakeholders(&self) -> Vec<UserId> {
        let mut out = vec![self.creator_id];
        if let Some(assignee) = self.assignee_id
            && assignee != self.creator_id
        {
            out.push(assignee);
        }
        out.retain(|user| user.is_valid());
        out
    }
}

/// Input for the ticket creation collaborator. Tickets always start in
/// `submitted`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub ticket_type: TicketType,
    pub priority: Priority,
    pub creator_id: UserId,
    pub category: String,
    pub tags: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
}

impl NewTicket {
    #[must_use]
    pub fn new(title: impl Into<String>, creator_id: UserId) -> Self {
        Self {
            title: title.into(),
            creator_id,
            ..Self::default()
        }
    }

    /// Materialize the ticket row a store should insert.
    #[must_use]
    pub fn into_ticket(self, id: TicketId, now: DateTime<Utc>) -> Ticket {
        Ticket {
            id,
            title: self.title,
            description: self.description,
            ticket_type: self.ticket_type,
            status: TicketStatus::Submitted,
            priority: self.priority,
            creator_id: self.creator_id,
            assignee_id: None,
            category: self.category,
            tags: self.tags,
            due_date: self.due_date,
            processing_started_at: None,
            resolved_at: None,
            closed_at: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TicketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn normalize(input: &str) -> String {
    input.trim().to_ascii_lowercase().replace('-', "_")
}

impl FromStr for TicketStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = normalize(s);
        match normalized.as_str() {
            "submitted" => Ok(Self::Submitted),
            "assigned" => Ok(Self::Assigned),
            "accepted" => Ok(Self::Accepted),
            "approved" => Ok(Self::Approved),
            // Rows written by older deployments use the short spelling.
            "in_progress" | "progress" => Ok(Self::InProgress),
            "pending" => Ok(Self::Pending),
            "resolved" => Ok(Self::Resolved),
            "closed" => Ok(Self::Closed),
            "rejected" => Ok(Self::Rejected),
            "returned" => Ok(Self::Returned),
            _ => Err(ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for TicketType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "bug" => Ok(Self::Bug),
            "feature" => Ok(Self::Feature),
            "support" => Ok(Self::Support),
            "change" => Ok(Self::Change),
            "custom" => Ok(Self::Custom),
            _ => Err(ParseEnumError {
                expected: "ticket type",
                got: s.to_string(),
            }),
        }
    }
}
