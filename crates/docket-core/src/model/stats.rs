//! Aggregate ticket counts.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::ticket::{Priority, Ticket, TicketStatus, TicketType};

/// Ticket totals broken down by status, priority and type. Every known value
/// has a bucket, so a zero count is reported rather than omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TicketStats {
    pub total: u64,
    pub by_status: BTreeMap<&'static str, u64>,
    pub by_priority: BTreeMap<&'static str, u64>,
    pub by_type: BTreeMap<&'static str, u64>,
    /// Tickets for which [`Ticket::is_overdue`] holds at the snapshot time.
    pub overdue: u64,
}

impl Default for TicketStats {
    fn default() -> Self {
        Self {
            total: 0,
            by_status: TicketStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect(),
            by_priority: Priority::ALL.iter().map(|p| (p.as_str(), 0)).collect(),
            by_type: TicketType::ALL.iter().map(|t| (t.as_str(), 0)).collect(),
            overdue: 0,
        }
    }
}

impl TicketStats {
    /// Count one ticket as of `now`.
    pub fn record(&mut self, ticket: &Ticket, now: DateTime<Utc>) {
        self.total += 1;
        *self.by_status.entry(ticket.status.as_str()).or_default() += 1;
        *self.by_priority.entry(ticket.priority.as_str()).or_default() += 1;
        *self.by_type.entry(ticket.ticket_type.as_str()).or_default() += 1;
        if ticket.is_overdue(now) {
            self.overdue += 1;
        }
    }
}
