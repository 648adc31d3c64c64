//! Ticket and audit-trail data model.

pub mod history;
pub mod stats;
pub mod ticket;

pub use history::{HistoryAction, HistoryEntry, NewHistoryEntry};
pub use stats::TicketStats;
pub use ticket::{
    NewTicket, ParseEnumError, Priority, Ticket, TicketId, TicketStatus, TicketType, UserId,
};
