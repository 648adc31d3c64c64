pub mod actions;
pub mod assign;
pub mod create;
pub mod grant;
pub mod history;
pub mod inbox;
pub mod init;
pub mod list;
pub mod project;
pub mod show;
pub mod stats;
pub mod transition;

use std::io::{self, Write};

use docket_core::model::{ParseEnumError, Ticket, TicketId, TicketStatus, UserId};

use crate::output::{OutputMode, pretty_kv, pretty_rule};

/// Parse `5` or `#5`.
pub fn parse_ticket_id(raw: &str) -> Result<TicketId, String> {
    let digits = raw.trim().trim_start_matches('#');
    match digits.parse::<u64>() {
        Ok(id) if id > 0 => Ok(TicketId(id)),
        _ => Err(format!("'{raw}' is not a ticket id")),
    }
}

pub fn parse_user_id(raw: &str) -> Result<UserId, String> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(UserId(id)),
        _ => Err(format!("'{raw}' is not a user id")),
    }
}

pub fn parse_status(raw: &str) -> Result<TicketStatus, ParseEnumError> {
    raw.parse()
}

fn or_dash(value: Option<String>) -> String {
    value.unwrap_or_else(|| "-".to_string())
}

/// Human rendering of one ticket, pretty or one-line.
pub fn write_ticket(w: &mut dyn Write, mode: OutputMode, ticket: &Ticket) -> io::Result<()> {
    if mode != OutputMode::Pretty {
        return writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            ticket.id,
            ticket.status,
            ticket.priority,
            or_dash(ticket.assignee_id.map(|u| u.to_string())),
            ticket.title
        );
    }

    writeln!(w, "{} {}", ticket.id, ticket.title)?;
    pretty_rule(w)?;
    pretty_kv(w, "status", ticket.status.as_str())?;
    pretty_kv(w, "type", ticket.ticket_type.as_str())?;
    pretty_kv(w, "priority", ticket.priority.as_str())?;
    pretty_kv(w, "creator", ticket.creator_id.to_string())?;
    pretty_kv(w, "assignee", or_dash(ticket.assignee_id.map(|u| u.to_string())))?;
    if !ticket.category.is_empty() {
        pretty_kv(w, "category", &ticket.category)?;
    }
    if !ticket.tags.is_empty() {
        pretty_kv(w, "tags", ticket.tags.join(", "))?;
    }
    if let Some(due) = ticket.due_date {
        pretty_kv(w, "due", due.to_rfc3339())?;
    }
    if let Some(at) = ticket.processing_started_at {
        pretty_kv(w, "started", at.to_rfc3339())?;
    }
    if let Some(at) = ticket.resolved_at {
        pretty_kv(w, "resolved", at.to_rfc3339())?;
    }
    if let Some(at) = ticket.closed_at {
        pretty_kv(w, "closed", at.to_rfc3339())?;
    }
    pretty_kv(w, "updated", ticket.updated_at.to_rfc3339())?;
    pretty_kv(w, "version", ticket.version.to_string())?;
    if !ticket.description.is_empty() {
        writeln!(w)?;
        writeln!(w, "{}", ticket.description)?;
    }
    Ok(())
}
