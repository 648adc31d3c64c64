//! `dk create`: open a new ticket in `submitted` as the acting user.

use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use docket_core::LifecycleError;
use docket_core::model::{NewTicket, Priority, TicketType};

use super::project::Context;
use super::write_ticket;
use crate::output::render;

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    pub title: String,

    #[arg(long, short = 'd', default_value = "")]
    pub description: String,

    /// bug, feature, support, change or custom.
    #[arg(long = "type", value_name = "TYPE")]
    pub ticket_type: Option<String>,

    /// low, normal, high or critical.
    #[arg(long)]
    pub priority: Option<String>,

    #[arg(long, default_value = "")]
    pub category: String,

    /// Repeatable.
    #[arg(long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// RFC 3339 timestamp, e.g. 2026-05-01T17:00:00Z.
    #[arg(long)]
    pub due: Option<String>,
}

pub fn run_create(args: &CreateArgs, ctx: &Context) -> Result<()> {
    let creator = ctx.actor()?;
    if args.title.trim().is_empty() {
        return Err(LifecycleError::Validation {
            field: "title",
            reason: "must not be blank".to_string(),
        }
        .into());
    }

    let ticket_type = match &args.ticket_type {
        Some(raw) => raw.parse::<TicketType>()?,
        None => TicketType::default(),
    };
    let priority = match &args.priority {
        Some(raw) => raw.parse::<Priority>()?,
        None => Priority::default(),
    };
    let due_date = args
        .due
        .as_deref()
        .map(|raw| {
            DateTime::parse_from_rfc3339(raw.trim())
                .map(|at| at.with_timezone(&Utc))
                .with_context(|| format!("invalid --due '{raw}'"))
        })
        .transpose()?;

    let new = NewTicket {
        title: args.title.trim().to_string(),
        description: args.description.clone(),
        ticket_type,
        priority,
        creator_id: creator,
        category: args.category.trim().to_string(),
        tags: args
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        due_date,
    };

    let store = ctx.open_store()?;
    let ticket = store.create_ticket(new)?;
    tracing::info!(ticket = %ticket.id, creator = creator.get(), "ticket created");

    let mode = ctx.output;
    render(mode, &ticket, |t, w| write_ticket(w, mode, t))
}
