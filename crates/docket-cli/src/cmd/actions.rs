//! `dk actions`: what the acting user may do with a ticket right now.

use anyhow::{Context as _, Result};
use clap::Args;
use docket_core::lifecycle::AvailableAction;
use docket_core::model::{TicketId, TicketStatus};
use serde::Serialize;

use super::parse_ticket_id;
use super::project::Context;
use crate::output::render;

#[derive(Args, Debug)]
pub struct ActionsArgs {
    #[arg(value_parser = parse_ticket_id)]
    pub id: TicketId,
}

#[derive(Debug, Serialize)]
struct ActionsOutput {
    ticket_id: TicketId,
    status: TicketStatus,
    actions: Vec<AvailableAction>,
}

pub fn run_actions(args: &ActionsArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let session = ctx.open_session()?;
    let ticket = session
        .service
        .load_readable(args.id, actor)
        .with_context(|| format!("load ticket {}", args.id))?;

    let output = ActionsOutput {
        ticket_id: ticket.id,
        status: ticket.status,
        actions: session.service.available_actions(actor, &ticket),
    };
    render(ctx.output, &output, |o, w| {
        if o.actions.is_empty() {
            return writeln!(w, "No actions available on {} ({}).", o.ticket_id, o.status);
        }
        for action in &o.actions {
            writeln!(w, "{:<16} -> {:<12} {}", action.action.as_str(), action.target.as_str(), action.label)?;
        }
        Ok(())
    })
}
