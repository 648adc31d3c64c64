//! `dk history`: audit trail of one ticket, oldest first.

use anyhow::{Context as _, Result};
use clap::Args;
use docket_core::model::TicketId;

use super::parse_ticket_id;
use super::project::Context;
use crate::output::render;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    #[arg(value_parser = parse_ticket_id)]
    pub id: TicketId,
}

pub fn run_history(args: &HistoryArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let session = ctx.open_session()?;
    let entries = session
        .service
        .history(args.id, actor)
        .with_context(|| format!("history of ticket {}", args.id))?;

    render(ctx.output, &entries, |entries, w| {
        if entries.is_empty() {
            return writeln!(w, "No history for {}.", args.id);
        }
        for entry in entries {
            writeln!(
                w,
                "{}  user {:<6} {:<12} {}",
                entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                entry.actor_id,
                entry.action.as_str(),
                entry.description
            )?;
        }
        Ok(())
    })
}
