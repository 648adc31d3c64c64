//! `dk show`: ticket details plus what the acting user can do next.

use anyhow::{Context as _, Result};
use clap::Args;
use docket_core::model::TicketId;

use super::project::Context;
use super::{parse_ticket_id, write_ticket};
use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct ShowArgs {
    /// Ticket id (`5` or `#5`).
    #[arg(value_parser = parse_ticket_id)]
    pub id: TicketId,
}

pub fn run_show(args: &ShowArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let session = ctx.open_session()?;
    let info = session
        .service
        .workflow_info(args.id, actor)
        .with_context(|| format!("show ticket {}", args.id))?;

    let mode = ctx.output;
    render(mode, &info, |info, w| {
        write_ticket(w, mode, &info.ticket)?;
        if mode == OutputMode::Pretty {
            writeln!(w)?;
        }
        let next: Vec<_> = info.allowed_transitions.iter().map(|s| s.as_str()).collect();
        pretty_kv(w, "next", next.join(", "))?;
        let actions: Vec<_> = info
            .available_actions
            .iter()
            .map(|a| format!("{} ({})", a.action, a.target))
            .collect();
        if actions.is_empty() {
            pretty_kv(w, "you can", "-")
        } else {
            pretty_kv(w, "you can", actions.join(", "))
        }
    })
}
