//! `dk assign`: set the assignee and move the ticket to `assigned`.

use anyhow::{Context as _, Result};
use clap::Args;
use docket_core::model::{TicketId, UserId};

use super::project::Context;
use super::{parse_ticket_id, parse_user_id};
use crate::output::render;

#[derive(Args, Debug)]
pub struct AssignArgs {
    #[arg(value_parser = parse_ticket_id)]
    pub id: TicketId,

    /// User id of the new assignee.
    #[arg(value_parser = parse_user_id)]
    pub assignee: UserId,

    #[arg(long, short = 'r', default_value = "")]
    pub reason: String,
}

pub fn run_assign(args: &AssignArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let session = ctx.open_session()?;
    let ticket = session
        .service
        .assign(args.id, actor, args.assignee, &args.reason)
        .with_context(|| format!("assign ticket {}", args.id))?;

    render(ctx.output, &ticket, |t, w| {
        writeln!(w, "{} assigned to user {} (version {})", t.id, args.assignee, t.version)
    })
}
