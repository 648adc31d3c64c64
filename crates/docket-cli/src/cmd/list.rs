//! `dk list`: tickets visible to the acting user, newest first.

use anyhow::Result;
use clap::Args;
use docket_core::model::UserId;
use docket_core::store::sqlite::TicketFilter;

use super::project::Context;
use super::{parse_status, parse_user_id, write_ticket};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub status: Option<String>,

    #[arg(long, value_parser = parse_user_id)]
    pub assignee: Option<UserId>,

    #[arg(long, value_parser = parse_user_id)]
    pub creator: Option<UserId>,

    /// Only tickets the acting user created or is assigned to.
    #[arg(long)]
    pub mine: bool,

    /// Maximum number of visible tickets to print.
    #[arg(long, default_value_t = 50)]
    pub limit: u32,
}

pub fn run_list(args: &ListArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let status = args.status.as_deref().map(parse_status).transpose()?;
    let session = ctx.open_session()?;

    let filter = TicketFilter {
        status,
        assignee: args.assignee,
        creator: args.creator,
        limit: None,
    };
    let gate = session.service.gate();
    let limit = usize::try_from(args.limit).unwrap_or(usize::MAX);
    let tickets: Vec<_> = session
        .store
        .list_tickets(&filter)?
        .into_iter()
        .filter(|t| gate.can_read(actor, t))
        .filter(|t| !args.mine || t.is_creator(actor) || t.is_assignee(actor))
        .take(limit)
        .collect();

    let mode = ctx.output;
    render(mode, &tickets, |tickets, w| {
        if tickets.is_empty() {
            return writeln!(w, "No tickets.");
        }
        for (i, ticket) in tickets.iter().enumerate() {
            if mode == OutputMode::Pretty && i > 0 {
                writeln!(w)?;
            }
            write_ticket(w, mode, ticket)?;
        }
        Ok(())
    })
}
