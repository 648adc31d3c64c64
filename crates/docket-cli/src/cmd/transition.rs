//! Status-changing commands: `dk transition`, `accept`, `reject`, `reopen`,
//! `resubmit`.
//!
//! Each one is a single call into the lifecycle service; the audit entry and
//! notification come from there.

use anyhow::{Context as _, Result};
use clap::Args;
use docket_core::model::{Ticket, TicketId};
use docket_core::lifecycle::TransitionRequest;

use super::project::Context;
use super::{parse_status, parse_ticket_id};
use crate::output::render;

#[derive(Args, Debug)]
pub struct TransitionArgs {
    #[arg(value_parser = parse_ticket_id)]
    pub id: TicketId,

    /// Target status, e.g. `in_progress`.
    pub status: String,

    #[arg(long, short = 'm', default_value = "")]
    pub comment: String,

    /// Fail with a conflict unless the ticket is currently in this status.
    #[arg(long, value_name = "STATUS")]
    pub expect: Option<String>,
}

#[derive(Args, Debug)]
pub struct CommentArgs {
    #[arg(value_parser = parse_ticket_id)]
    pub id: TicketId,

    #[arg(long, short = 'm', default_value = "")]
    pub comment: String,
}

#[derive(Args, Debug)]
pub struct RejectArgs {
    #[arg(value_parser = parse_ticket_id)]
    pub id: TicketId,

    #[arg(long, short = 'r')]
    pub reason: String,
}

fn render_moved(ctx: &Context, ticket: &Ticket) -> Result<()> {
    render(ctx.output, ticket, |t, w| {
        writeln!(w, "{} is now {} (version {})", t.id, t.status, t.version)
    })
}

pub fn run_transition(args: &TransitionArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let target = parse_status(&args.status)?;
    let mut request = TransitionRequest::new(args.id, actor, target).with_comment(&args.comment);
    if let Some(expected) = args.expect.as_deref() {
        request = request.expecting(parse_status(expected)?);
    }

    let session = ctx.open_session()?;
    let ticket = session
        .service
        .transition_expecting(&request)
        .with_context(|| format!("transition ticket {} to {target}", args.id))?;
    render_moved(ctx, &ticket)
}

pub fn run_accept(args: &CommentArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let session = ctx.open_session()?;
    let ticket = session
        .service
        .accept(args.id, actor, &args.comment)
        .with_context(|| format!("accept ticket {}", args.id))?;
    render_moved(ctx, &ticket)
}

pub fn run_reject(args: &RejectArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let session = ctx.open_session()?;
    let ticket = session
        .service
        .reject(args.id, actor, &args.reason)
        .with_context(|| format!("reject ticket {}", args.id))?;
    render_moved(ctx, &ticket)
}

pub fn run_reopen(args: &CommentArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let session = ctx.open_session()?;
    let ticket = session
        .service
        .reopen(args.id, actor, &args.comment)
        .with_context(|| format!("reopen ticket {}", args.id))?;
    render_moved(ctx, &ticket)
}

pub fn run_resubmit(args: &CommentArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let session = ctx.open_session()?;
    let ticket = session
        .service
        .resubmit(args.id, actor, &args.comment)
        .with_context(|| format!("resubmit ticket {}", args.id))?;
    render_moved(ctx, &ticket)
}
