//! `dk inbox`: notifications written by the `inbox` channel.

use anyhow::Result;
use clap::Args;

use super::project::Context;
use crate::output::render;

#[derive(Args, Debug)]
pub struct InboxArgs {
    /// Only show unread messages.
    #[arg(long)]
    pub unread: bool,

    /// Mark everything as read after listing.
    #[arg(long)]
    pub mark_read: bool,
}

pub fn run_inbox(args: &InboxArgs, ctx: &Context) -> Result<()> {
    let actor = ctx.actor()?;
    let store = ctx.open_store()?;
    let messages = store.inbox(actor, args.unread)?;
    if args.mark_read {
        let marked = store.mark_inbox_read(actor)?;
        tracing::debug!(user = actor.get(), marked, "inbox marked read");
    }

    render(ctx.output, &messages, |messages, w| {
        if messages.is_empty() {
            return writeln!(w, "Inbox empty.");
        }
        for message in messages {
            let marker = if message.is_read { ' ' } else { '*' };
            writeln!(
                w,
                "{marker} {}  {}",
                message.created_at.format("%Y-%m-%d %H:%M"),
                message.content
            )?;
        }
        Ok(())
    })
}
