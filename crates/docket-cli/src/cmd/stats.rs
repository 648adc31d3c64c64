//! `dk stats`: ticket counts by status, priority and type.
//!
//! Like `grant`, this reads the local database directly and needs no acting
//! user; it reports counts only.

use std::collections::BTreeMap;
use std::io;

use anyhow::Result;
use chrono::Utc;
use clap::Args;

use super::project::Context;
use crate::output::{pretty_kv, pretty_rule, render};

#[derive(Args, Debug)]
pub struct StatsArgs {}

pub fn run_stats(_args: &StatsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let stats = store.ticket_stats(Utc::now())?;
    tracing::debug!(total = stats.total, overdue = stats.overdue, "ticket stats");

    render(ctx.output, &stats, |stats, w| {
        pretty_kv(w, "total", stats.total.to_string())?;
        pretty_kv(w, "overdue", stats.overdue.to_string())?;
        write_section(w, "By status", &stats.by_status)?;
        write_section(w, "By priority", &stats.by_priority)?;
        write_section(w, "By type", &stats.by_type)
    })
}

fn write_section(
    w: &mut dyn io::Write,
    heading: &str,
    counts: &BTreeMap<&'static str, u64>,
) -> io::Result<()> {
    writeln!(w)?;
    writeln!(w, "{heading}")?;
    pretty_rule(w)?;
    for (name, count) in counts {
        pretty_kv(w, name, count.to_string())?;
    }
    Ok(())
}
