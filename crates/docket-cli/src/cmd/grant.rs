//! `dk grant` / `dk revoke`: manage rows of the permission table.
//!
//! These are operator commands against the local database; they do not go
//! through the authorization gate.

use anyhow::Result;
use clap::Args;
use docket_core::model::UserId;
use serde::Serialize;

use super::parse_user_id;
use super::project::Context;
use crate::output::render;

#[derive(Args, Debug)]
pub struct PermissionArgs {
    #[arg(value_parser = parse_user_id)]
    pub user: UserId,

    /// Permission name, e.g. `ticket:assign`.
    pub permission: String,
}

#[derive(Debug, Serialize)]
struct PermissionOutput {
    user: UserId,
    permission: String,
    changed: bool,
    permissions: Vec<String>,
}

pub fn run_grant(args: &PermissionArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let permission = args.permission.trim();
    let changed = store.grant(args.user, permission)?;
    tracing::info!(user = args.user.get(), permission, changed, "permission granted");
    let output = PermissionOutput {
        user: args.user,
        permission: permission.to_string(),
        changed,
        permissions: store.permissions_of(args.user)?,
    };
    render(ctx.output, &output, |o, w| {
        if o.changed {
            writeln!(w, "Granted {} to user {}", o.permission, o.user)
        } else {
            writeln!(w, "User {} already holds {}", o.user, o.permission)
        }
    })
}

pub fn run_revoke(args: &PermissionArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let permission = args.permission.trim();
    let changed = store.revoke(args.user, permission)?;
    tracing::info!(user = args.user.get(), permission, changed, "permission revoked");
    let output = PermissionOutput {
        user: args.user,
        permission: permission.to_string(),
        changed,
        permissions: store.permissions_of(args.user)?,
    };
    render(ctx.output, &output, |o, w| {
        if o.changed {
            writeln!(w, "Revoked {} from user {}", o.permission, o.user)
        } else {
            writeln!(w, "User {} did not hold {}", o.user, o.permission)
        }
    })
}
