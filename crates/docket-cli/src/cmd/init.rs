//! `dk init`: create `.docket/` with a default config and an empty database.

use std::fs;

use anyhow::{Context as _, Result};
use clap::Args;
use docket_core::config::{self, DOCKET_DIR, ProjectConfig};
use docket_core::store::sqlite::SqliteStore;
use docket_core::store::sqlite::migrations::LATEST_SCHEMA_VERSION;
use serde::Serialize;

use super::project::Context;
use crate::output::{pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing `.docket/config.toml` with defaults.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
struct InitOutput {
    directory: String,
    database: String,
    schema_version: u32,
    wrote_config: bool,
}

pub fn run_init(args: &InitArgs, ctx: &Context) -> Result<()> {
    let dir = ctx.root.join(DOCKET_DIR);
    fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let config_path = dir.join("config.toml");
    let wrote_config = args.force || !config_path.exists();
    if wrote_config {
        let body = toml::to_string_pretty(&ProjectConfig::default())
            .context("Failed to serialize default config")?;
        fs::write(&config_path, body)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
    }

    let db = config::db_path(&ctx.root);
    SqliteStore::open(&db)?;
    tracing::info!(path = %db.display(), "project initialized");

    let output = InitOutput {
        directory: dir.display().to_string(),
        database: db.display().to_string(),
        schema_version: LATEST_SCHEMA_VERSION,
        wrote_config,
    };
    render(ctx.output, &output, |o, w| {
        writeln!(w, "Initialized docket project")?;
        pretty_kv(w, "directory", &o.directory)?;
        pretty_kv(w, "database", &o.database)?;
        pretty_kv(w, "schema", o.schema_version.to_string())
    })
}
