#![forbid(unsafe_code)]

mod actor;
mod cmd;
mod output;

use std::env;
use std::io::IsTerminal;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use cmd::project::{Context, ProjectError};
use docket_core::config;
use output::{CliError, OutputMode, render_error};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "docket: ticket lifecycle engine",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Acting user id (falls back to DOCKET_ACTOR).
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Project",
        about = "Initialize a docket project",
        after_help = "EXAMPLES:\n    dk init\n    dk init --force --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(
        next_help_heading = "Tickets",
        about = "Open a new ticket",
        after_help = "EXAMPLES:\n    dk --actor 1 create --title \"Printer jam\" --priority high"
    )]
    Create(cmd::create::CreateArgs),

    #[command(next_help_heading = "Tickets", about = "Show one ticket")]
    Show(cmd::show::ShowArgs),

    #[command(next_help_heading = "Tickets", about = "List visible tickets")]
    List(cmd::list::ListArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Move a ticket to another status",
        after_help = "EXAMPLES:\n    dk --actor 7 transition 5 in_progress\n    dk --actor 7 transition 5 resolved -m \"swapped PSU\" --expect in_progress"
    )]
    Transition(cmd::transition::TransitionArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Assign a ticket",
        after_help = "EXAMPLES:\n    dk --actor 20 assign 5 7 --reason \"on call\""
    )]
    Assign(cmd::assign::AssignArgs),

    #[command(next_help_heading = "Lifecycle", about = "Accept an assigned ticket")]
    Accept(cmd::transition::CommentArgs),

    #[command(next_help_heading = "Lifecycle", about = "Reject a ticket with a reason")]
    Reject(cmd::transition::RejectArgs),

    #[command(next_help_heading = "Lifecycle", about = "Reopen a closed ticket")]
    Reopen(cmd::transition::CommentArgs),

    #[command(
        next_help_heading = "Lifecycle",
        about = "Resubmit a rejected or returned ticket"
    )]
    Resubmit(cmd::transition::CommentArgs),

    #[command(next_help_heading = "Tickets", about = "List actions available to you")]
    Actions(cmd::actions::ActionsArgs),

    #[command(next_help_heading = "Tickets", about = "Show a ticket's audit trail")]
    History(cmd::history::HistoryArgs),

    #[command(
        next_help_heading = "Administration",
        about = "Grant a permission to a user",
        after_help = "EXAMPLES:\n    dk grant 20 ticket:assign"
    )]
    Grant(cmd::grant::PermissionArgs),

    #[command(next_help_heading = "Administration", about = "Revoke a permission")]
    Revoke(cmd::grant::PermissionArgs),

    #[command(next_help_heading = "Tickets", about = "Read your notification inbox")]
    Inbox(cmd::inbox::InboxArgs),

    #[command(
        next_help_heading = "Administration",
        about = "Count tickets by status, priority and type",
        after_help = "EXAMPLES:\n    dk stats\n    dk stats --json"
    )]
    Stats(cmd::stats::StatsArgs),
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("DOCKET_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "docket=debug,info"
        } else {
            "docket=info,warn"
        })
    });

    let format = env::var("DOCKET_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn dispatch(command: &Commands, ctx: &Context) -> anyhow::Result<()> {
    match command {
        Commands::Init(args) => cmd::init::run_init(args, ctx),
        Commands::Create(args) => cmd::create::run_create(args, ctx),
        Commands::Show(args) => cmd::show::run_show(args, ctx),
        Commands::List(args) => cmd::list::run_list(args, ctx),
        Commands::Transition(args) => cmd::transition::run_transition(args, ctx),
        Commands::Assign(args) => cmd::assign::run_assign(args, ctx),
        Commands::Accept(args) => cmd::transition::run_accept(args, ctx),
        Commands::Reject(args) => cmd::transition::run_reject(args, ctx),
        Commands::Reopen(args) => cmd::transition::run_reopen(args, ctx),
        Commands::Resubmit(args) => cmd::transition::run_resubmit(args, ctx),
        Commands::Actions(args) => cmd::actions::run_actions(args, ctx),
        Commands::History(args) => cmd::history::run_history(args, ctx),
        Commands::Grant(args) => cmd::grant::run_grant(args, ctx),
        Commands::Revoke(args) => cmd::grant::run_revoke(args, ctx),
        Commands::Inbox(args) => cmd::inbox::run_inbox(args, ctx),
        Commands::Stats(args) => cmd::stats::run_stats(args, ctx),
    }
}

fn fail(mode: OutputMode, err: &anyhow::Error) -> ExitCode {
    tracing::debug!(error = ?err, "command failed");
    if render_error(mode, &CliError::from(err)).is_err() {
        eprintln!("error: {err:#}");
    }
    ExitCode::FAILURE
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let fallback_mode = if cli.json {
        OutputMode::Json
    } else if std::io::stdout().is_terminal() {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    };

    let root = match env::current_dir() {
        Ok(root) => root,
        Err(err) => return fail(fallback_mode, &err.into()),
    };
    let effective = match config::resolve_config(&root, cli.json) {
        Ok(effective) => effective,
        Err(err) => {
            return fail(fallback_mode, &ProjectError::Config(format!("{err:#}")).into());
        }
    };

    let output = OutputMode::from_resolved(&effective.resolved_output);
    let ctx = Context::new(root, output, effective, cli.actor.clone());
    match dispatch(&cli.command, &ctx) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => fail(output, &err),
    }
}
