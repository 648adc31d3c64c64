//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly. Errors go to stderr, as `{"error": {...}}` in JSON mode.

use std::io::{self, Write};

use docket_core::ErrorCode;
use docket_core::LifecycleError;
use docket_core::model::ParseEnumError;
use docket_core::store::StoreError;
use serde::Serialize;

use crate::actor::ActorError;
use crate::cmd::project::ProjectError;

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 60;

pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Render a left-aligned key/value line in human output.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Labelled sections for a terminal.
    Pretty,
    /// One line per record for pipes.
    Text,
    Json,
}

impl OutputMode {
    /// Map a resolved mode name (`pretty`, `text`, `json`).
    pub fn from_resolved(name: &str) -> Self {
        match name {
            "json" => Self::Json,
            "text" => Self::Text,
            _ => Self::Pretty,
        }
    }
}

/// A structured error with optional hint and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

impl CliError {
    fn with_code(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.code().to_string(),
            message: message.into(),
            hint: code.hint().map(str::to_string),
        }
    }
}

impl From<&LifecycleError> for CliError {
    fn from(err: &LifecycleError) -> Self {
        Self::with_code(err.code(), err.to_string())
    }
}

impl From<&anyhow::Error> for CliError {
    fn from(err: &anyhow::Error) -> Self {
        // Full context chain for the message; the code comes from the root.
        let message = format!("{err:#}");
        for cause in err.chain() {
            if let Some(lifecycle) = cause.downcast_ref::<LifecycleError>() {
                return Self::with_code(lifecycle.code(), message);
            }
            if let Some(store) = cause.downcast_ref::<StoreError>() {
                return Self::with_code(store.code(), message);
            }
            if let Some(project) = cause.downcast_ref::<ProjectError>() {
                return Self::with_code(project.code(), message);
            }
            if cause.downcast_ref::<ParseEnumError>().is_some() {
                return Self::with_code(ErrorCode::InvalidEnumValue, message);
            }
            if let Some(actor) = cause.downcast_ref::<ActorError>() {
                let mut out = Self::with_code(ErrorCode::ValidationFailed, message);
                if matches!(actor, ActorError::Missing) {
                    out.hint = Some("Pass --actor <user-id> or export DOCKET_ACTOR.".to_string());
                }
                return out;
            }
        }
        Self::with_code(ErrorCode::InternalUnexpected, message)
    }
}

/// Render a serializable value to stdout in the requested format.
///
/// In JSON mode, the value is serialized with `serde_json`. Otherwise the
/// `human_fn` closure writes the text form.
pub fn render<T: Serialize>(
    mode: OutputMode,
    value: &T,
    human_fn: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            human_fn(value, &mut out)?;
        }
    }
    Ok(())
}

/// Render an error to stderr in the requested format.
pub fn render_error(mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    let stderr = io::stderr();
    let mut out = stderr.lock();
    write_error(&mut out, mode, error)
}

fn write_error(out: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => {
            let wrapper = serde_json::json!({ "error": error });
            serde_json::to_writer_pretty(&mut *out, &wrapper)?;
            writeln!(out)?;
        }
        OutputMode::Pretty | OutputMode::Text => {
            writeln!(out, "error[{}]: {}", error.code, error.message)?;
            if let Some(hint) = &error.hint {
                writeln!(out, "  hint: {hint}")?;
            }
        }
    }
    Ok(())
}
