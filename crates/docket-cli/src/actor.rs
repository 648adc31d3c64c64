//! Acting user resolution for CLI commands.
//!
//! The resolution chain: `--actor` flag > `DOCKET_ACTOR` env > `actor` in the
//! user config. Every ticket command needs an actor; `init`, `grant` and
//! `revoke` do not.

use std::env;

use docket_core::model::UserId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    #[error("Acting user required for this command. Set --actor or DOCKET_ACTOR.")]
    Missing,

    #[error("invalid acting user '{raw}': expected a positive integer user id")]
    Invalid { raw: String },
}

/// Environment reader trait for dependency injection in tests.
trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

struct RealEnv;

impl EnvReader for RealEnv {
    fn get(&self, key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

fn parse_user(raw: &str) -> Result<UserId, ActorError> {
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(UserId(id)),
        _ => Err(ActorError::Invalid {
            raw: raw.to_string(),
        }),
    }
}

fn resolve_actor_with(
    cli_flag: Option<&str>,
    configured: Option<u64>,
    env: &dyn EnvReader,
) -> Result<UserId, ActorError> {
    if let Some(raw) = cli_flag.filter(|v| !v.trim().is_empty()) {
        return parse_user(raw);
    }
    if let Some(raw) = env.get("DOCKET_ACTOR") {
        return parse_user(&raw);
    }
    match configured {
        Some(id) => parse_user(&id.to_string()),
        None => Err(ActorError::Missing),
    }
}

/// Resolve the acting user, failing when no source names one.
///
/// # Errors
///
/// [`ActorError::Missing`] when nothing is set, [`ActorError::Invalid`] when
/// the first source found is not a positive integer.
pub fn require_actor(cli_flag: Option<&str>, configured: Option<u64>) -> Result<UserId, ActorError> {
    resolve_actor_with(cli_flag, configured, &RealEnv)
}
