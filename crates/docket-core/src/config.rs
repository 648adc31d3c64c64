use std::collections::BTreeMap;
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::lifecycle::policy::{Policy, Requirement};
use crate::lifecycle::service::{DEFAULT_LOCK_TIMEOUT, LifecycleOptions};
use crate::model::TicketStatus;
use crate::notify::channels::DEFAULT_WEBHOOK_TIMEOUT;
use crate::notify::dispatcher::DEFAULT_QUEUE_CAPACITY;
use crate::notify::{
    FanoutChannel, InboxChannel, LogChannel, NotificationChannel, WebhookChannel,
};
use crate::store::sqlite::SqliteStore;

/// Project directory name, relative to the project root.
pub const DOCKET_DIR: &str = ".docket";

/// Database file name inside [`DOCKET_DIR`].
pub const DB_FILE: &str = "docket.sqlite3";

/// Path of the project database under `project_root`.
#[must_use]
pub fn db_path(project_root: &Path) -> PathBuf {
    project_root.join(DOCKET_DIR).join(DB_FILE)
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleConfig {
    #[serde(default = "default_reopen_target")]
    pub reopen_target: TicketStatus,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            reopen_target: default_reopen_target(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl LifecycleConfig {
    /// # Errors
    ///
    /// Returns an error if `reopen_target` is not reachable from `closed`.
    pub fn to_options(&self) -> Result<LifecycleOptions> {
        let options = LifecycleOptions::default()
            .with_reopen_target(self.reopen_target)
            .context("invalid [lifecycle] reopen_target")?;
        Ok(options.with_lock_timeout(Duration::from_millis(self.lock_timeout_ms)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Log,
    Inbox,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_channels")]
    pub channels: Vec<ChannelKind>,
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_timeout_ms")]
    pub webhook_timeout_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            queue_capacity: default_queue_capacity(),
            channels: default_channels(),
            webhook_url: None,
            webhook_timeout_ms: default_webhook_timeout_ms(),
        }
    }
}

impl NotificationConfig {
    /// Assemble the configured delivery channel. `None` when notifications
    /// are disabled or no channel is listed.
    ///
    /// # Errors
    ///
    /// Returns an error if `inbox` is listed without a database, or `webhook`
    /// without a `webhook_url`.
    pub fn build_channel(
        &self,
        inbox_store: Option<&Arc<SqliteStore>>,
    ) -> Result<Option<Arc<dyn NotificationChannel>>> {
        if !self.enabled || self.channels.is_empty() {
            return Ok(None);
        }

        let mut members: Vec<Arc<dyn NotificationChannel>> = Vec::new();
        for kind in &self.channels {
            match kind {
                ChannelKind::Log => members.push(Arc::new(LogChannel)),
                ChannelKind::Inbox => {
                    let Some(store) = inbox_store else {
                        bail!("[notifications] lists `inbox` but no database is open");
                    };
                    members.push(Arc::new(InboxChannel::new(Arc::clone(store))));
                }
                ChannelKind::Webhook => {
                    let Some(url) = self.webhook_url.as_deref().filter(|u| !u.trim().is_empty())
                    else {
                        bail!("[notifications] lists `webhook` but webhook_url is not set");
                    };
                    members.push(Arc::new(WebhookChannel::new(
                        url.trim(),
                        Duration::from_millis(self.webhook_timeout_ms),
                    )));
                }
            }
        }

        if members.len() == 1 {
            return Ok(members.pop());
        }
        Ok(Some(Arc::new(FanoutChannel::new(members))))
    }
}

/// Overrides for the authorization policy.
///
/// ```toml
/// [policy]
/// admin_permissions = ["ticket:admin"]
///
/// [policy.rules]
/// closed = ["creator", "perm:ticket:close"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    #[serde(default)]
    pub admin_permissions: Option<Vec<String>>,
    #[serde(default)]
    pub rules: BTreeMap<String, Vec<String>>,
}

impl PolicyConfig {
    /// Apply the overrides on top of the default policy.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown status key or requirement spelling.
    pub fn to_policy(&self) -> Result<Policy> {
        let mut policy = Policy::default();
        if let Some(admin) = &self.admin_permissions {
            policy = policy.with_admin_permissions(
                admin
                    .iter()
                    .map(|p| p.trim().to_string())
                    .filter(|p| !p.is_empty())
                    .collect(),
            );
        }
        for (status, requirements) in &self.rules {
            let target: TicketStatus = status
                .parse()
                .with_context(|| format!("[policy.rules] key `{status}`"))?;
            let parsed = requirements
                .iter()
                .map(|raw| raw.parse::<Requirement>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("[policy.rules] {status}"))?;
            policy = policy.with_rule(target, parsed);
        }
        Ok(policy)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(default)]
    pub output: Option<String>,
    /// Default acting user id when neither `--actor` nor `DOCKET_ACTOR` is set.
    #[serde(default)]
    pub actor: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveConfig {
    pub project: ProjectConfig,
    pub user: UserConfig,
    pub resolved_output: String,
}

/// Load `.docket/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_project_config(project_root: &Path) -> Result<ProjectConfig> {
    let path = project_root.join(DOCKET_DIR).join("config.toml");
    if !path.exists() {
        return Ok(ProjectConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<ProjectConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid settings in {}", path.display()))?;
    Ok(config)
}

impl ProjectConfig {
    /// # Errors
    ///
    /// Returns an error if any section holds an unusable value.
    pub fn validate(&self) -> Result<()> {
        self.lifecycle.to_options()?;
        self.policy.to_policy()?;
        if self.notifications.queue_capacity == 0 {
            bail!("[notifications] queue_capacity must be at least 1");
        }
        if self.notifications.channels.contains(&ChannelKind::Webhook)
            && self.notifications.webhook_url.is_none()
        {
            bail!("[notifications] lists `webhook` but webhook_url is not set");
        }
        Ok(())
    }
}

/// Load the per-user config from the platform config dir.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_user_config() -> Result<UserConfig> {
    let Some(config_dir) = dirs::config_dir() else {
        return Ok(UserConfig::default());
    };

    let path = config_dir.join("docket/config.toml");
    if !path.exists() {
        return Ok(UserConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<UserConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// Merge project config, user config and output-mode environment.
///
/// # Errors
///
/// Returns an error if either config file is unreadable or invalid.
pub fn resolve_config(project_root: &Path, cli_json: bool) -> Result<EffectiveConfig> {
    let project = load_project_config(project_root)?;
    let user = load_user_config()?;

    let env_format = env::var("FORMAT").ok();
    let resolved_output = resolve_output(cli_json, user.output.as_deref(), env_format.as_deref());

    Ok(EffectiveConfig {
        project,
        user,
        resolved_output,
    })
}

fn resolve_output(cli_json: bool, user_output: Option<&str>, env_format: Option<&str>) -> String {
    fn normalize_output_mode(raw: &str) -> Option<&'static str> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "human" => Some("pretty"),
            "text" | "table" => Some("text"),
            "json" => Some("json"),
            _ => None,
        }
    }

    if cli_json {
        return "json".to_string();
    }

    if let Some(mode) = env_format.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if let Some(mode) = user_output.and_then(normalize_output_mode) {
        return mode.to_string();
    }

    if std::io::stdout().is_terminal() {
        "pretty".to_string()
    } else {
        "text".to_string()
    }
}

const fn default_true() -> bool {
    true
}

const fn default_reopen_target() -> TicketStatus {
    TicketStatus::InProgress
}

fn default_lock_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_LOCK_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}

const fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Log]
}

fn default_webhook_timeout_ms() -> u64 {
    u64::try_from(DEFAULT_WEBHOOK_TIMEOUT.as_millis()).unwrap_or(u64::MAX)
}
