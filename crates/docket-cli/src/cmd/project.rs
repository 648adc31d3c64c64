//! Per-invocation context: project root, resolved config, acting user.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use docket_core::ErrorCode;
use docket_core::config::{self, EffectiveConfig};
use docket_core::lifecycle::{AuthorizationGate, TicketLifecycleService};
use docket_core::model::UserId;
use docket_core::notify::NotificationDispatcher;
use docket_core::store::sqlite::SqliteStore;

use crate::actor::{self, ActorError};
use crate::output::OutputMode;

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("no docket project at {}", .0.display())]
    NotInitialized(PathBuf),

    #[error("config error: {0}")]
    Config(String),
}

impl ProjectError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized(_) => ErrorCode::NotInitialized,
            Self::Config(_) => ErrorCode::ConfigParseError,
        }
    }
}

pub struct Context {
    pub root: PathBuf,
    pub output: OutputMode,
    pub config: EffectiveConfig,
    actor_flag: Option<String>,
}

impl Context {
    pub const fn new(
        root: PathBuf,
        output: OutputMode,
        config: EffectiveConfig,
        actor_flag: Option<String>,
    ) -> Self {
        Self {
            root,
            output,
            config,
            actor_flag,
        }
    }

    pub fn actor(&self) -> Result<UserId, ActorError> {
        actor::require_actor(self.actor_flag.as_deref(), self.config.user.actor)
    }

    /// Open the project database; it must already exist.
    pub fn open_store(&self) -> Result<Arc<SqliteStore>> {
        let path = config::db_path(&self.root);
        if !path.exists() {
            return Err(ProjectError::NotInitialized(self.root.clone()).into());
        }
        Ok(Arc::new(SqliteStore::open(&path)?))
    }

    /// Store, lifecycle service and (when configured) a running dispatcher.
    pub fn open_session(&self) -> Result<Session> {
        let store = self.open_store()?;
        let project = &self.config.project;

        let policy = project
            .policy
            .to_policy()
            .map_err(|e| ProjectError::Config(format!("{e:#}")))?;
        let options = project
            .lifecycle
            .to_options()
            .map_err(|e| ProjectError::Config(format!("{e:#}")))?;
        let gate = AuthorizationGate::new(policy, store.clone());
        let mut service = TicketLifecycleService::new(store.clone(), gate).with_options(options);

        let dispatcher = match project.notifications.build_channel(Some(&store))? {
            Some(channel) => {
                let dispatcher = Arc::new(
                    NotificationDispatcher::start(channel, project.notifications.queue_capacity)
                        .context("failed to start notification worker")?,
                );
                service = service.with_notifier(dispatcher.clone());
                Some(dispatcher)
            }
            None => None,
        };

        Ok(Session {
            store,
            service,
            dispatcher,
        })
    }
}

pub struct Session {
    pub store: Arc<SqliteStore>,
    pub service: TicketLifecycleService,
    dispatcher: Option<Arc<NotificationDispatcher>>,
}

impl Drop for Session {
    fn drop(&mut self) {
        // Flush queued notifications before the process exits.
        if let Some(dispatcher) = &self.dispatcher {
            dispatcher.shutdown();
            tracing::debug!(stats = ?dispatcher.stats(), "notification dispatcher drained");
        }
    }
}
