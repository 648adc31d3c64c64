//! docket-core: ticket lifecycle engine.
//!
//! [`lifecycle::TicketLifecycleService`] is the single mutator of ticket
//! status. It composes the transition graph ([`lifecycle::transitions`]), the
//! authorization gate ([`lifecycle::policy`]), a [`store::TicketStore`], and an
//! optional [`notify::NotificationSink`].
//!
//! # Conventions
//!
//! - **Errors**: library operations return `thiserror` enums carrying an
//!   [`error::ErrorCode`]; config and database bootstrap use `anyhow::Result`.
//! - **Logging**: `tracing` macros; committed transitions log at `info`.

pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod model;
pub mod notify;
pub mod permissions;
pub mod store;

pub use error::{ErrorCode, LifecycleError};
