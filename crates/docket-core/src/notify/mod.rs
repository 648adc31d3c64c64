//! Best-effort notification boundary.
//!
//! The lifecycle service hands a [`NotificationRequest`] to a
//! [`NotificationSink`] after a transition commits. Delivery happens on the
//! dispatcher worker through a [`NotificationChannel`]; channel errors are
//! logged there and never reach the caller.

pub mod channels;
pub mod dispatcher;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ErrorCode;
use crate::model::{HistoryAction, Ticket, TicketId, UserId};
use crate::store::StoreError;

pub use channels::{FanoutChannel, InboxChannel, LogChannel, WebhookChannel};
pub use dispatcher::{DispatchStats, NotificationDispatcher};

/// Category attached to every lifecycle notification.
pub const TICKET_CATEGORY: &str = "ticket";

/// Title attached to every lifecycle notification.
pub const TICKET_TITLE: &str = "Ticket update";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRequest {
    pub ticket_id: Option<TicketId>,
    pub recipients: Vec<UserId>,
    pub title: String,
    pub content: String,
    pub category: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationRequest {
    /// Notification for a committed transition, addressed to the ticket's
    /// stakeholders.
    #[must_use]
    pub fn ticket_update(
        ticket: &Ticket,
        action: HistoryAction,
        actor: UserId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id: Some(ticket.id),
            recipients: ticket.stakeholders(),
            title: TICKET_TITLE.to_string(),
            content: format!(
                "Ticket {} \"{}\" {} by user {actor} (now {}).",
                ticket.id,
                ticket.title,
                action.phrase(),
                ticket.status
            ),
            category: TICKET_CATEGORY.to_string(),
            created_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook transport failed: {0}")]
    Transport(String),

    #[error("webhook answered HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("inbox write failed: {0}")]
    Inbox(#[from] StoreError),

    #[error("{failed} of {total} channels failed; first: {first}")]
    Fanout {
        failed: usize,
        total: usize,
        first: Box<NotifyError>,
    },
}

impl NotifyError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::NotificationFailed
    }
}

/// A delivery target. Implementations may block; they run on the worker.
pub trait NotificationChannel: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Deliver one request to every recipient.
    ///
    /// # Errors
    ///
    /// Returns an error if delivery failed; the dispatcher logs it.
    fn notify(&self, request: &NotificationRequest) -> Result<(), NotifyError>;
}

/// Where the lifecycle service hands off notifications. Must not block.
pub trait NotificationSink: Send + Sync {
    fn submit(&self, request: NotificationRequest);
}
