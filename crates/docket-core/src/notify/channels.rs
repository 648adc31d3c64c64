use std::sync::Arc;
use std::time::Duration;

use super::{NotificationChannel, NotificationRequest, NotifyError};
use crate::store::sqlite::SqliteStore;

/// Default per-request timeout for webhook delivery.
pub const DEFAULT_WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Emits one `tracing` event per request.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &'static str {
        "log"
    }

    fn notify(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        let recipients: Vec<u64> = request.recipients.iter().map(|u| u.get()).collect();
        tracing::info!(
            ticket = ?request.ticket_id,
            ?recipients,
            category = %request.category,
            title = %request.title,
            "{}",
            request.content
        );
        Ok(())
    }
}

/// Writes inbox rows into the `notifications` table.
#[derive(Debug, Clone)]
pub struct InboxChannel {
    store: Arc<SqliteStore>,
}

impl InboxChannel {
    #[must_use]
    pub const fn new(store: Arc<SqliteStore>) -> Self {
        Self { store }
    }
}

impl NotificationChannel for InboxChannel {
    fn name(&self) -> &'static str {
        "inbox"
    }

    fn notify(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        self.store.insert_notifications(request)?;
        Ok(())
    }
}

/// Posts a chat-bot style text message to a webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookChannel {
    url: String,
    agent: ureq::Agent,
}

impl WebhookChannel {
    #[must_use]
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("docket/", env!("CARGO_PKG_VERSION")))
            .build();
        Self {
            url: url.into(),
            agent,
        }
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Request body sent for `request`.
    #[must_use]
    pub fn payload(request: &NotificationRequest) -> serde_json::Value {
        serde_json::json!({
            "msgtype": "text",
            "text": {
                "content": format!("{}\n{}", request.title, request.content),
            },
        })
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &'static str {
        "webhook"
    }

    fn notify(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        match self.agent.post(&self.url).send_json(Self::payload(request)) {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, response)) => Err(NotifyError::Rejected {
                status,
                body: response.into_string().unwrap_or_default(),
            }),
            Err(ureq::Error::Transport(transport)) => {
                Err(NotifyError::Transport(transport.to_string()))
            }
        }
    }
}

/// Delivers to every inner channel, even after one fails.
#[derive(Default)]
pub struct FanoutChannel {
    channels: Vec<Arc<dyn NotificationChannel>>,
}

impl std::fmt::Debug for FanoutChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<_> = self.channels.iter().map(|c| c.name()).collect();
        f.debug_struct("FanoutChannel").field("channels", &names).finish()
    }
}

impl FanoutChannel {
    #[must_use]
    pub const fn new(channels: Vec<Arc<dyn NotificationChannel>>) -> Self {
        Self { channels }
    }

    #[must_use]
    pub fn with(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl NotificationChannel for FanoutChannel {
    fn name(&self) -> &'static str {
        "fanout"
    }

    fn notify(&self, request: &NotificationRequest) -> Result<(), NotifyError> {
        let mut first_error = None;
        let mut failed = 0;
        for channel in &self.channels {
            if let Err(err) = channel.notify(request) {
                failed += 1;
                tracing::debug!(channel = channel.name(), error = %err, "fanout member failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            None => Ok(()),
            Some(first) => Err(NotifyError::Fanout {
                failed,
                total: self.channels.len(),
                first: Box::new(first),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FanoutChannel, InboxChannel, LogChannel, WebhookChannel};
    use crate::model::{NewTicket, TicketId, UserId};
    use crate::notify::{NotificationChannel, NotificationRequest, NotifyError};
    use crate::store::sqlite::SqliteStore;
    use chrono::Utc;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn request(ticket_id: Option<TicketId>) -> NotificationRequest {
        NotificationRequest {
            ticket_id,
            recipients: vec![UserId(1), UserId(2)],
            title: "Ticket update".to_string(),
            content: "Ticket #1 has been closed".to_string(),
            category: "ticket".to_string(),
            created_at: Utc::now(),
        }
    }

    struct Counting(AtomicUsize);

    impl NotificationChannel for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn notify(&self, _request: &NotificationRequest) -> Result<(), NotifyError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Broken;

    impl NotificationChannel for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn notify(&self, _request: &NotificationRequest) -> Result<(), NotifyError> {
            Err(NotifyError::Transport("down".to_string()))
        }
    }

    #[test]
    fn log_channel_always_succeeds() {
        assert!(LogChannel.notify(&request(None)).is_ok());
    }

    #[test]
    fn inbox_channel_writes_one_row_per_recipient() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let ticket = store.create_ticket(NewTicket::new("t", UserId(1))).unwrap();
        let channel = InboxChannel::new(Arc::clone(&store));

        channel.notify(&request(Some(ticket.id))).unwrap();
        assert_eq!(store.inbox(UserId(1), false).unwrap().len(), 1);
        assert_eq!(store.inbox(UserId(2), false).unwrap().len(), 1);
        assert!(store.inbox(UserId(3), false).unwrap().is_empty());
    }

    #[test]
    fn webhook_payload_is_text_message() {
        let payload = WebhookChannel::payload(&request(None));
        assert_eq!(payload["msgtype"], "text");
        assert_eq!(
            payload["text"]["content"],
            "Ticket update\nTicket #1 has been closed"
        );
    }

    #[test]
    fn webhook_unreachable_host_is_transport_error() {
        // Port 9 on loopback is discard; nothing listens in test sandboxes.
        let channel = WebhookChannel::new("http://127.0.0.1:9/hook", Duration::from_millis(200));
        let err = channel.notify(&request(None)).unwrap_err();
        assert!(matches!(err, NotifyError::Transport(_)));
    }

    #[test]
    fn fanout_tries_every_channel_and_reports_first_error() {
        let counter = Arc::new(Counting(AtomicUsize::new(0)));
        let fanout = FanoutChannel::default()
            .with(Arc::new(Broken))
            .with(counter.clone());

        let err = fanout.notify(&request(None)).unwrap_err();
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        match err {
            NotifyError::Fanout { failed, total, first } => {
                assert_eq!((failed, total), (1, 2));
                assert!(matches!(*first, NotifyError::Transport(_)));
            }
            other => panic!("expected fanout error, got {other:?}"),
        }
    }
}
