//! Bounded queue drained by one background delivery thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam::channel::{Receiver, Sender, TrySendError};
use serde::Serialize;

use super::{NotificationChannel, NotificationRequest, NotificationSink};

/// Queue capacity used when configuration does not say otherwise.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

enum DispatchCommand {
    Deliver(Box<NotificationRequest>),
    Shutdown,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Requests accepted into the queue.
    pub submitted: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Requests refused because the queue was full or closed.
    pub dropped: u64,
}

pub struct NotificationDispatcher {
    tx: Sender<DispatchCommand>,
    counters: Arc<Counters>,
    closed: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    channel_name: &'static str,
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("channel", &self.channel_name)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Spawn the delivery worker. A `capacity` of zero is treated as one.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn start(
        channel: Arc<dyn NotificationChannel>,
        capacity: usize,
    ) -> std::io::Result<Self> {
        let (tx, rx) = crossbeam::channel::bounded(capacity.max(1));
        let counters = Arc::new(Counters::default());
        let channel_name = channel.name();

        let worker_counters = Arc::clone(&counters);
        let worker = thread::Builder::new()
            .name("docket-notify".to_string())
            .spawn(move || run_delivery_loop(channel.as_ref(), &rx, &worker_counters))?;

        tracing::debug!(channel = channel_name, capacity, "notification dispatcher started");
        Ok(Self {
            tx,
            counters,
            closed: AtomicBool::new(false),
            worker: Mutex::new(Some(worker)),
            channel_name,
        })
    }

    /// Enqueue without blocking. Returns `false` if the request was dropped.
    pub fn try_submit(&self, request: NotificationRequest) -> bool {
        if self.closed.load(Ordering::Acquire) {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(ticket = ?request.ticket_id, "dispatcher shut down; notification dropped");
            return false;
        }

        let ticket = request.ticket_id;
        match self.tx.try_send(DispatchCommand::Deliver(Box::new(request))) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(ticket = ?ticket, "notification queue full; dropped");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(ticket = ?ticket, "notification worker gone; dropped");
                false
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            delivered: self.counters.delivered.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Deliver everything already queued, then stop the worker and join it.
    /// Later submissions are dropped. Idempotent.
    pub fn shutdown(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Blocks only while the worker drains ahead of the marker.
        let _ = self.tx.send(DispatchCommand::Shutdown);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle
            && handle.join().is_err()
        {
            tracing::warn!(channel = self.channel_name, "notification worker panicked");
        }
        tracing::debug!(stats = ?self.stats(), "notification dispatcher stopped");
    }
}

impl NotificationSink for NotificationDispatcher {
    fn submit(&self, request: NotificationRequest) {
        let _ = self.try_submit(request);
    }
}

impl Drop for NotificationDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_delivery_loop(
    channel: &dyn NotificationChannel,
    rx: &Receiver<DispatchCommand>,
    counters: &Counters,
) {
    while let Ok(cmd) = rx.recv() {
        match cmd {
            DispatchCommand::Deliver(request) => match channel.notify(&request) {
                Ok(()) => {
                    counters.delivered.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        channel = channel.name(),
                        ticket = ?request.ticket_id,
                        recipients = request.recipients.len(),
                        "notification delivered"
                    );
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        channel = channel.name(),
                        ticket = ?request.ticket_id,
                        error = %err,
                        "notification delivery failed"
                    );
                }
            },
            DispatchCommand::Shutdown => break,
        }
    }
}
