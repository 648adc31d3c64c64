//! Per-ticket mutual exclusion inside one process.
//!
//! Only tickets currently held occupy a slot; a released ticket is removed
//! from the registry, so the registry never grows past the number of
//! concurrent holders.

use std::collections::HashSet;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::model::TicketId;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("lock on ticket {ticket_id} timed out after {waited:?}")]
pub struct LockTimeout {
    pub ticket_id: TicketId,
    pub waited: Duration,
}

#[derive(Debug, Default)]
pub struct TicketLocks {
    held: Mutex<HashSet<TicketId>>,
    released: Condvar,
}

impl TicketLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // Slot bookkeeping never panics while the mutex is held, so a poisoned
    // registry still has a consistent set.
    fn held(&self) -> MutexGuard<'_, HashSet<TicketId>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `ticket_id` is free or `timeout` elapses.
    ///
    /// # Errors
    ///
    /// [`LockTimeout`] if another holder kept the ticket past `timeout`.
    pub fn acquire(
        &self,
        ticket_id: TicketId,
        timeout: Duration,
    ) -> Result<TicketLockGuard<'_>, LockTimeout> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut held = self.held();

        while held.contains(&ticket_id) {
            let now = Instant::now();
            if now >= deadline {
                return Err(LockTimeout {
                    ticket_id,
                    waited: start.elapsed(),
                });
            }
            held = self
                .released
                .wait_timeout(held, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        held.insert(ticket_id);
        Ok(TicketLockGuard {
            locks: self,
            ticket_id,
        })
    }

    /// Number of tickets currently locked.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held().len()
    }
}

/// RAII guard; the ticket is released on drop.
#[derive(Debug)]
pub struct TicketLockGuard<'a> {
    locks: &'a TicketLocks,
    ticket_id: TicketId,
}

impl TicketLockGuard<'_> {
    #[must_use]
    pub const fn ticket_id(&self) -> TicketId {
        self.ticket_id
    }
}

impl Drop for TicketLockGuard<'_> {
    fn drop(&mut self) {
        self.locks.held().remove(&self.ticket_id);
        self.locks.released.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::TicketLocks;
    use crate::model::TicketId;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn acquire_and_release() {
        let locks = TicketLocks::new();
        {
            let guard = locks.acquire(TicketId(1), Duration::from_millis(50)).unwrap();
            assert_eq!(guard.ticket_id(), TicketId(1));
            assert_eq!(locks.held_count(), 1);
        }
        assert_eq!(locks.held_count(), 0);
    }

    #[test]
    fn distinct_tickets_do_not_contend() {
        let locks = TicketLocks::new();
        let _a = locks.acquire(TicketId(1), Duration::from_millis(50)).unwrap();
        let _b = locks.acquire(TicketId(2), Duration::from_millis(50)).unwrap();
        assert_eq!(locks.held_count(), 2);
    }

    #[test]
    fn held_ticket_times_out() {
        let locks = TicketLocks::new();
        let _guard = locks.acquire(TicketId(7), Duration::from_millis(50)).unwrap();
        let err = locks
            .acquire(TicketId(7), Duration::from_millis(20))
            .unwrap_err();
        assert_eq!(err.ticket_id, TicketId(7));
        assert!(err.waited >= Duration::from_millis(20));
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let locks = Arc::new(TicketLocks::new());
        let barrier = Arc::new(Barrier::new(2));

        let holder_locks = Arc::clone(&locks);
        let holder_barrier = Arc::clone(&barrier);
        let holder = thread::spawn(move || {
            let _guard = holder_locks
                .acquire(TicketId(3), Duration::from_millis(50))
                .unwrap();
            holder_barrier.wait();
            thread::sleep(Duration::from_millis(30));
        });

        barrier.wait();
        let guard = locks.acquire(TicketId(3), Duration::from_secs(2));
        assert!(guard.is_ok());
        drop(guard);
        holder.join().unwrap();
        assert_eq!(locks.held_count(), 0);
    }
}
