//! In-process ticket store.
//!
//! A unit of work runs against a staged copy of the state which replaces the
//! live state only when the work succeeds.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;

use super::{StoreError, StoreTx, TicketStore};
use crate::model::{HistoryEntry, NewHistoryEntry, NewTicket, Ticket, TicketId};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    tickets: BTreeMap<TicketId, Ticket>,
    history: Vec<HistoryEntry>,
    next_ticket_id: u64,
    next_history_id: u64,
}

/// Failure budget consumed by the next writes, one unit per failed call.
#[derive(Debug, Default)]
struct Faults {
    saves: AtomicUsize,
    history_appends: AtomicUsize,
}

impl Faults {
    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    faults: Faults,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store mutex poisoned".to_string()))
    }

    /// Create a ticket in `submitted`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store mutex is poisoned.
    pub fn create_ticket(&self, new: NewTicket) -> Result<Ticket, StoreError> {
        let mut state = self.lock()?;
        state.next_ticket_id += 1;
        let ticket = new.into_ticket(TicketId(state.next_ticket_id), Utc::now());
        state.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket)
    }

    /// Insert or replace a ticket row verbatim, bypassing the lifecycle.
    /// Meant for seeding fixtures in a particular status.
    ///
    /// # Errors
    ///
    /// Returns an error if the store mutex is poisoned.
    pub fn seed(&self, ticket: Ticket) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.next_ticket_id = state.next_ticket_id.max(ticket.id.get());
        state.tickets.insert(ticket.id, ticket);
        Ok(())
    }

    /// Make the next `count` saves fail with [`StoreError::Unavailable`].
    pub fn fail_next_saves(&self, count: usize) {
        self.faults.saves.store(count, Ordering::Release);
    }

    /// Make the next `count` history appends fail with [`StoreError::Unavailable`].
    pub fn fail_next_history_appends(&self, count: usize) {
        self.faults.history_appends.store(count, Ordering::Release);
    }

    /// Total audit records across all tickets.
    ///
    /// # Errors
    ///
    /// Returns an error if the store mutex is poisoned.
    pub fn history_len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.history.len())
    }
}

struct MemoryTx<'a> {
    staged: &'a mut MemoryState,
    faults: &'a Faults,
}

impl StoreTx for MemoryTx<'_> {
    fn save(&mut self, ticket: &Ticket, expected_version: u64) -> Result<(), StoreError> {
        if Faults::take(&self.faults.saves) {
            return Err(StoreError::Unavailable("injected save failure".to_string()));
        }
        let current = self
            .staged
            .tickets
            .get_mut(&ticket.id)
            .ok_or(StoreError::Missing(ticket.id))?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                ticket_id: ticket.id,
                expected: expected_version,
            });
        }
        *current = ticket.clone();
        Ok(())
    }

    fn append_history(&mut self, entry: &NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        if Faults::take(&self.faults.history_appends) {
            return Err(StoreError::Unavailable(
                "injected history append failure".to_string(),
            ));
        }
        self.staged.next_history_id += 1;
        let stored = entry.clone().with_id(self.staged.next_history_id);
        self.staged.history.push(stored.clone());
        Ok(stored)
    }
}

impl TicketStore for MemoryStore {
    fn load(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        Ok(self.lock()?.tickets.get(&id).cloned())
    }

    fn unit_of_work(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreTx) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let mut staged = state.clone();
        work(&mut MemoryTx {
            staged: &mut staged,
            faults: &self.faults,
        })?;
        *state = staged;
        Ok(())
    }

    fn history(&self, id: TicketId) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .lock()?
            .history
            .iter()
            .filter(|entry| entry.ticket_id == id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::model::{NewHistoryEntry, NewTicket, TicketStatus, UserId};
    use crate::store::{StoreError, TicketStore};
    use chrono::Utc;

    fn entry_for(ticket: &crate::model::Ticket) -> NewHistoryEntry {
        NewHistoryEntry::for_transition(
            ticket.id,
            UserId(1),
            TicketStatus::Submitted,
            TicketStatus::Assigned,
            "",
            Utc::now(),
        )
    }

    #[test]
    fn created_tickets_get_sequential_ids() {
        let store = MemoryStore::new();
        let a = store.create_ticket(NewTicket::new("a", UserId(1))).unwrap();
        let b = store.create_ticket(NewTicket::new("b", UserId(1))).unwrap();
        assert_eq!(a.id.get() + 1, b.id.get());
        assert_eq!(store.load(b.id).unwrap().unwrap().title, "b");
    }

    #[test]
    fn failed_work_leaves_state_untouched() {
        let store = MemoryStore::new();
        let ticket = store.create_ticket(NewTicket::new("a", UserId(1))).unwrap();

        let result = store.unit_of_work(&mut |tx| {
            tx.append_history(&entry_for(&ticket))?;
            Err(StoreError::Unavailable("boom".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(store.history_len().unwrap(), 0);
    }

    #[test]
    fn stale_version_is_rejected() {
        let store = MemoryStore::new();
        let mut ticket = store.create_ticket(NewTicket::new("a", UserId(1))).unwrap();
        ticket.version = 1;
        ticket.status = TicketStatus::Assigned;

        store
            .unit_of_work(&mut |tx| tx.save(&ticket, 0))
            .unwrap();
        let err = store
            .unit_of_work(&mut |tx| tx.save(&ticket, 0))
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, .. }));
    }

    #[test]
    fn injected_save_failure_is_consumed_once() {
        let store = MemoryStore::new();
        let mut ticket = store.create_ticket(NewTicket::new("a", UserId(1))).unwrap();
        store.fail_next_saves(1);
        ticket.version = 1;

        assert!(store.unit_of_work(&mut |tx| tx.save(&ticket, 0)).is_err());
        assert!(store.unit_of_work(&mut |tx| tx.save(&ticket, 0)).is_ok());
    }
}
