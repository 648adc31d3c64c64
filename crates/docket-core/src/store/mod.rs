//! Storage collaborators consumed by the lifecycle service.
//!
//! The service only ever sees [`TicketStore`]: a point read, an atomic unit
//! of work in which the ticket row is saved and its audit entry appended, and
//! the per-ticket history query. Two implementations ship:
//! - [`memory::MemoryStore`] for embedding and tests (supports fault injection)
//! - [`sqlite::SqliteStore`] backed by `rusqlite`

pub mod memory;
pub mod sqlite;

use crate::error::ErrorCode;
use crate::model::{HistoryEntry, NewHistoryEntry, Ticket, TicketId};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stale write for ticket {ticket_id}: expected version {expected}")]
    VersionConflict { ticket_id: TicketId, expected: u64 },

    #[error("ticket {0} does not exist")]
    Missing(TicketId),

    #[error("corrupt {what} for ticket {ticket_id}: {reason}")]
    Corrupt {
        what: &'static str,
        ticket_id: TicketId,
        reason: String,
    },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::VersionConflict { .. } => ErrorCode::TransitionConflict,
            Self::Corrupt { .. } => ErrorCode::CorruptRecord,
            Self::Sqlite(_) | Self::Missing(_) | Self::Unavailable(_) => {
                ErrorCode::PersistenceFailed
            }
        }
    }
}

/// Writes allowed inside one unit of work.
pub trait StoreTx {
    /// Overwrite the ticket row, provided the stored version still equals
    /// `expected_version`. The caller has already bumped `ticket.version`.
    ///
    /// # Errors
    ///
    /// [`StoreError::VersionConflict`] when the stored version moved, or any
    /// backend failure.
    fn save(&mut self, ticket: &Ticket, expected_version: u64) -> Result<(), StoreError>;

    /// Append one audit record and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the insert.
    fn append_history(&mut self, entry: &NewHistoryEntry) -> Result<HistoryEntry, StoreError>;
}

/// Persistence seam for tickets and their audit trail.
pub trait TicketStore: Send + Sync {
    /// Point read by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the row cannot be decoded.
    fn load(&self, id: TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Run `work` atomically: either every write it performs becomes visible
    /// or none does. An error returned by `work` rolls back.
    ///
    /// # Errors
    ///
    /// Returns the error from `work`, or a backend failure to begin/commit.
    fn unit_of_work(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreTx) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;

    /// Audit trail for one ticket, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or a row cannot be decoded.
    fn history(&self, id: TicketId) -> Result<Vec<HistoryEntry>, StoreError>;
}
