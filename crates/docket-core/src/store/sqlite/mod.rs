//! SQLite-backed ticket store.
//!
//! Connection defaults:
//! - `journal_mode = WAL` so readers never block the single writer
//! - `busy_timeout = 5s` to ride out short lock contention between processes
//! - `foreign_keys = ON` so history rows cannot outlive their ticket
//!
//! Every unit of work is an `IMMEDIATE` transaction, and ticket saves are
//! conditional on the stored `version`, which keeps two processes sharing one
//! file from both committing a transition off the same snapshot.

pub mod migrations;
pub mod schema;

use std::fmt::Write as _;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use serde::Serialize;

use super::{StoreError, StoreTx, TicketStore};
use crate::model::{
    HistoryAction, HistoryEntry, NewHistoryEntry, NewTicket, Ticket, TicketId, TicketStats,
    TicketStatus, UserId,
};
use crate::notify::NotificationRequest;
use crate::permissions::PermissionProvider;

/// Busy timeout applied to every connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TICKET_COLUMNS: &str = "ticket_id, title, description, ticket_type, status, priority, \
     creator_id, assignee_id, category, tags_json, due_at_us, processing_started_at_us, \
     resolved_at_us, closed_at_us, created_at_us, updated_at_us, version";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

/// Filter for [`SqliteStore::list_tickets`]. Fields combine with AND.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub assignee: Option<UserId>,
    pub creator: Option<UserId>,
    pub limit: Option<u32>,
}

/// One row of a user's notification inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InboxMessage {
    pub id: u64,
    pub recipient_id: UserId,
    pub ticket_id: Option<TicketId>,
    pub title: String,
    pub content: String,
    pub category: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`, apply pragmas and migrate.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created, or opening,
    /// configuring or migrating the database fails.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }

        let mut conn = Connection::open(path)
            .with_context(|| format!("open database {}", path.display()))?;
        configure_connection(&conn).context("configure sqlite pragmas")?;
        migrations::migrate(&mut conn).context("apply schema migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database, migrated to the latest schema.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory().context("open in-memory database")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        migrations::migrate(&mut conn).context("apply schema migrations")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection mutex poisoned".to_string()))
    }

    /// Insert a new ticket in `submitted` with version 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert violates a schema constraint (blank
    /// title, invalid creator) or SQLite fails.
    pub fn create_ticket(&self, new: NewTicket) -> Result<Ticket, StoreError> {
        let now = Utc::now();
        let conn = self.conn()?;
        let tags_json = encode_tags(&new.tags, TicketId(0))?;
        conn.execute(
            "INSERT INTO tickets (title, description, ticket_type, status, priority, creator_id, \
             category, tags_json, due_at_us, created_at_us, updated_at_us, version) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10, 0)",
            params![
                new.title,
                new.description,
                new.ticket_type.as_str(),
                TicketStatus::Submitted.as_str(),
                new.priority.as_str(),
                new.creator_id.get(),
                new.category,
                tags_json,
                new.due_date.map(to_us),
                to_us(now),
            ],
        )?;
        let id = TicketId(u64::try_from(conn.last_insert_rowid()).map_err(|_| {
            StoreError::Unavailable("sqlite returned a negative rowid".to_string())
        })?);
        tracing::debug!(ticket = %id, "ticket created");
        // Re-read so the returned value matches the stored precision.
        load_ticket(&conn, id)?.ok_or(StoreError::Missing(id))
    }

    /// List tickets, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn list_tickets(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, StoreError> {
        let mut conditions: Vec<String> = Vec::new();
        let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            values.push(Box::new(status.as_str()));
            conditions.push(format!("status = ?{}", values.len()));
        }
        if let Some(assignee) = filter.assignee {
            values.push(Box::new(assignee.get()));
            conditions.push(format!("assignee_id = ?{}", values.len()));
        }
        if let Some(creator) = filter.creator {
            values.push(Box::new(creator.get()));
            conditions.push(format!("creator_id = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {TICKET_COLUMNS} FROM tickets");
        if !conditions.is_empty() {
            let _ = write!(sql, " WHERE {}", conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at_us DESC, ticket_id DESC");
        if let Some(limit) = filter.limit {
            let _ = write!(sql, " LIMIT {limit}");
        }

        let params_ref: Vec<&dyn rusqlite::types::ToSql> =
            values.iter().map(AsRef::as_ref).collect();

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params_ref), TicketRow::from_row)?;

        let mut tickets = Vec::new();
        for row in rows {
            tickets.push(row?.into_ticket()?);
        }
        Ok(tickets)
    }

    /// Counts over every stored ticket, with overdue judged at `now`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub fn ticket_stats(&self, now: DateTime<Utc>) -> Result<TicketStats, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("SELECT {TICKET_COLUMNS} FROM tickets"))?;
        let rows = stmt.query_map([], TicketRow::from_row)?;

        let mut stats = TicketStats::default();
        for row in rows {
            stats.record(&row?.into_ticket()?, now);
        }
        Ok(stats)
    }

    /// Grant `permission` to `user`. Returns `false` if it was already held.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub fn grant(&self, user: UserId, permission: &str) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "INSERT OR IGNORE INTO user_permissions (user_id, permission, granted_at_us) \
             VALUES (?1, ?2, ?3)",
            params![user.get(), permission.trim(), to_us(Utc::now())],
        )?;
        Ok(changed > 0)
    }

    /// Revoke `permission` from `user`. Returns `false` if it was not held.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub fn revoke(&self, user: UserId, permission: &str) -> Result<bool, StoreError> {
        let changed = self.conn()?.execute(
            "DELETE FROM user_permissions WHERE user_id = ?1 AND permission = ?2",
            params![user.get(), permission.trim()],
        )?;
        Ok(changed > 0)
    }

    /// Permissions held by `user`, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub fn permissions_of(&self, user: UserId) -> Result<Vec<String>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT permission FROM user_permissions WHERE user_id = ?1 ORDER BY permission",
        )?;
        let rows = stmt.query_map(params![user.get()], |row| row.get::<_, String>(0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn permission_granted(&self, user: UserId, permission: &str) -> Result<bool, StoreError> {
        Ok(self.conn()?.query_row(
            "SELECT EXISTS(SELECT 1 FROM user_permissions WHERE user_id = ?1 AND permission = ?2)",
            params![user.get(), permission],
            |row| row.get(0),
        )?)
    }

    /// Write one inbox row per recipient, atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails; no rows are written in that case.
    pub fn insert_notifications(&self, request: &NotificationRequest) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO notifications \
                 (recipient_id, ticket_id, title, content, category, created_at_us) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for recipient in &request.recipients {
                stmt.execute(params![
                    recipient.get(),
                    request.ticket_id.map(TicketId::get),
                    request.title,
                    request.content,
                    request.category,
                    to_us(request.created_at),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Inbox for `user`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a timestamp is out of range.
    pub fn inbox(&self, user: UserId, unread_only: bool) -> Result<Vec<InboxMessage>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT notification_id, recipient_id, ticket_id, title, content, category, \
             is_read, created_at_us FROM notifications \
             WHERE recipient_id = ?1 AND (?2 = 0 OR is_read = 0) \
             ORDER BY created_at_us DESC, notification_id DESC",
        )?;
        let rows = stmt.query_map(params![user.get(), i64::from(unread_only)], |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, u64>(1)?,
                row.get::<_, Option<u64>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, i64>(6)? != 0,
                row.get::<_, i64>(7)?,
            ))
        })?;

        let mut messages = Vec::new();
        for row in rows {
            let (id, recipient, ticket, title, content, category, is_read, created_us) = row?;
            let ticket_id = ticket.map(TicketId);
            let created_at = from_us(
                created_us,
                "notification created_at",
                ticket_id.unwrap_or(TicketId(0)),
            )?;
            messages.push(InboxMessage {
                id,
                recipient_id: UserId(recipient),
                ticket_id,
                title,
                content,
                category,
                is_read,
                created_at,
            });
        }
        Ok(messages)
    }

    /// Mark every unread inbox row of `user` as read; returns how many changed.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite fails.
    pub fn mark_inbox_read(&self, user: UserId) -> Result<usize, StoreError> {
        Ok(self.conn()?.execute(
            "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
            params![user.get()],
        )?)
    }
}

impl TicketStore for SqliteStore {
    fn load(&self, id: TicketId) -> Result<Option<Ticket>, StoreError> {
        load_ticket(&*self.conn()?, id)
    }

    fn unit_of_work(
        &self,
        work: &mut dyn FnMut(&mut dyn StoreTx) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        work(&mut SqliteTx { conn: &tx })?;
        tx.commit()?;
        Ok(())
    }

    fn history(&self, id: TicketId) -> Result<Vec<HistoryEntry>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT history_id, ticket_id, actor_id, action, description, created_at_us \
             FROM ticket_history WHERE ticket_id = ?1 \
             ORDER BY created_at_us ASC, history_id ASC",
        )?;
        let rows = stmt.query_map(params![id.get()], |row| {
            Ok((
                row.get::<_, u64>(0)?,
                row.get::<_, u64>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (history_id, actor, action, description, created_us) = row?;
            let action = action
                .parse::<HistoryAction>()
                .map_err(|err| corrupt("history action", id, &err))?;
            entries.push(HistoryEntry {
                id: history_id,
                ticket_id: id,
                actor_id: UserId(actor),
                action,
                description,
                created_at: from_us(created_us, "history created_at", id)?,
            });
        }
        Ok(entries)
    }
}

impl PermissionProvider for SqliteStore {
    fn has_permission(&self, user: UserId, permission: &str) -> bool {
        match self.permission_granted(user, permission) {
            Ok(granted) => granted,
            Err(err) => {
                tracing::warn!(
                    user = user.get(),
                    permission,
                    error = %err,
                    "permission lookup failed; denying"
                );
                false
            }
        }
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
}

impl StoreTx for SqliteTx<'_> {
    fn save(&mut self, ticket: &Ticket, expected_version: u64) -> Result<(), StoreError> {
        let tags_json = encode_tags(&ticket.tags, ticket.id)?;
        let changed = self.conn.execute(
            "UPDATE tickets SET title = ?2, description = ?3, ticket_type = ?4, status = ?5, \
             priority = ?6, assignee_id = ?7, category = ?8, tags_json = ?9, due_at_us = ?10, \
             processing_started_at_us = ?11, resolved_at_us = ?12, closed_at_us = ?13, \
             updated_at_us = ?14, version = ?15 \
             WHERE ticket_id = ?1 AND version = ?16",
            params![
                ticket.id.get(),
                ticket.title,
                ticket.description,
                ticket.ticket_type.as_str(),
                ticket.status.as_str(),
                ticket.priority.as_str(),
                ticket.assignee_id.map(UserId::get),
                ticket.category,
                tags_json,
                ticket.due_date.map(to_us),
                ticket.processing_started_at.map(to_us),
                ticket.resolved_at.map(to_us),
                ticket.closed_at.map(to_us),
                to_us(ticket.updated_at),
                ticket.version,
                expected_version,
            ],
        )?;
        if changed == 1 {
            return Ok(());
        }

        let exists: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM tickets WHERE ticket_id = ?1)",
            params![ticket.id.get()],
            |row| row.get(0),
        )?;
        if exists {
            Err(StoreError::VersionConflict {
                ticket_id: ticket.id,
                expected: expected_version,
            })
        } else {
            Err(StoreError::Missing(ticket.id))
        }
    }

    fn append_history(&mut self, entry: &NewHistoryEntry) -> Result<HistoryEntry, StoreError> {
        self.conn.execute(
            "INSERT INTO ticket_history (ticket_id, actor_id, action, description, created_at_us) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.ticket_id.get(),
                entry.actor_id.get(),
                entry.action.as_str(),
                entry.description,
                to_us(entry.created_at),
            ],
        )?;
        let id = u64::try_from(self.conn.last_insert_rowid())
            .map_err(|_| StoreError::Unavailable("sqlite returned a negative rowid".to_string()))?;
        Ok(entry.clone().with_id(id))
    }
}

fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    let _journal_mode: String =
        conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)?;
    Ok(())
}

fn load_ticket(conn: &Connection, id: TicketId) -> Result<Option<Ticket>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE ticket_id = ?1"),
            params![id.get()],
            TicketRow::from_row,
        )
        .optional()?;
    row.map(TicketRow::into_ticket).transpose()
}

/// Raw column values, decoded into a [`Ticket`] in a second step so that bad
/// enum text surfaces as [`StoreError::Corrupt`] rather than a SQLite error.
struct TicketRow {
    ticket_id: u64,
    title: String,
    description: String,
    ticket_type: String,
    status: String,
    priority: String,
    creator_id: u64,
    assignee_id: Option<u64>,
    category: String,
    tags_json: String,
    due_at_us: Option<i64>,
    processing_started_at_us: Option<i64>,
    resolved_at_us: Option<i64>,
    closed_at_us: Option<i64>,
    created_at_us: i64,
    updated_at_us: i64,
    version: u64,
}

impl TicketRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            ticket_id: row.get(0)?,
            title: row.get(1)?,
            description: row.get(2)?,
            ticket_type: row.get(3)?,
            status: row.get(4)?,
            priority: row.get(5)?,
            creator_id: row.get(6)?,
            assignee_id: row.get(7)?,
            category: row.get(8)?,
            tags_json: row.get(9)?,
            due_at_us: row.get(10)?,
            processing_started_at_us: row.get(11)?,
            resolved_at_us: row.get(12)?,
            closed_at_us: row.get(13)?,
            created_at_us: row.get(14)?,
            updated_at_us: row.get(15)?,
            version: row.get(16)?,
        })
    }

    fn into_ticket(self) -> Result<Ticket, StoreError> {
        let id = TicketId(self.ticket_id);
        let optional = |value: Option<i64>, what| value.map(|us| from_us(us, what, id)).transpose();
        Ok(Ticket {
            id,
            ticket_type: self
                .ticket_type
                .parse()
                .map_err(|err| corrupt("ticket_type", id, &err))?,
            status: self
                .status
                .parse()
                .map_err(|err| corrupt("status", id, &err))?,
            priority: self
                .priority
                .parse()
                .map_err(|err| corrupt("priority", id, &err))?,
            tags: serde_json::from_str(&self.tags_json)
                .map_err(|err| corrupt("tags_json", id, &err))?,
            due_date: optional(self.due_at_us, "due_date")?,
            processing_started_at: optional(self.processing_started_at_us, "processing_started_at")?,
            resolved_at: optional(self.resolved_at_us, "resolved_at")?,
            closed_at: optional(self.closed_at_us, "closed_at")?,
            created_at: from_us(self.created_at_us, "created_at", id)?,
            updated_at: from_us(self.updated_at_us, "updated_at", id)?,
            title: self.title,
            description: self.description,
            creator_id: UserId(self.creator_id),
            assignee_id: self.assignee_id.map(UserId),
            category: self.category,
            version: self.version,
        })
    }
}

fn corrupt(what: &'static str, ticket_id: TicketId, err: &dyn std::fmt::Display) -> StoreError {
    StoreError::Corrupt {
        what,
        ticket_id,
        reason: err.to_string(),
    }
}

fn encode_tags(tags: &[String], ticket_id: TicketId) -> Result<String, StoreError> {
    serde_json::to_string(tags).map_err(|err| corrupt("tags", ticket_id, &err))
}

fn to_us(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_us(us: i64, what: &'static str, ticket_id: TicketId) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_micros(us).ok_or_else(|| StoreError::Corrupt {
        what,
        ticket_id,
        reason: format!("timestamp {us}us out of range"),
    })
}
