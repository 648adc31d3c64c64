//! SQLite schema for the docket database.
//!
//! - `tickets` holds the current row per ticket, guarded by `version`; the
//!   status check also admits the legacy `progress` spelling
//! - `ticket_history` is append-only; nothing updates or deletes from it
//! - `user_permissions` backs the permission provider
//! - `notifications` is the inbox written by the inbox channel (v2)

/// Migration v1: tickets, audit trail, permission grants, metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS tickets (
    ticket_id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL CHECK (length(trim(title)) > 0),
    description TEXT NOT NULL DEFAULT '',
    ticket_type TEXT NOT NULL
        CHECK (ticket_type IN ('bug', 'feature', 'support', 'change', 'custom')),
    status TEXT NOT NULL CHECK (status IN (
        'submitted', 'assigned', 'accepted', 'approved', 'in_progress', 'pending',
        'resolved', 'closed', 'rejected', 'returned', 'progress'
    )),
    priority TEXT NOT NULL CHECK (priority IN ('low', 'normal', 'high', 'critical')),
    creator_id INTEGER NOT NULL CHECK (creator_id > 0),
    assignee_id INTEGER CHECK (assignee_id IS NULL OR assignee_id > 0),
    category TEXT NOT NULL DEFAULT '',
    tags_json TEXT NOT NULL DEFAULT '[]',
    due_at_us INTEGER,
    processing_started_at_us INTEGER,
    resolved_at_us INTEGER,
    closed_at_us INTEGER,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL,
    version INTEGER NOT NULL DEFAULT 0 CHECK (version >= 0)
);

CREATE INDEX IF NOT EXISTS idx_tickets_status ON tickets(status);
CREATE INDEX IF NOT EXISTS idx_tickets_assignee ON tickets(assignee_id);
CREATE INDEX IF NOT EXISTS idx_tickets_creator ON tickets(creator_id);

CREATE TABLE IF NOT EXISTS ticket_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    ticket_id INTEGER NOT NULL REFERENCES tickets(ticket_id) ON DELETE CASCADE,
    actor_id INTEGER NOT NULL,
    action TEXT NOT NULL,
    description TEXT NOT NULL,
    created_at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ticket_history_ticket
    ON ticket_history(ticket_id, created_at_us, history_id);

CREATE TABLE IF NOT EXISTS user_permissions (
    user_id INTEGER NOT NULL CHECK (user_id > 0),
    permission TEXT NOT NULL CHECK (length(trim(permission)) > 0),
    granted_at_us INTEGER NOT NULL,
    PRIMARY KEY (user_id, permission)
);

CREATE TABLE IF NOT EXISTS docket_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO docket_meta (id, schema_version) VALUES (1, 0);
";

/// Migration v2: per-user notification inbox.
pub const MIGRATION_V2_SQL: &str = r"
CREATE TABLE IF NOT EXISTS notifications (
    notification_id INTEGER PRIMARY KEY AUTOINCREMENT,
    recipient_id INTEGER NOT NULL CHECK (recipient_id > 0),
    ticket_id INTEGER,
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    category TEXT NOT NULL,
    is_read INTEGER NOT NULL DEFAULT 0 CHECK (is_read IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notifications_recipient
    ON notifications(recipient_id, is_read, created_at_us);
";
