use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, Result};

/// Shared connection handle — all domain services write through one
/// serialized connection, like the session and user managers do.
pub type Db = Arc<Mutex<Connection>>;

/// Open (or wrap) a connection, initialise the domain schema and return
/// the shared handle.
pub fn open_shared(conn: Connection) -> Result<Db> {
    init_db(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Initialise all domain tables. Safe to call on every startup —
/// CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_events_table(conn)?;
    create_participants_table(conn)?;
    create_reminders_table(conn)?;
    create_tasks_table(conn)?;
    create_contacts_table(conn)?;
    create_message_logs_table(conn)?;
    Ok(())
}

fn create_events_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS events (
            id              TEXT PRIMARY KEY NOT NULL,
            user_id         TEXT NOT NULL,
            title           TEXT NOT NULL,
            start_ts_utc    TEXT NOT NULL,
            end_ts_utc      TEXT,
            location        TEXT,
            source          TEXT NOT NULL DEFAULT 'user_input',
            recurrence_rule TEXT,
            notes           TEXT NOT NULL DEFAULT '[]'
                            CHECK (json_valid(notes) AND json_type(notes) = 'array'),
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL,
            CHECK (end_ts_utc IS NULL OR end_ts_utc >= start_ts_utc)
        );
        CREATE INDEX IF NOT EXISTS idx_events_user_start
            ON events(user_id, start_ts_utc);
        CREATE INDEX IF NOT EXISTS idx_events_user_end
            ON events(user_id, end_ts_utc) WHERE end_ts_utc IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_events_user_span
            ON events(user_id, start_ts_utc, end_ts_utc);",
    )
}

fn create_participants_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS event_participants (
            id        TEXT PRIMARY KEY NOT NULL,
            event_id  TEXT NOT NULL REFERENCES events(id) ON DELETE CASCADE,
            name      TEXT NOT NULL,
            role      TEXT NOT NULL DEFAULT 'primary',
            phone     TEXT,
            UNIQUE(event_id, name)
        );",
    )
}

fn create_reminders_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reminders (
            id                 TEXT PRIMARY KEY NOT NULL,
            user_id            TEXT NOT NULL,
            title              TEXT NOT NULL,
            reminder_ts_utc    TEXT NOT NULL,
            recurrence_rule    TEXT,
            lead_time_minutes  INTEGER,
            event_id           TEXT,
            status             TEXT NOT NULL DEFAULT 'active',
            last_fired_ts_utc  TEXT,
            created_at         TEXT NOT NULL,
            updated_at         TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_reminders_user_ts
            ON reminders(user_id, reminder_ts_utc);
        CREATE INDEX IF NOT EXISTS idx_reminders_event
            ON reminders(event_id) WHERE event_id IS NOT NULL;",
    )
}

fn create_tasks_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tasks (
            id          TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT NOT NULL,
            title       TEXT NOT NULL,
            description TEXT,
            priority    TEXT NOT NULL DEFAULT 'normal',
            status      TEXT NOT NULL DEFAULT 'pending',
            due_ts_utc  TEXT,
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_user_due
            ON tasks(user_id, due_ts_utc) WHERE due_ts_utc IS NOT NULL;",
    )
}

fn create_contacts_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS contacts (
            id       TEXT PRIMARY KEY NOT NULL,
            user_id  TEXT NOT NULL,
            name     TEXT NOT NULL,
            phone    TEXT,
            aliases  TEXT NOT NULL DEFAULT '[]'  -- JSON array
        );
        CREATE INDEX IF NOT EXISTS idx_contacts_user
            ON contacts(user_id);",
    )
}

fn create_message_logs_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS message_logs (
            id          TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT,
            direction   TEXT NOT NULL,
            text        TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_msglog_user
            ON message_logs(user_id, created_at);",
    )
}

/// Parse a stored RFC3339 timestamp column.
pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    raw.parse().unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn parse_ts_opt(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| s.parse().ok())
}
