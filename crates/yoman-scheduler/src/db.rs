use rusqlite::{Connection, Result};

/// Initialise the jobs table. Idempotent.
///
/// The partial unique index over `(reminder_id, occurrence_utc)` makes
/// delivery-job enqueueing idempotent per occurrence.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS jobs (
            id              TEXT PRIMARY KEY NOT NULL,
            kind            TEXT NOT NULL,           -- JSON payload
            reminder_id     TEXT,
            occurrence_utc  TEXT,
            run_at_utc      TEXT NOT NULL,
            status          TEXT NOT NULL DEFAULT 'pending',
            attempts        INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_occurrence
            ON jobs(reminder_id, occurrence_utc) WHERE reminder_id IS NOT NULL;
        CREATE INDEX IF NOT EXISTS idx_jobs_due
            ON jobs(status, run_at_utc);",
    )
}
