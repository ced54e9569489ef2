use rusqlite::{Connection, Result};

/// Initialise the NLU bookkeeping tables. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    create_cost_log_table(conn)?;
    create_comparisons_table(conn)?;
    Ok(())
}

fn create_cost_log_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS ai_cost_log (
            id          TEXT PRIMARY KEY NOT NULL,
            user_id     TEXT,
            model       TEXT NOT NULL,
            operation   TEXT NOT NULL,
            cost_usd    REAL NOT NULL,
            tokens_used INTEGER NOT NULL,
            created_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cost_created
            ON ai_cost_log(created_at);",
    )
}

fn create_comparisons_table(conn: &Connection) -> Result<()> {
    // One row per ensemble invocation; per-model columns for up to the
    // three slots (shadow mode).
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS nlp_comparisons (
            id                  TEXT PRIMARY KEY NOT NULL,
            user_id             TEXT NOT NULL,
            message_text        TEXT NOT NULL,
            model_a             TEXT,
            intent_a            TEXT,
            confidence_a        REAL,
            response_time_ms_a  INTEGER,
            model_b             TEXT,
            intent_b            TEXT,
            confidence_b        REAL,
            response_time_ms_b  INTEGER,
            model_c             TEXT,
            intent_c            TEXT,
            confidence_c        REAL,
            response_time_ms_c  INTEGER,
            intent_match        INTEGER NOT NULL DEFAULT 0,
            confidence_diff     REAL NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cmp_user
            ON nlp_comparisons(user_id, created_at);",
    )
}
