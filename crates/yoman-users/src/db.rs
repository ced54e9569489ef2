use rusqlite::{Connection, Result};
use std::str::FromStr;

use yoman_core::types::{Language, Phone, TimeOfDay, UserId};

use crate::types::{MorningNotification, User};

/// Initialise the users table. Safe to call on every startup — CREATE IF
/// NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS users (
            id                              TEXT PRIMARY KEY NOT NULL,
            phone                           TEXT NOT NULL UNIQUE,
            name                            TEXT NOT NULL,
            pin_hash                        TEXT NOT NULL,
            timezone                        TEXT NOT NULL DEFAULT 'Asia/Jerusalem',
            language                        TEXT NOT NULL DEFAULT 'he',
            default_location                TEXT NOT NULL DEFAULT 'jerusalem',
            preferred_time_of_day           TEXT,
            default_event_duration_minutes  INTEGER NOT NULL DEFAULT 60,
            patterns                        TEXT NOT NULL DEFAULT '{}',  -- JSON
            morning_notification            TEXT NOT NULL DEFAULT '{}',  -- JSON
            failed_login_count              INTEGER NOT NULL DEFAULT 0,
            lockout_until_utc               TEXT,
            created_at                      TEXT NOT NULL,
            updated_at                      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_users_phone ON users(phone);",
    )
}

pub(crate) const USER_COLUMNS: &str = "id, phone, name, pin_hash, timezone, language,
    default_location, preferred_time_of_day, default_event_duration_minutes,
    patterns, morning_notification, failed_login_count, lockout_until_utc,
    created_at, updated_at";

/// Map a SELECT row (column order from USER_COLUMNS) to a User.
/// Centralised here so every query in this crate stays consistent.
pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    let patterns: serde_json::Value =
        serde_json::from_str(&row.get::<_, String>(9)?).unwrap_or(serde_json::Value::Null);
    let morning: MorningNotification =
        serde_json::from_str(&row.get::<_, String>(10)?).unwrap_or_default();
    let language = Language::from_str(&row.get::<_, String>(5)?).unwrap_or_default();
    let preferred = row
        .get::<_, Option<String>>(7)?
        .and_then(|s| TimeOfDay::from_str(&s).ok());
    let lockout = row
        .get::<_, Option<String>>(12)?
        .and_then(|s| s.parse().ok());
    Ok(User {
        id: UserId::from(row.get::<_, String>(0)?),
        phone: Phone::from_stored(row.get(1)?),
        name: row.get(2)?,
        pin_hash: row.get(3)?,
        timezone: row.get(4)?,
        language,
        default_location: row.get(6)?,
        preferred_time_of_day: preferred,
        default_event_duration_minutes: row.get(8)?,
        patterns,
        morning_notification: morning,
        failed_login_count: row.get::<_, i64>(11)? as u32,
        lockout_until_utc: lockout,
        created_at: row
            .get::<_, String>(13)?
            .parse()
            .unwrap_or_else(|_| chrono::Utc::now()),
        updated_at: row
            .get::<_, String>(14)?
            .parse()
            .unwrap_or_else(|_| chrono::Utc::now()),
    })
}
