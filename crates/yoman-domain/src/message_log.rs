use std::sync::Arc;

use tracing::warn;

use yoman_core::clock::Clock;
use yoman_core::types::{new_row_id, UserId};

use crate::db::Db;
use crate::types::MessageDirection;

/// Durable audit log of transport messages. Append-only; write failures
/// are logged and swallowed so logging never breaks the message path.
pub struct MessageLog {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl MessageLog {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn append(&self, user_id: Option<&UserId>, direction: MessageDirection, text: &str) {
        let now = self.clock.now_utc().to_rfc3339();
        let db = self.db.lock().unwrap();
        let result = db.execute(
            "INSERT INTO message_logs (id, user_id, direction, text, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                new_row_id(),
                user_id.map(|u| u.as_str().to_string()),
                direction.as_str(),
                text,
                now
            ],
        );
        if let Err(e) = result {
            warn!(error = %e, "message log append failed");
        }
    }

    /// Total messages logged for a user, for diagnostics.
    pub fn count_for_user(&self, user_id: &UserId) -> i64 {
        let db = self.db.lock().unwrap();
        db.query_row(
            "SELECT COUNT(*) FROM message_logs WHERE user_id = ?1",
            rusqlite::params![user_id.as_str()],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }
}
