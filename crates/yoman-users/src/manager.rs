use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rusqlite::Connection;
use tracing::info;

use yoman_core::clock::Clock;
use yoman_core::types::{new_row_id, Phone, UserId};

use crate::db::{init_db, row_to_user, USER_COLUMNS};
use crate::error::{Result, UserError};
use crate::types::{MorningNotification, User};

/// Thread-safe manager for the users table.
pub struct UserService {
    db: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl UserService {
    pub fn new(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            clock,
        })
    }

    /// Create a user with an already-hashed PIN. Fails with `PhoneTaken`
    /// when the phone is registered.
    pub fn create(&self, phone: &Phone, name: &str, pin_hash: &str) -> Result<User> {
        let now = self.clock.now_utc().to_rfc3339();
        let id = new_row_id();
        let morning = serde_json::to_string(&MorningNotification::default())?;

        let db = self.db.lock().unwrap();
        let inserted = db.execute(
            "INSERT OR IGNORE INTO users
             (id, phone, name, pin_hash, morning_notification, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            rusqlite::params![id, phone.as_str(), name, pin_hash, morning, now],
        )?;
        if inserted == 0 {
            return Err(UserError::PhoneTaken);
        }
        info!(user_id = %id, "user registered");

        db.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            rusqlite::params![id],
            row_to_user,
        )
        .map_err(UserError::from)
    }

    pub fn get_by_phone(&self, phone: &Phone) -> Result<Option<User>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1"),
            rusqlite::params![phone.as_str()],
            row_to_user,
        ) {
            Ok(u) => Ok(Some(u)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(UserError::Database(e)),
        }
    }

    pub fn get_by_id(&self, id: &UserId) -> Result<User> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            rusqlite::params![id.as_str()],
            row_to_user,
        ) {
            Ok(u) => Ok(u),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(UserError::NotFound),
            Err(e) => Err(UserError::Database(e)),
        }
    }

    /// Record a failed PIN attempt; returns the updated count and, once the
    /// limit is reached, sets and returns the lockout instant.
    pub fn record_login_failure(
        &self,
        id: &UserId,
        max_failures: u32,
        lockout: Duration,
    ) -> Result<(u32, Option<DateTime<Utc>>)> {
        let now = self.clock.now_utc();
        let db = self.db.lock().unwrap();
        let count: i64 = db.query_row(
            "UPDATE users SET failed_login_count = failed_login_count + 1, updated_at = ?2
             WHERE id = ?1
             RETURNING failed_login_count",
            rusqlite::params![id.as_str(), now.to_rfc3339()],
            |row| row.get(0),
        )?;

        let count = count as u32;
        if count >= max_failures {
            let until = now + lockout;
            db.execute(
                "UPDATE users SET lockout_until_utc = ?2, failed_login_count = 0
                 WHERE id = ?1",
                rusqlite::params![id.as_str(), until.to_rfc3339()],
            )?;
            info!(user_id = %id, until = %until, "login lockout engaged");
            return Ok((count, Some(until)));
        }
        Ok((count, None))
    }

    /// Clear the failure counter and any lockout after a successful login.
    pub fn reset_login_failures(&self, id: &UserId) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE users SET failed_login_count = 0, lockout_until_utc = NULL
             WHERE id = ?1",
            rusqlite::params![id.as_str()],
        )?;
        Ok(())
    }

    pub fn set_timezone(&self, id: &UserId, timezone: &str) -> Result<()> {
        self.update_field(id, "timezone", timezone)
    }

    pub fn set_language(&self, id: &UserId, language: &str) -> Result<()> {
        self.update_field(id, "language", language)
    }

    pub fn set_morning_notification(
        &self,
        id: &UserId,
        morning: &MorningNotification,
    ) -> Result<()> {
        let raw = serde_json::to_string(morning)?;
        self.update_field(id, "morning_notification", &raw)
    }

    fn update_field(&self, id: &UserId, column: &str, value: &str) -> Result<()> {
        let now = self.clock.now_utc().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            &format!("UPDATE users SET {column} = ?2, updated_at = ?3 WHERE id = ?1"),
            rusqlite::params![id.as_str(), value, now],
        )?;
        if changed == 0 {
            return Err(UserError::NotFound);
        }
        Ok(())
    }

    /// All users with the morning summary enabled — scanned once per day by
    /// the rollout job.
    pub fn list_morning_enabled(&self) -> Result<Vec<User>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!("SELECT {USER_COLUMNS} FROM users"))?;
        let users = stmt
            .query_map([], row_to_user)?
            .filter_map(|r| r.ok())
            .filter(|u| u.morning_notification.enabled)
            .collect();
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use yoman_core::clock::FixedClock;

    fn service() -> (Arc<FixedClock>, UserService) {
        let clock = Arc::new(FixedClock::new("2025-10-10T07:00:00Z".parse().unwrap()));
        let conn = Connection::open_in_memory().unwrap();
        let svc = UserService::new(conn, clock.clone()).unwrap();
        (clock, svc)
    }

    fn phone(n: &str) -> Phone {
        Phone::normalize(n).unwrap()
    }

    #[test]
    fn create_and_fetch_roundtrip() {
        let (_, svc) = service();
        let p = phone("+972541234567");
        let user = svc.create(&p, "דנה", "hash").unwrap();
        let fetched = svc.get_by_phone(&p).unwrap().unwrap();
        assert_eq!(fetched.id, user.id);
        assert_eq!(fetched.name, "דנה");
        assert_eq!(fetched.timezone, "Asia/Jerusalem");
        assert_eq!(fetched.default_event_duration_minutes, 60);
    }

    #[test]
    fn duplicate_phone_rejected() {
        let (_, svc) = service();
        let p = phone("+972541234567");
        svc.create(&p, "a", "h").unwrap();
        assert!(matches!(svc.create(&p, "b", "h"), Err(UserError::PhoneTaken)));
    }

    #[test]
    fn third_failure_locks_out() {
        let (_, svc) = service();
        let user = svc.create(&phone("+972541234567"), "a", "h").unwrap();
        let lockout = Duration::minutes(15);
        let (c1, l1) = svc.record_login_failure(&user.id, 3, lockout).unwrap();
        let (c2, l2) = svc.record_login_failure(&user.id, 3, lockout).unwrap();
        let (c3, l3) = svc.record_login_failure(&user.id, 3, lockout).unwrap();
        assert_eq!((c1, c2, c3), (1, 2, 3));
        assert!(l1.is_none() && l2.is_none());
        let until = l3.expect("lockout set");
        assert_eq!(until.to_rfc3339(), "2025-10-10T07:15:00+00:00");
        let stored = svc.get_by_id(&user.id).unwrap();
        assert_eq!(stored.lockout_until_utc, Some(until));
        assert_eq!(stored.failed_login_count, 0);
    }

    #[test]
    fn reset_clears_lockout() {
        let (_, svc) = service();
        let user = svc.create(&phone("+972541234567"), "a", "h").unwrap();
        for _ in 0..3 {
            svc.record_login_failure(&user.id, 3, Duration::minutes(15))
                .unwrap();
        }
        svc.reset_login_failures(&user.id).unwrap();
        let stored = svc.get_by_id(&user.id).unwrap();
        assert!(stored.lockout_until_utc.is_none());
        assert_eq!(stored.failed_login_count, 0);
    }

    #[test]
    fn morning_enabled_filter() {
        let (_, svc) = service();
        let a = svc.create(&phone("+972541111111"), "a", "h").unwrap();
        let _b = svc.create(&phone("+972542222222"), "b", "h").unwrap();
        let morning = MorningNotification {
            enabled: true,
            ..Default::default()
        };
        svc.set_morning_notification(&a.id, &morning).unwrap();
        let enabled = svc.list_morning_enabled().unwrap();
        assert_eq!(enabled.len(), 1);
        assert_eq!(enabled[0].id, a.id);
    }
}
