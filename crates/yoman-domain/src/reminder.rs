use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};
use uuid::Uuid;

use yoman_core::clock::Clock;
use yoman_core::types::{new_row_id, UserId};
use yoman_hebrew::RecurrenceRule;

use crate::db::{parse_ts, parse_ts_opt, Db};
use crate::error::{DomainError, Result};
use crate::types::{Reminder, ReminderStatus};

const REMINDER_COLUMNS: &str = "id, user_id, title, reminder_ts_utc, recurrence_rule,
    lead_time_minutes, event_id, status, last_fired_ts_utc, created_at, updated_at";

/// Input for reminder creation.
#[derive(Debug, Clone)]
pub struct NewReminder {
    pub user_id: UserId,
    pub title: String,
    pub reminder_ts_utc: DateTime<Utc>,
    pub recurrence_rule: Option<String>,
    /// Present only when the reminder was derived from an event.
    pub lead_time_minutes: Option<i64>,
    pub event_id: Option<String>,
}

/// Field patch for reminder updates. A `time`-only patch keeps the date
/// portion and recomputes UTC in the user zone.
#[derive(Debug, Clone, Default)]
pub struct ReminderPatch {
    pub title: Option<String>,
    pub reminder_ts_utc: Option<DateTime<Utc>>,
    pub time: Option<NaiveTime>,
    pub recurrence_rule: Option<String>,
    pub status: Option<ReminderStatus>,
}

/// Result of the at-most-once fire attempt for one occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum FireOutcome {
    /// This worker won the compare-and-set and must deliver.
    /// For recurring reminders, the next occurrence to schedule.
    Won { next_occurrence: Option<DateTime<Utc>> },
    /// Another worker already advanced past this occurrence.
    AlreadyFired,
}

/// Owner of the `reminders` table.
pub struct ReminderService {
    db: Db,
    clock: Arc<dyn Clock>,
}

impl ReminderService {
    pub fn new(db: Db, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn create(&self, input: NewReminder) -> Result<Reminder> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(DomainError::EmptyTitle);
        }
        if let Some(rule) = &input.recurrence_rule {
            RecurrenceRule::parse(rule)
                .map_err(|e| DomainError::InvalidRecurrence(e.to_string()))?;
        }

        let now = self.clock.now_utc();
        let id = new_row_id();
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO reminders
                 (id, user_id, title, reminder_ts_utc, recurrence_rule,
                  lead_time_minutes, event_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'active', ?8, ?8)",
                rusqlite::params![
                    id,
                    input.user_id.as_str(),
                    title,
                    input.reminder_ts_utc.to_rfc3339(),
                    input.recurrence_rule,
                    input.lead_time_minutes,
                    input.event_id,
                    now.to_rfc3339(),
                ],
            )?;
        }
        info!(reminder_id = %id, user_id = %input.user_id, at = %input.reminder_ts_utc, "reminder created");
        self.get_by_id(&id, &input.user_id)
    }

    pub fn get_by_id(&self, reminder_id: &str, user_id: &UserId) -> Result<Reminder> {
        if Uuid::parse_str(reminder_id).is_err() {
            return Err(DomainError::NotFound);
        }
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1 AND user_id = ?2"),
            rusqlite::params![reminder_id, user_id.as_str()],
            row_to_reminder,
        ) {
            Ok(r) => Ok(r),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(DomainError::NotFound),
            Err(e) => Err(DomainError::Database(e)),
        }
    }

    /// Active reminders, soonest first.
    pub fn list(&self, user_id: &UserId) -> Result<Vec<Reminder>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE user_id = ?1 AND status = 'active'
             ORDER BY reminder_ts_utc ASC"
        ))?;
        let reminders = stmt
            .query_map(rusqlite::params![user_id.as_str()], row_to_reminder)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(reminders)
    }

    /// Apply a patch. Recurring updates apply to all future occurrences
    /// (there is only one row; the stored instant is the next occurrence).
    pub fn update(
        &self,
        reminder_id: &str,
        user_id: &UserId,
        patch: ReminderPatch,
        zone: Tz,
    ) -> Result<Reminder> {
        let mut reminder = self.get_by_id(reminder_id, user_id)?;

        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(DomainError::EmptyTitle);
            }
            reminder.title = title;
        }
        if let Some(at) = patch.reminder_ts_utc {
            reminder.reminder_ts_utc = at;
        } else if let Some(time) = patch.time {
            // Time-only: keep the local date, swap the clock time.
            let local = reminder.reminder_ts_utc.with_timezone(&zone);
            let naive = local.date_naive().and_time(time);
            reminder.reminder_ts_utc = zone
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| {
                    DomainError::InvalidArgument(format!("unmappable local time {naive}"))
                })?;
        }
        if let Some(rule) = patch.recurrence_rule {
            RecurrenceRule::parse(&rule)
                .map_err(|e| DomainError::InvalidRecurrence(e.to_string()))?;
            reminder.recurrence_rule = Some(rule);
        }
        if let Some(status) = patch.status {
            reminder.status = status;
        }

        let now = self.clock.now_utc();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE reminders SET title = ?3, reminder_ts_utc = ?4, recurrence_rule = ?5,
                    status = ?6, updated_at = ?7
             WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![
                reminder_id,
                user_id.as_str(),
                reminder.title,
                reminder.reminder_ts_utc.to_rfc3339(),
                reminder.recurrence_rule,
                reminder.status.as_str(),
                now.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(DomainError::NotFound);
        }
        reminder.updated_at = now;
        Ok(reminder)
    }

    /// Cancel a reminder (all future occurrences).
    pub fn delete(&self, reminder_id: &str, user_id: &UserId) -> Result<()> {
        if Uuid::parse_str(reminder_id).is_err() {
            return Err(DomainError::NotFound);
        }
        let now = self.clock.now_utc().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE reminders SET status = 'cancelled', updated_at = ?3
             WHERE id = ?1 AND user_id = ?2 AND status = 'active'",
            rusqlite::params![reminder_id, user_id.as_str(), now],
        )?;
        if changed == 0 {
            return Err(DomainError::NotFound);
        }
        info!(reminder_id, user_id = %user_id, "reminder cancelled");
        Ok(())
    }

    /// Cancel every active reminder derived from `event_id`. Returns the
    /// cancelled reminder ids so pending delivery jobs can be removed.
    pub fn cancel_for_event(&self, event_id: &str, user_id: &UserId) -> Result<Vec<String>> {
        let now = self.clock.now_utc().to_rfc3339();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id FROM reminders
             WHERE event_id = ?1 AND user_id = ?2 AND status = 'active'",
        )?;
        let ids: Vec<String> = stmt
            .query_map(rusqlite::params![event_id, user_id.as_str()], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        for id in &ids {
            db.execute(
                "UPDATE reminders SET status = 'cancelled', updated_at = ?2 WHERE id = ?1",
                rusqlite::params![id, now],
            )?;
        }
        Ok(ids)
    }

    /// Reschedule derived reminders after their event's start moved.
    /// Returns `(reminder_id, old_occurrence, new_occurrence)` triples so
    /// the caller can requeue delivery jobs.
    pub fn reschedule_for_event(
        &self,
        event_id: &str,
        user_id: &UserId,
        new_event_start: DateTime<Utc>,
    ) -> Result<Vec<(String, DateTime<Utc>, DateTime<Utc>)>> {
        let now = self.clock.now_utc().to_rfc3339();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders
             WHERE event_id = ?1 AND user_id = ?2 AND status = 'active'"
        ))?;
        let derived: Vec<Reminder> = stmt
            .query_map(rusqlite::params![event_id, user_id.as_str()], row_to_reminder)?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        let mut moved = Vec::new();
        for reminder in derived {
            let Some(lead) = reminder.lead_time_minutes else {
                continue;
            };
            let new_at = new_event_start - chrono::Duration::minutes(lead);
            db.execute(
                "UPDATE reminders SET reminder_ts_utc = ?2, updated_at = ?3 WHERE id = ?1",
                rusqlite::params![reminder.id, new_at.to_rfc3339(), now],
            )?;
            moved.push((reminder.id, reminder.reminder_ts_utc, new_at));
        }
        Ok(moved)
    }

    /// At-most-once fire marker for one occurrence.
    ///
    /// Compare-and-set: the update only succeeds while the row is active,
    /// its stored next occurrence equals `occurrence_utc`, and no newer
    /// fire was recorded. Exactly one of any number of concurrent workers
    /// observes `Won`; everyone else gets `AlreadyFired`.
    pub fn mark_fired(
        &self,
        reminder_id: &str,
        occurrence_utc: DateTime<Utc>,
        zone: Tz,
    ) -> Result<FireOutcome> {
        let occ = occurrence_utc.to_rfc3339();
        let now = self.clock.now_utc().to_rfc3339();

        let db = self.db.lock().unwrap();
        let won = db.execute(
            "UPDATE reminders SET last_fired_ts_utc = ?2, updated_at = ?3
             WHERE id = ?1 AND status = 'active'
               AND reminder_ts_utc = ?2
               AND (last_fired_ts_utc IS NULL OR last_fired_ts_utc < ?2)",
            rusqlite::params![reminder_id, occ, now],
        )?;
        if won == 0 {
            debug!(reminder_id, occurrence = %occ, "fire lost compare-and-set");
            return Ok(FireOutcome::AlreadyFired);
        }

        // Advance recurring reminders; close out one-shots.
        let rule: Option<String> = db.query_row(
            "SELECT recurrence_rule FROM reminders WHERE id = ?1",
            rusqlite::params![reminder_id],
            |row| row.get(0),
        )?;
        let next = rule
            .as_deref()
            .and_then(|r| RecurrenceRule::parse(r).ok())
            .and_then(|r| r.next_after(occurrence_utc, occurrence_utc, zone));

        match next {
            Some(next_at) => {
                db.execute(
                    "UPDATE reminders SET reminder_ts_utc = ?2, updated_at = ?3 WHERE id = ?1",
                    rusqlite::params![reminder_id, next_at.to_rfc3339(), now],
                )?;
                Ok(FireOutcome::Won {
                    next_occurrence: Some(next_at),
                })
            }
            None => {
                db.execute(
                    "UPDATE reminders SET status = 'done', updated_at = ?2 WHERE id = ?1",
                    rusqlite::params![reminder_id, now],
                )?;
                Ok(FireOutcome::Won {
                    next_occurrence: None,
                })
            }
        }
    }
}

/// Map a SELECT row (REMINDER_COLUMNS order) to a Reminder.
fn row_to_reminder(row: &rusqlite::Row<'_>) -> rusqlite::Result<Reminder> {
    use std::str::FromStr;
    let status = ReminderStatus::from_str(&row.get::<_, String>(7)?).unwrap_or_default();
    Ok(Reminder {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        title: row.get(2)?,
        reminder_ts_utc: parse_ts(&row.get::<_, String>(3)?),
        recurrence_rule: row.get(4)?,
        lead_time_minutes: row.get(5)?,
        event_id: row.get(6)?,
        status,
        last_fired_ts_utc: parse_ts_opt(row.get(8)?),
        created_at: parse_ts(&row.get::<_, String>(9)?),
        updated_at: parse_ts(&row.get::<_, String>(10)?),
    })
}
