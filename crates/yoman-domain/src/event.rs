use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};
use uuid::Uuid;

use yoman_core::clock::Clock;
use yoman_core::config::EventPolicy;
use yoman_core::types::{new_row_id, UserId};
use yoman_hebrew::fuzzy;
use yoman_hebrew::RecurrenceRule;

use crate::db::{parse_ts, parse_ts_opt, Db};
use crate::error::{DomainError, Result};
use crate::types::{
    CommentPriority, Event, EventComment, EventParticipant, EventSource, ParticipantRole,
};

const TITLE_MAX_CHARS: usize = 500;

const EVENT_COLUMNS: &str = "id, user_id, title, start_ts_utc, end_ts_utc, location,
    source, recurrence_rule, notes, created_at, updated_at";

/// Input for event creation.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub user_id: UserId,
    pub title: String,
    pub start_ts_utc: DateTime<Utc>,
    pub end_ts_utc: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub source: EventSource,
    pub recurrence_rule: Option<String>,
}

/// Result of a create attempt: either the persisted event or the overlap
/// set awaiting the user's go-ahead.
#[derive(Debug, Clone)]
pub enum CreateOutcome {
    Created(Event),
    Conflict { overlaps: Vec<Event> },
}

/// Field patch for event updates. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub title: Option<String>,
    pub start_ts_utc: Option<DateTime<Utc>>,
    pub end_ts_utc: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub recurrence_rule: Option<String>,
}

/// Patch for a single event comment.
#[derive(Debug, Clone, Default)]
pub struct CommentPatch {
    pub text: Option<String>,
    pub priority: Option<CommentPriority>,
    pub tags: Option<Vec<String>>,
    /// Link to a reminder created for this comment.
    pub reminder_id: Option<String>,
}

/// Owner of the `events` and `event_participants` tables.
pub struct EventService {
    db: Db,
    clock: Arc<dyn Clock>,
    policy: EventPolicy,
}

impl EventService {
    pub fn new(db: Db, clock: Arc<dyn Clock>, policy: EventPolicy) -> Self {
        Self { db, clock, policy }
    }

    /// Validate and persist a new event.
    ///
    /// When overlapping events exist and `allow_overlap` is false, nothing
    /// is written and the overlaps are returned for a confirmation
    /// round-trip; the caller re-invokes with `allow_overlap = true` after
    /// the user agrees.
    pub fn create(&self, input: NewEvent, allow_overlap: bool) -> Result<CreateOutcome> {
        let title: String = input.title.trim().chars().take(TITLE_MAX_CHARS).collect();
        if title.is_empty() {
            return Err(DomainError::EmptyTitle);
        }
        if let Some(end) = input.end_ts_utc {
            if end < input.start_ts_utc {
                return Err(DomainError::EndBeforeStart);
            }
        }
        if let Some(rule) = &input.recurrence_rule {
            RecurrenceRule::parse(rule)
                .map_err(|e| DomainError::InvalidRecurrence(e.to_string()))?;
        }
        let now = self.clock.now_utc();
        if self.policy.reject_past
            && input.start_ts_utc < now - Duration::minutes(self.policy.past_grace_minutes)
        {
            return Err(DomainError::PastStart);
        }

        if !allow_overlap {
            let effective_end = input
                .end_ts_utc
                .unwrap_or(input.start_ts_utc + Duration::minutes(self.policy.default_duration_minutes));
            let overlaps =
                self.overlap_check(&input.user_id, input.start_ts_utc, effective_end)?;
            if !overlaps.is_empty() {
                return Ok(CreateOutcome::Conflict { overlaps });
            }
        }

        let id = new_row_id();
        {
            let db = self.db.lock().unwrap();
            db.execute(
                "INSERT INTO events
                 (id, user_id, title, start_ts_utc, end_ts_utc, location, source,
                  recurrence_rule, notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, '[]', ?9, ?9)",
                rusqlite::params![
                    id,
                    input.user_id.as_str(),
                    title,
                    input.start_ts_utc.to_rfc3339(),
                    input.end_ts_utc.map(|t| t.to_rfc3339()),
                    input.location,
                    input.source.as_str(),
                    input.recurrence_rule,
                    now.to_rfc3339(),
                ],
            )?;
        }
        info!(event_id = %id, user_id = %input.user_id, "event created");
        Ok(CreateOutcome::Created(self.get_by_id(&id, &input.user_id)?))
    }

    /// Fetch one event, enforcing ownership. A malformed id reads as
    /// `NotFound` — callers never see a parse error they could probe.
    pub fn get_by_id(&self, event_id: &str, user_id: &UserId) -> Result<Event> {
        if Uuid::parse_str(event_id).is_err() {
            return Err(DomainError::NotFound);
        }
        let db = self.db.lock().unwrap();
        match db.query_row(
            &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1 AND user_id = ?2"),
            rusqlite::params![event_id, user_id.as_str()],
            row_to_event,
        ) {
            Ok(e) => Ok(e),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(DomainError::NotFound),
            Err(e) => Err(DomainError::Database(e)),
        }
    }

    /// Events with `start_ts_utc >= now`, ascending.
    pub fn list_upcoming(&self, user_id: &UserId, limit: Option<usize>) -> Result<Vec<Event>> {
        let now = self.clock.now_utc().to_rfc3339();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_id = ?1 AND start_ts_utc >= ?2
             ORDER BY start_ts_utc ASC
             LIMIT ?3"
        ))?;
        let events = stmt
            .query_map(
                rusqlite::params![user_id.as_str(), now, limit.unwrap_or(100) as i64],
                row_to_event,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(events)
    }

    /// Events whose start falls in the half-open `[start, end)`, ascending.
    pub fn list_in_range(
        &self,
        user_id: &UserId,
        start_utc: DateTime<Utc>,
        end_utc: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_id = ?1 AND start_ts_utc >= ?2 AND start_ts_utc < ?3
             ORDER BY start_ts_utc ASC"
        ))?;
        let events = stmt
            .query_map(
                rusqlite::params![user_id.as_str(), start_utc.to_rfc3339(), end_utc.to_rfc3339()],
                row_to_event,
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(events)
    }

    /// Convenience: all events of one local calendar day.
    pub fn list_for_day(&self, user_id: &UserId, date: NaiveDate, zone: Tz) -> Result<Vec<Event>> {
        let start = yoman_core::clock::local_midnight_utc(date, zone);
        let end = yoman_core::clock::local_midnight_utc(date + Duration::days(1), zone);
        self.list_in_range(user_id, start, end)
    }

    /// Events happening on the given local day, including instances of
    /// recurring events whose expansion lands in it. Recurring instances
    /// carry the occurrence as their start. Used for the morning summary;
    /// the plain range listings stay strictly row-based.
    pub fn occurrences_for_day(
        &self,
        user_id: &UserId,
        date: NaiveDate,
        zone: Tz,
    ) -> Result<Vec<Event>> {
        let mut events = self.list_for_day(user_id, date, zone)?;
        let start = yoman_core::clock::local_midnight_utc(date, zone);
        let end = yoman_core::clock::local_midnight_utc(date + Duration::days(1), zone);

        // Recurring events anchored before the window; ones anchored inside
        // it are already in the row listing.
        let recurring: Vec<Event> = {
            let db = self.db.lock().unwrap();
            let mut stmt = db.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE user_id = ?1 AND recurrence_rule IS NOT NULL
                   AND start_ts_utc < ?2"
            ))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![user_id.as_str(), start.to_rfc3339()],
                    row_to_event,
                )?
                .filter_map(|r| r.ok())
                .collect();
            rows
        };

        for event in recurring {
            let Some(rule) = event
                .recurrence_rule
                .as_deref()
                .and_then(|r| RecurrenceRule::parse(r).ok())
            else {
                continue;
            };
            for occurrence in rule.expand_between(event.start_ts_utc, start, end, zone) {
                let mut instance = event.clone();
                instance.start_ts_utc = occurrence;
                instance.end_ts_utc = None;
                events.push(instance);
            }
        }
        events.sort_by_key(|e| e.start_ts_utc);
        Ok(events)
    }

    /// Sunday–Saturday week (user zone) containing `date`.
    pub fn list_for_week(&self, user_id: &UserId, date: NaiveDate, zone: Tz) -> Result<Vec<Event>> {
        use chrono::Datelike;
        let sunday = date - Duration::days(date.weekday().num_days_from_sunday() as i64);
        let start = yoman_core::clock::local_midnight_utc(sunday, zone);
        let end = yoman_core::clock::local_midnight_utc(sunday + Duration::days(7), zone);
        self.list_in_range(user_id, start, end)
    }

    /// Fuzzy-search titles (and locations) above the search threshold,
    /// best score first.
    pub fn search(&self, user_id: &UserId, query: &str) -> Result<Vec<(Event, f64)>> {
        let events = self.list_all(user_id)?;
        let mut scored: Vec<(Event, f64)> = events
            .into_iter()
            .map(|e| {
                let title_score = fuzzy::score(query, &e.title);
                let location_score = e
                    .location
                    .as_deref()
                    .map(|l| fuzzy::score(query, l))
                    .unwrap_or(0.0);
                let s = title_score.max(location_score);
                (e, s)
            })
            .filter(|(_, s)| *s >= fuzzy::SEARCH_THRESHOLD)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        Ok(scored)
    }

    /// Apply a field patch. Returns the updated event; `start` changes are
    /// the caller's cue to reschedule derived reminders.
    pub fn update(&self, event_id: &str, user_id: &UserId, patch: EventPatch) -> Result<Event> {
        let mut event = self.get_by_id(event_id, user_id)?;

        if let Some(title) = patch.title {
            let title: String = title.trim().chars().take(TITLE_MAX_CHARS).collect();
            if title.is_empty() {
                return Err(DomainError::EmptyTitle);
            }
            event.title = title;
        }
        if let Some(start) = patch.start_ts_utc {
            event.start_ts_utc = start;
        }
        if let Some(end) = patch.end_ts_utc {
            event.end_ts_utc = Some(end);
        }
        if let Some(end) = event.end_ts_utc {
            if end < event.start_ts_utc {
                return Err(DomainError::EndBeforeStart);
            }
        }
        if let Some(location) = patch.location {
            event.location = Some(location);
        }
        if let Some(rule) = patch.recurrence_rule {
            RecurrenceRule::parse(&rule)
                .map_err(|e| DomainError::InvalidRecurrence(e.to_string()))?;
            event.recurrence_rule = Some(rule);
        }

        let now = self.clock.now_utc();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE events SET title = ?3, start_ts_utc = ?4, end_ts_utc = ?5,
                    location = ?6, recurrence_rule = ?7, updated_at = ?8
             WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![
                event_id,
                user_id.as_str(),
                event.title,
                event.start_ts_utc.to_rfc3339(),
                event.end_ts_utc.map(|t| t.to_rfc3339()),
                event.location,
                event.recurrence_rule,
                now.to_rfc3339(),
            ],
        )?;
        if changed == 0 {
            return Err(DomainError::NotFound);
        }
        event.updated_at = now;
        Ok(event)
    }

    /// Delete an event (participants cascade). Unauthorized attempts are
    /// logged as warnings and reported as `NotFound`.
    pub fn delete(&self, event_id: &str, user_id: &UserId) -> Result<()> {
        if Uuid::parse_str(event_id).is_err() {
            return Err(DomainError::NotFound);
        }
        let db = self.db.lock().unwrap();
        let deleted = db.execute(
            "DELETE FROM events WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![event_id, user_id.as_str()],
        )?;
        if deleted == 0 {
            warn!(event_id, user_id = %user_id, "delete refused: no owned row");
            return Err(DomainError::NotFound);
        }
        info!(event_id, user_id = %user_id, "event deleted");
        Ok(())
    }

    /// Events of `user_id` intersecting `[start, end)`. An event with no
    /// explicit end is treated as running for the default duration.
    pub fn overlap_check(
        &self,
        user_id: &UserId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        // Candidate window: default-duration events starting up to a day
        // before `end`, plus anything whose explicit end reaches past
        // `start`. The exact intersection runs in memory over COALESCEd
        // end times.
        let window_start = (start - Duration::days(1)).to_rfc3339();
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_id = ?1 AND start_ts_utc < ?3
               AND ((end_ts_utc IS NULL AND start_ts_utc >= ?2) OR end_ts_utc > ?4)
             ORDER BY start_ts_utc ASC"
        ))?;
        let candidates: Vec<Event> = stmt
            .query_map(
                rusqlite::params![
                    user_id.as_str(),
                    window_start,
                    end.to_rfc3339(),
                    start.to_rfc3339()
                ],
                row_to_event,
            )?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);
        drop(db);

        let default = Duration::minutes(self.policy.default_duration_minutes);
        Ok(candidates
            .into_iter()
            .filter(|e| {
                let effective_end = e.end_ts_utc.unwrap_or(e.start_ts_utc + default);
                e.start_ts_utc < end && effective_end > start
            })
            .collect())
    }

    // --- comments ----------------------------------------------------------

    /// Append a comment to the event's notes array.
    pub fn add_comment(
        &self,
        event_id: &str,
        user_id: &UserId,
        text: &str,
        priority: Option<CommentPriority>,
        tags: Vec<String>,
    ) -> Result<EventComment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(DomainError::InvalidArgument("empty comment".to_string()));
        }
        let mut event = self.get_by_id(event_id, user_id)?;
        let comment = EventComment {
            id: new_row_id(),
            text: text.to_string(),
            timestamp_utc: self.clock.now_utc(),
            priority: priority.unwrap_or_default(),
            tags,
            reminder_id: None,
        };
        event.notes.push(comment.clone());
        self.write_notes(event_id, user_id, &event.notes)?;
        Ok(comment)
    }

    /// Delete by 1-based position in the notes array.
    pub fn delete_comment_by_index(
        &self,
        event_id: &str,
        user_id: &UserId,
        index_1based: usize,
    ) -> Result<EventComment> {
        let mut event = self.get_by_id(event_id, user_id)?;
        if index_1based == 0 || index_1based > event.notes.len() {
            return Err(DomainError::NotFound);
        }
        let removed = event.notes.remove(index_1based - 1);
        self.write_notes(event_id, user_id, &event.notes)?;
        Ok(removed)
    }

    pub fn delete_last_comment(&self, event_id: &str, user_id: &UserId) -> Result<EventComment> {
        let mut event = self.get_by_id(event_id, user_id)?;
        let removed = event.notes.pop().ok_or(DomainError::NotFound)?;
        self.write_notes(event_id, user_id, &event.notes)?;
        Ok(removed)
    }

    /// Delete the comment fuzzy-matching `partial_text`. A tie between
    /// comments is rejected rather than guessed.
    pub fn delete_comment_by_text(
        &self,
        event_id: &str,
        user_id: &UserId,
        partial_text: &str,
    ) -> Result<EventComment> {
        let mut event = self.get_by_id(event_id, user_id)?;
        let texts: Vec<String> = event.notes.iter().map(|c| c.text.clone()).collect();
        let ranked = fuzzy::rank(partial_text, &texts, fuzzy::DESTRUCTIVE_THRESHOLD);
        match ranked.len() {
            0 => Err(DomainError::NotFound),
            1 => {
                let removed = event.notes.remove(ranked[0].index);
                self.write_notes(event_id, user_id, &event.notes)?;
                Ok(removed)
            }
            _ if ranked[0].score - ranked[1].score >= fuzzy::CLEAR_LEAD => {
                let removed = event.notes.remove(ranked[0].index);
                self.write_notes(event_id, user_id, &event.notes)?;
                Ok(removed)
            }
            _ => Err(DomainError::Ambiguous {
                options: ranked
                    .iter()
                    .take(3)
                    .map(|m| texts[m.index].clone())
                    .collect(),
            }),
        }
    }

    pub fn update_comment(
        &self,
        event_id: &str,
        user_id: &UserId,
        comment_id: &str,
        patch: CommentPatch,
    ) -> Result<EventComment> {
        let mut event = self.get_by_id(event_id, user_id)?;
        let comment = event
            .notes
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or(DomainError::NotFound)?;
        if let Some(text) = patch.text {
            comment.text = text;
        }
        if let Some(priority) = patch.priority {
            comment.priority = priority;
        }
        if let Some(tags) = patch.tags {
            comment.tags = tags;
        }
        if let Some(reminder_id) = patch.reminder_id {
            comment.reminder_id = Some(reminder_id);
        }
        let updated = comment.clone();
        self.write_notes(event_id, user_id, &event.notes)?;
        Ok(updated)
    }

    fn write_notes(&self, event_id: &str, user_id: &UserId, notes: &[EventComment]) -> Result<()> {
        let raw = serde_json::to_string(notes)?;
        let now = self.clock.now_utc().to_rfc3339();
        let db = self.db.lock().unwrap();
        let changed = db.execute(
            "UPDATE events SET notes = ?3, updated_at = ?4
             WHERE id = ?1 AND user_id = ?2",
            rusqlite::params![event_id, user_id.as_str(), raw, now],
        )?;
        if changed == 0 {
            return Err(DomainError::NotFound);
        }
        Ok(())
    }

    // --- participants ------------------------------------------------------

    /// Attach a participant; duplicates per `(event_id, name)` are ignored.
    pub fn add_participant(
        &self,
        event_id: &str,
        user_id: &UserId,
        name: &str,
        role: ParticipantRole,
        phone: Option<&str>,
    ) -> Result<()> {
        // Ownership check via the event fetch.
        self.get_by_id(event_id, user_id)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT OR IGNORE INTO event_participants (id, event_id, name, role, phone)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![new_row_id(), event_id, name, role.as_str(), phone],
        )?;
        Ok(())
    }

    pub fn list_participants(
        &self,
        event_id: &str,
        user_id: &UserId,
    ) -> Result<Vec<EventParticipant>> {
        self.get_by_id(event_id, user_id)?;
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, event_id, name, role, phone FROM event_participants
             WHERE event_id = ?1 ORDER BY name",
        )?;
        let participants = stmt
            .query_map(rusqlite::params![event_id], |row| {
                let role: String = row.get(3)?;
                Ok(EventParticipant {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    name: row.get(2)?,
                    role: if role == "companion" {
                        ParticipantRole::Companion
                    } else {
                        ParticipantRole::Primary
                    },
                    phone: row.get(4)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(participants)
    }

    fn list_all(&self, user_id: &UserId) -> Result<Vec<Event>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE user_id = ?1
             ORDER BY start_ts_utc ASC"
        ))?;
        let events = stmt
            .query_map(rusqlite::params![user_id.as_str()], row_to_event)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(events)
    }
}

/// Map a SELECT row (EVENT_COLUMNS order) to an Event.
fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    use std::str::FromStr;
    let notes: Vec<EventComment> =
        serde_json::from_str(&row.get::<_, String>(8)?).unwrap_or_default();
    let source = EventSource::from_str(&row.get::<_, String>(6)?).unwrap_or_default();
    Ok(Event {
        id: row.get(0)?,
        user_id: UserId::from(row.get::<_, String>(1)?),
        title: row.get(2)?,
        start_ts_utc: parse_ts(&row.get::<_, String>(3)?),
        end_ts_utc: parse_ts_opt(row.get(4)?),
        location: row.get(5)?,
        source,
        recurrence_rule: row.get(7)?,
        notes,
        created_at: parse_ts(&row.get::<_, String>(9)?),
        updated_at: parse_ts(&row.get::<_, String>(10)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_shared;
    use rusqlite::Connection;
    use yoman_core::clock::FixedClock;

    fn service() -> (Arc<FixedClock>, EventService) {
        let clock = Arc::new(FixedClock::new("2025-10-10T07:00:00Z".parse().unwrap()));
        let db = open_shared(Connection::open_in_memory().unwrap()).unwrap();
        let svc = EventService::new(db, clock.clone(), EventPolicy::default());
        (clock, svc)
    }

    fn uid() -> UserId {
        UserId::from("u-owner")
    }

    fn new_event(title: &str, start: &str) -> NewEvent {
        NewEvent {
            user_id: uid(),
            title: title.to_string(),
            start_ts_utc: start.parse().unwrap(),
            end_ts_utc: None,
            location: None,
            source: EventSource::Nlp,
            recurrence_rule: None,
        }
    }

    fn created(svc: &EventService, title: &str, start: &str) -> Event {
        match svc.create(new_event(title, start), false).unwrap() {
            CreateOutcome::Created(e) => e,
            CreateOutcome::Conflict { .. } => panic!("unexpected conflict"),
        }
    }

    #[test]
    fn create_sets_empty_notes_array() {
        let (_, svc) = service();
        let e = created(&svc, "פגישה עם דני", "2025-10-11T12:00:00Z");
        assert!(e.notes.is_empty());
        assert_eq!(e.title, "פגישה עם דני");
    }

    #[test]
    fn empty_title_rejected() {
        let (_, svc) = service();
        let result = svc.create(new_event("   ", "2025-10-11T12:00:00Z"), false);
        assert!(matches!(result, Err(DomainError::EmptyTitle)));
    }

    #[test]
    fn long_title_truncated_to_500_chars() {
        let (_, svc) = service();
        let long = "א".repeat(600);
        let e = created(&svc, &long, "2025-10-11T12:00:00Z");
        assert_eq!(e.title.chars().count(), 500);
    }

    #[test]
    fn past_start_rejected() {
        let (_, svc) = service();
        let result = svc.create(new_event("ישן", "2025-10-09T12:00:00Z"), false);
        assert!(matches!(result, Err(DomainError::PastStart)));
    }

    #[test]
    fn just_now_within_grace_accepted() {
        let (_, svc) = service();
        // 3 minutes ago, inside the 5-minute grace window.
        let e = created(&svc, "עכשיו", "2025-10-10T06:57:00Z");
        assert_eq!(e.title, "עכשיו");
    }

    #[test]
    fn end_before_start_rejected() {
        let (_, svc) = service();
        let mut input = new_event("הפוך", "2025-10-11T12:00:00Z");
        input.end_ts_utc = Some("2025-10-11T11:00:00Z".parse().unwrap());
        assert!(matches!(
            svc.create(input, false),
            Err(DomainError::EndBeforeStart)
        ));
    }

    #[test]
    fn overlap_returns_conflict_then_allows_on_confirm() {
        let (_, svc) = service();
        created(&svc, "קיים", "2025-10-11T12:00:00Z");
        let outcome = svc
            .create(new_event("חדש", "2025-10-11T12:30:00Z"), false)
            .unwrap();
        let CreateOutcome::Conflict { overlaps } = outcome else {
            panic!("expected conflict");
        };
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].title, "קיים");

        // User confirms: persist regardless.
        let outcome = svc
            .create(new_event("חדש", "2025-10-11T12:30:00Z"), true)
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));
    }

    #[test]
    fn adjacent_events_do_not_conflict() {
        let (_, svc) = service();
        created(&svc, "ראשון", "2025-10-11T12:00:00Z");
        // Starts exactly when the default 60-minute duration ends.
        let outcome = svc
            .create(new_event("שני", "2025-10-11T13:00:00Z"), false)
            .unwrap();
        assert!(matches!(outcome, CreateOutcome::Created(_)));
    }

    #[test]
    fn malformed_uuid_is_not_found() {
        let (_, svc) = service();
        assert!(matches!(
            svc.get_by_id("not-a-uuid", &uid()),
            Err(DomainError::NotFound)
        ));
    }

    #[test]
    fn foreign_event_reads_as_not_found() {
        let (_, svc) = service();
        let e = created(&svc, "שלי", "2025-10-11T12:00:00Z");
        let other = UserId::from("u-other");
        assert!(matches!(
            svc.get_by_id(&e.id, &other),
            Err(DomainError::NotFound)
        ));
        assert!(matches!(svc.delete(&e.id, &other), Err(DomainError::NotFound)));
        // Still there for the owner.
        assert!(svc.get_by_id(&e.id, &uid()).is_ok());
    }

    #[test]
    fn range_boundaries_are_half_open() {
        let (_, svc) = service();
        let s: DateTime<Utc> = "2025-10-11T00:00:00Z".parse().unwrap();
        let e: DateTime<Utc> = "2025-10-12T00:00:00Z".parse().unwrap();
        created(&svc, "בתחילה", "2025-10-11T00:00:00Z");
        created(&svc, "בסוף", "2025-10-12T00:00:00Z");
        let in_range = svc.list_in_range(&uid(), s, e).unwrap();
        assert_eq!(in_range.len(), 1);
        assert_eq!(in_range[0].title, "בתחילה");
    }

    #[test]
    fn week_listing_equals_sunday_anchored_range() {
        let (_, svc) = service();
        let zone = chrono_tz::Asia::Jerusalem;
        // Sunday Oct 5 .. Saturday Oct 11 local week around Friday Oct 10.
        created(&svc, "בתוך השבוע", "2025-10-10T12:00:00Z");
        created(&svc, "שבוע הבא", "2025-10-12T12:00:00Z"); // Sunday Oct 12 local

        let date = NaiveDate::from_ymd_opt(2025, 10, 10).unwrap();
        let week = svc.list_for_week(&uid(), date, zone).unwrap();
        assert_eq!(week.len(), 1);
        assert_eq!(week[0].title, "בתוך השבוע");

        let sunday = NaiveDate::from_ymd_opt(2025, 10, 5).unwrap();
        let range = svc
            .list_in_range(
                &uid(),
                yoman_core::clock::local_midnight_utc(sunday, zone),
                yoman_core::clock::local_midnight_utc(sunday + Duration::days(7), zone),
            )
            .unwrap();
        assert_eq!(
            week.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            range.iter().map(|e| e.id.clone()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn double_delete_is_not_found() {
        let (_, svc) = service();
        let e = created(&svc, "חולף", "2025-10-11T12:00:00Z");
        svc.delete(&e.id, &uid()).unwrap();
        assert!(matches!(svc.delete(&e.id, &uid()), Err(DomainError::NotFound)));
    }

    #[test]
    fn search_ranks_by_score() {
        let (_, svc) = service();
        created(&svc, "פגישה עם דני", "2025-10-11T12:00:00Z");
        created(&svc, "חדר כושר", "2025-10-11T15:00:00Z");
        let results = svc.search(&uid(), "פגישה").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.title, "פגישה עם דני");
        assert!(results[0].1 >= 0.45);
    }

    #[test]
    fn comment_lifecycle() {
        let (_, svc) = service();
        let e = created(&svc, "אירוע", "2025-10-11T12:00:00Z");
        svc.add_comment(&e.id, &uid(), "להביא מסמכים", None, vec![]).unwrap();
        svc.add_comment(
            &e.id,
            &uid(),
            "לחנות בחניון",
            Some(CommentPriority::High),
            vec!["חניה".to_string()],
        )
        .unwrap();

        let loaded = svc.get_by_id(&e.id, &uid()).unwrap();
        assert_eq!(loaded.notes.len(), 2);
        assert_eq!(loaded.notes[1].priority, CommentPriority::High);

        let removed = svc.delete_comment_by_index(&e.id, &uid(), 1).unwrap();
        assert_eq!(removed.text, "להביא מסמכים");

        let removed = svc.delete_last_comment(&e.id, &uid()).unwrap();
        assert_eq!(removed.text, "לחנות בחניון");
        assert!(svc.delete_last_comment(&e.id, &uid()).is_err());
    }

    #[test]
    fn comment_delete_by_text_rejects_ambiguity() {
        let (_, svc) = service();
        let e = created(&svc, "אירוע", "2025-10-11T12:00:00Z");
        svc.add_comment(&e.id, &uid(), "להביא מתנה", None, vec![]).unwrap();
        svc.add_comment(&e.id, &uid(), "להביא מתנה", None, vec![]).unwrap();
        let result = svc.delete_comment_by_text(&e.id, &uid(), "להביא מתנה");
        assert!(matches!(result, Err(DomainError::Ambiguous { .. })));

        // Unambiguous partial match works.
        svc.add_comment(&e.id, &uid(), "לשריין חניה", None, vec![]).unwrap();
        let removed = svc.delete_comment_by_text(&e.id, &uid(), "חניה").unwrap();
        assert_eq!(removed.text, "לשריין חניה");
    }

    #[test]
    fn update_comment_patch() {
        let (_, svc) = service();
        let e = created(&svc, "אירוע", "2025-10-11T12:00:00Z");
        let c = svc.add_comment(&e.id, &uid(), "טיוטה", None, vec![]).unwrap();
        let updated = svc
            .update_comment(
                &e.id,
                &uid(),
                &c.id,
                CommentPatch {
                    text: Some("סופי".to_string()),
                    priority: Some(CommentPriority::Urgent),
                    tags: None,
                    reminder_id: None,
                },
            )
            .unwrap();
        assert_eq!(updated.text, "סופי");
        assert_eq!(updated.priority, CommentPriority::Urgent);
    }

    #[test]
    fn participants_unique_per_name() {
        let (_, svc) = service();
        let e = created(&svc, "אירוע", "2025-10-11T12:00:00Z");
        svc.add_participant(&e.id, &uid(), "דני", ParticipantRole::Companion, None)
            .unwrap();
        svc.add_participant(&e.id, &uid(), "דני", ParticipantRole::Companion, None)
            .unwrap();
        let list = svc.list_participants(&e.id, &uid()).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn occurrences_for_day_expands_recurring_events() {
        let (_, svc) = service();
        let zone = chrono_tz::Asia::Jerusalem;
        // Daily standup anchored Friday Oct 10 11:00 local.
        let mut input = new_event("דייה יומית", "2025-10-10T08:00:00Z");
        input.recurrence_rule = Some("FREQ=DAILY".to_string());
        svc.create(input, true).unwrap();
        created(&svc, "חד פעמי", "2025-10-14T10:00:00Z");

        // Tuesday Oct 14: the one-off plus the daily instance.
        let date = NaiveDate::from_ymd_opt(2025, 10, 14).unwrap();
        let day = svc.occurrences_for_day(&uid(), date, zone).unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].title, "דייה יומית");
        assert_eq!(
            day[0].start_ts_utc.to_rfc3339(),
            "2025-10-14T08:00:00+00:00"
        );

        // A strict row listing for the same day sees only the one-off.
        let rows = svc.list_for_day(&uid(), date, zone).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn update_start_moves_event() {
        let (_, svc) = service();
        let e = created(&svc, "נדחה", "2025-10-11T12:00:00Z");
        let updated = svc
            .update(
                &e.id,
                &uid(),
                EventPatch {
                    start_ts_utc: Some("2025-10-12T09:00:00Z".parse().unwrap()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.start_ts_utc.to_rfc3339(), "2025-10-12T09:00:00+00:00");
    }
}
