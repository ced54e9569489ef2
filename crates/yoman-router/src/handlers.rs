//! NLU dispatch and per-intent domain handlers.

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use yoman_core::clock::format_local;
use yoman_core::message::{InboundMessage, Reply};
use yoman_domain::{
    CommentPriority, CreateOutcome, Event, EventSource, NewEvent, NewReminder, ParticipantRole,
    Reminder,
};
use yoman_hebrew::{fuzzy, parse_date_query, parse_lead_time, RecurrenceRule};
use yoman_nlu::prompt::ClassifyContext;
use yoman_nlu::{Intent, NluResult};
use yoman_scheduler::JobKind;
use yoman_sessions::{ConvState, Session};
use yoman_users::User;

use crate::pipeline::{PhaseError, PhaseResult, Router};
use crate::{render, replies};

/// Classify the message and route the winning intent.
pub(crate) async fn dispatch_nlu(
    router: &Router,
    user: &User,
    session: &mut Session,
    msg: &InboundMessage,
) -> PhaseResult {
    // History excludes the turn being classified (it was just pushed).
    let prior = session.recent.len().saturating_sub(1);
    let history: Vec<(String, String)> = session.recent[..prior]
        .iter()
        .rev()
        .take(3)
        .rev()
        .map(|t| {
            let role = match t.role {
                yoman_sessions::TurnRole::User => "user",
                yoman_sessions::TurnRole::Assistant => "assistant",
            };
            (role.to_string(), t.text.clone())
        })
        .collect();

    let ctx = ClassifyContext {
        now_utc: router.clock().now_utc(),
        zone: user.zone(),
        history,
        contacts: router
            .contacts()
            .names(&user.id)
            .map_err(|e| PhaseError::new("nlu", Some(&user.id), e))?,
    };
    let result = router.deps.nlu.classify(&user.id, &msg.text, &ctx).await;
    route_intent(router, user, session, msg, result, false).await
}

/// Execute a classified intent, applying the confidence gates.
///
/// `user_confirmed` is set when the user already picked this intent in
/// the clarification flow — the gate is skipped.
pub(crate) async fn route_intent(
    router: &Router,
    user: &User,
    session: &mut Session,
    msg: &InboundMessage,
    result: NluResult,
    user_confirmed: bool,
) -> PhaseResult {
    if result.intent == Intent::Unknown {
        return Ok(Reply::text(replies::not_understood()));
    }

    let nlu_config = &router.deps.config.nlu;
    let threshold = if result.intent.is_destructive() {
        nlu_config.destructive_threshold
    } else {
        nlu_config.create_threshold
    };
    if !user_confirmed && (result.needs_clarification || result.confidence < threshold) {
        return enter_clarification(router, user, session, result);
    }

    match result.intent {
        Intent::CreateEvent => handle_create_event(router, user, session, msg, &result),
        Intent::CreateReminder => handle_create_reminder(router, user, session, msg, &result),
        Intent::CreateTask => handle_create_task(router, user, session),
        Intent::ListEvents => handle_list_events(router, user, msg, &result),
        Intent::ListReminders => handle_list_reminders(router, user),
        Intent::ListTasks => handle_list_tasks(router, user),
        Intent::SearchEvent => handle_search_event(router, user, msg, &result),
        Intent::UpdateEvent => handle_update_event(router, user, session, msg, &result),
        Intent::UpdateReminder => handle_update_reminder(router, user, msg, &result),
        Intent::DeleteEvent => handle_delete_event(router, user, session, msg, &result),
        Intent::DeleteReminder => handle_delete_reminder(router, user, msg, &result),
        Intent::AddComment => handle_add_comment(router, user, session, &result),
        Intent::ViewComments => handle_view_comments(router, user, session, &result),
        Intent::DeleteComment => handle_delete_comment(router, user, session, &result),
        Intent::GenerateDashboard => handle_dashboard(router, user),
        Intent::Help => Ok(Reply::text(replies::help(user.language))),
        Intent::Unknown => Ok(Reply::text(replies::not_understood())),
    }
}

fn enter_clarification(
    router: &Router,
    user: &User,
    session: &mut Session,
    result: NluResult,
) -> PhaseResult {
    let mut candidates = if result.candidates.is_empty() {
        vec![result]
    } else {
        result.candidates
    };
    candidates.truncate(3);

    let labels: Vec<String> = candidates
        .iter()
        .map(|c| replies::intent_label(c.intent).to_string())
        .collect();
    let serialized: Vec<String> = candidates
        .iter()
        .filter_map(|c| serde_json::to_string(c).ok())
        .collect();

    let reply = replies::clarify(&labels);
    router
        .sessions()
        .transition(&user.id, session, ConvState::ClarifyingIntent, |ctx| {
            ctx.clarify_candidates = serialized;
            ctx.clarify_labels = labels;
        });
    Ok(Reply::Text(reply))
}

// --- datetime resolution ----------------------------------------------------

/// Resolve an entity's date/time fields to a concrete query. `date_iso`
/// wins when present; otherwise the free-text pieces are re-parsed in the
/// user zone so all disambiguation rules apply uniformly.
fn resolve_entity_datetime(
    date_iso: Option<&str>,
    date_text: Option<&str>,
    time: Option<&str>,
    fallback_text: &str,
    user: &User,
    now: DateTime<Utc>,
) -> Option<yoman_hebrew::DateQuery> {
    if let Some(iso) = date_iso {
        if let Ok(at) = iso.parse::<DateTime<Utc>>() {
            return Some(yoman_hebrew::DateQuery {
                instant_utc: Some(at),
                range_start_utc: None,
                range_end_utc: None,
                is_week_range: false,
                is_month_range: false,
                description: format_local(at, user.zone()),
            });
        }
    }

    let combined = match (date_text, time) {
        (Some(d), Some(t)) => format!("{d} {t}"),
        (Some(d), None) => d.to_string(),
        (None, Some(t)) => t.to_string(),
        (None, None) => fallback_text.to_string(),
    };
    parse_date_query(&combined, user.zone(), now).ok()
}

// --- events -----------------------------------------------------------------

fn handle_create_event(
    router: &Router,
    user: &User,
    session: &mut Session,
    msg: &InboundMessage,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.event.clone().unwrap_or_default();
    let now = router.clock().now_utc();

    let Some(title) = entity.title.clone().filter(|t| !t.trim().is_empty()) else {
        router
            .sessions()
            .transition(&user.id, session, ConvState::AddingEventTitle, |ctx| {
                ctx.clear();
            });
        return Ok(Reply::text(replies::ask_event_title()));
    };

    let query = resolve_entity_datetime(
        entity.date_iso.as_deref(),
        entity.date_text.as_deref(),
        entity.time.as_deref(),
        &msg.text,
        user,
        now,
    );

    let recurrence = entity
        .recurrence_text
        .as_deref()
        .and_then(RecurrenceRule::from_phrase)
        .map(|r| r.to_string());

    match query {
        Some(q) if q.instant_utc.is_some() => {
            let start = q.instant_utc.unwrap();
            router
                .sessions()
                .transition(&user.id, session, ConvState::MainMenu, |ctx| {
                    ctx.clear();
                    ctx.event_title = Some(title.clone());
                    ctx.event_start_utc = Some(start);
                    ctx.event_has_time = true;
                    ctx.event_location = entity.location.clone();
                    ctx.event_recurrence = recurrence.clone();
                    ctx.event_contact = entity.contact_name.clone();
                });
            finalize_event_creation(router, user, session, false)
        }
        Some(q) if q.is_range() && !q.is_week_range && !q.is_month_range => {
            // A date without a time: keep the fragments and ask.
            let date_start = q.range_start_utc.unwrap();
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingEventTime, |ctx| {
                    ctx.clear();
                    ctx.event_title = Some(title.clone());
                    ctx.event_start_utc = Some(date_start);
                    ctx.event_has_time = false;
                    ctx.event_location = entity.location.clone();
                    ctx.event_recurrence = recurrence.clone();
                    ctx.event_contact = entity.contact_name.clone();
                });
            Ok(Reply::text(replies::need_time()))
        }
        _ => {
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingEventDate, |ctx| {
                    ctx.clear();
                    ctx.event_title = Some(title.clone());
                    ctx.event_contact = entity.contact_name.clone();
                });
            Ok(Reply::text(replies::ask_event_date()))
        }
    }
}

/// Create the event held in the session context. Shared by the NLU path
/// and the confirm states; `allow_overlap` is set after the user approves
/// a conflict.
pub(crate) fn finalize_event_creation(
    router: &Router,
    user: &User,
    session: &mut Session,
    allow_overlap: bool,
) -> PhaseResult {
    let ctx = session.context.clone();
    let (Some(title), Some(start)) = (ctx.event_title.clone(), ctx.event_start_utc) else {
        return Err(PhaseError::new(
            "handler",
            Some(&user.id),
            "event context incomplete at finalize",
        ));
    };

    let input = NewEvent {
        user_id: user.id.clone(),
        title,
        start_ts_utc: start,
        end_ts_utc: None,
        location: ctx.event_location.clone(),
        source: EventSource::Nlp,
        recurrence_rule: ctx.event_recurrence.clone(),
    };

    match router.events().create(input, allow_overlap) {
        Ok(CreateOutcome::Created(event)) => {
            if let Some(contact_name) = &ctx.event_contact {
                attach_contact(router, user, &event, contact_name);
            }
            router.sessions().reset(&user.id, session);
            session.quoted_event_id = Some(event.id.clone());
            router.sessions().save(&user.id, session);
            Ok(Reply::Text(replies::event_created(&render::event_line(
                &event,
                user.zone(),
            ))))
        }
        Ok(CreateOutcome::Conflict { overlaps }) => {
            let summaries: Vec<String> = overlaps
                .iter()
                .map(|e| render::event_line(e, user.zone()))
                .collect();
            let reply = replies::conflict_confirm(&summaries);
            router.sessions().transition(
                &user.id,
                session,
                ConvState::AddingEventConflictConfirm,
                |c| c.overlap_summaries = summaries,
            );
            Ok(Reply::Text(reply))
        }
        Err(yoman_domain::DomainError::PastStart) => {
            router.sessions().reset(&user.id, session);
            Ok(Reply::text(replies::past_date()))
        }
        Err(yoman_domain::DomainError::EmptyTitle) => {
            router.sessions().reset(&user.id, session);
            Ok(Reply::text(replies::ask_event_title()))
        }
        Err(e) => Err(PhaseError::new("handler", Some(&user.id), e)),
    }
}

/// Record the extracted contact as a participant, creating the contact
/// entry on first sight.
fn attach_contact(router: &Router, user: &User, event: &Event, contact_name: &str) {
    let known = router
        .contacts()
        .find_by_name(&user.id, contact_name)
        .ok()
        .flatten();
    let (name, phone) = match &known {
        Some(c) => (c.name.clone(), c.phone.clone()),
        None => {
            let _ = router
                .contacts()
                .create(&user.id, contact_name, None, vec![]);
            (contact_name.to_string(), None)
        }
    };
    let _ = router.events().add_participant(
        &event.id,
        &user.id,
        &name,
        ParticipantRole::Companion,
        phone.as_deref(),
    );
}

fn handle_list_events(
    router: &Router,
    user: &User,
    msg: &InboundMessage,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.event.clone().unwrap_or_default();
    let now = router.clock().now_utc();
    let zone = user.zone();

    let query = resolve_entity_datetime(
        entity.date_iso.as_deref(),
        entity.date_text.as_deref(),
        entity.time.as_deref(),
        &msg.text,
        user,
        now,
    );

    let events = match &query {
        Some(q) if q.is_range() => router
            .events()
            .list_in_range(&user.id, q.range_start_utc.unwrap(), q.range_end_utc.unwrap()),
        Some(q) if q.instant_utc.is_some() => {
            let date = q.local_date(zone).unwrap_or(now.with_timezone(&zone).date_naive());
            router.events().list_for_day(&user.id, date, zone)
        }
        _ => router.events().list_upcoming(&user.id, Some(10)),
    }
    .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;

    if events.is_empty() {
        return Ok(Reply::text(replies::no_events()));
    }
    Ok(Reply::Text(render::event_list(&events, zone)))
}

fn handle_search_event(
    router: &Router,
    user: &User,
    msg: &InboundMessage,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.event.clone().unwrap_or_default();
    let query = entity.title.unwrap_or_else(|| msg.text.clone());
    let matches = router
        .events()
        .search(&user.id, &query)
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    if matches.is_empty() {
        return Ok(Reply::text(replies::nothing_found()));
    }
    let events: Vec<Event> = matches.into_iter().map(|(e, _)| e).collect();
    Ok(Reply::Text(render::event_list(&events, user.zone())))
}

/// Candidate events for a destructive operation on `query`.
fn destructive_candidates(
    router: &Router,
    user: &User,
    query: &str,
) -> Result<Vec<Event>, PhaseError> {
    let all = router
        .events()
        .list_upcoming(&user.id, Some(100))
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    let titles: Vec<String> = all.iter().map(|e| e.title.clone()).collect();
    let ranked = fuzzy::rank(query, &titles, fuzzy::DESTRUCTIVE_THRESHOLD);
    Ok(ranked.into_iter().map(|m| all[m.index].clone()).collect())
}

fn handle_delete_event(
    router: &Router,
    user: &User,
    session: &mut Session,
    msg: &InboundMessage,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.event.clone().unwrap_or_default();

    let candidates = if entity.delete_all {
        router
            .events()
            .list_upcoming(&user.id, Some(100))
            .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?
    } else {
        let query = entity.title.clone().unwrap_or_else(|| msg.text.clone());
        destructive_candidates(router, user, &query)?
    };

    match candidates.len() {
        0 => Ok(Reply::text(replies::nothing_found())),
        1 => {
            let event = &candidates[0];
            let line = render::event_line(event, user.zone());
            let id = event.id.clone();
            router
                .sessions()
                .transition(&user.id, session, ConvState::DeletingEventConfirm, |ctx| {
                    ctx.selected_event_id = Some(id);
                });
            Ok(Reply::Text(replies::confirm_delete(&line)))
        }
        _ => {
            let lines: Vec<String> = candidates
                .iter()
                .map(|e| render::event_line(e, user.zone()))
                .collect();
            let ids: Vec<String> = candidates.iter().map(|e| e.id.clone()).collect();
            let reply = replies::pick_one_to_delete(&lines);
            router
                .sessions()
                .transition(&user.id, session, ConvState::DeletingEventSelect, |ctx| {
                    ctx.candidate_event_ids = ids;
                });
            Ok(Reply::Text(reply))
        }
    }
}

/// Delete an event and cancel everything derived from it.
pub(crate) fn perform_event_deletion(
    router: &Router,
    user: &User,
    event_id: &str,
) -> Result<(), PhaseError> {
    router
        .events()
        .delete(event_id, &user.id)
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    let cancelled = router
        .reminders()
        .cancel_for_event(event_id, &user.id)
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    for reminder_id in cancelled {
        let _ = router.scheduler().cancel_reminder_jobs(&reminder_id);
    }
    Ok(())
}

fn handle_update_event(
    router: &Router,
    user: &User,
    session: &mut Session,
    msg: &InboundMessage,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.event.clone().unwrap_or_default();
    let query = entity.title.clone().unwrap_or_else(|| msg.text.clone());
    let candidates = destructive_candidates(router, user, &query)?;

    match candidates.len() {
        0 => Ok(Reply::text(replies::nothing_found())),
        1 => {
            let id = candidates[0].id.clone();
            router
                .sessions()
                .transition(&user.id, session, ConvState::UpdatingEventField, |ctx| {
                    ctx.selected_event_id = Some(id);
                });
            Ok(Reply::text(replies::ask_update_field()))
        }
        _ => {
            let lines: Vec<String> = candidates
                .iter()
                .map(|e| render::event_line(e, user.zone()))
                .collect();
            let ids: Vec<String> = candidates.iter().map(|e| e.id.clone()).collect();
            let reply = replies::pick_one_to_update(&lines);
            router
                .sessions()
                .transition(&user.id, session, ConvState::UpdatingEventSelect, |ctx| {
                    ctx.candidate_event_ids = ids;
                });
            Ok(Reply::Text(reply))
        }
    }
}

// --- reminders --------------------------------------------------------------

/// Enqueue the delivery job for a reminder's next occurrence.
pub(crate) fn schedule_delivery(router: &Router, reminder: &Reminder) -> Result<(), PhaseError> {
    router
        .scheduler()
        .enqueue(
            JobKind::ReminderDelivery {
                reminder_id: reminder.id.clone(),
                user_id: reminder.user_id.as_str().to_string(),
                occurrence_utc: reminder.reminder_ts_utc,
            },
            reminder.reminder_ts_utc,
        )
        .map_err(|e| PhaseError::new("scheduler", Some(&reminder.user_id), e))?;
    Ok(())
}

fn handle_create_reminder(
    router: &Router,
    user: &User,
    session: &mut Session,
    msg: &InboundMessage,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.reminder.clone().unwrap_or_default();
    let now = router.clock().now_utc();

    // Lead-time path: a quoted event plus an "X before" phrase.
    let lead = entity
        .lead_time_minutes
        .or_else(|| parse_lead_time(&msg.text));
    if let (Some(lead), Some(event_id)) = (lead, session.quoted_event_id.clone()) {
        let event = router
            .events()
            .get_by_id(&event_id, &user.id)
            .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
        let at = event.start_ts_utc - Duration::minutes(lead);
        if at <= now {
            return Ok(Reply::text(replies::past_date()));
        }
        let reminder = router
            .reminders()
            .create(NewReminder {
                user_id: user.id.clone(),
                title: event.title.clone(),
                reminder_ts_utc: at,
                recurrence_rule: None,
                lead_time_minutes: Some(lead),
                event_id: Some(event.id.clone()),
            })
            .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
        schedule_delivery(router, &reminder)?;
        info!(reminder_id = %reminder.id, lead, "lead-time reminder created");
        return Ok(Reply::Text(replies::reminder_created(
            &render::reminder_line(&reminder, user.zone()),
        )));
    }

    let Some(title) = entity.title.clone().filter(|t| !t.trim().is_empty()) else {
        router
            .sessions()
            .transition(&user.id, session, ConvState::AddingReminderTitle, |ctx| {
                ctx.clear();
            });
        return Ok(Reply::text(replies::ask_reminder_title()));
    };

    let recurrence = entity
        .recurrence_text
        .as_deref()
        .or(Some(msg.text.as_str()))
        .and_then(RecurrenceRule::from_phrase)
        .map(|r| r.to_string());

    let query = resolve_entity_datetime(
        entity.date_iso.as_deref(),
        entity.date_text.as_deref(),
        entity.time.as_deref(),
        &msg.text,
        user,
        now,
    );

    match query.and_then(|q| q.instant_utc) {
        Some(at) if at > now => {
            let reminder = router
                .reminders()
                .create(NewReminder {
                    user_id: user.id.clone(),
                    title,
                    reminder_ts_utc: at,
                    recurrence_rule: recurrence,
                    lead_time_minutes: None,
                    event_id: None,
                })
                .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
            schedule_delivery(router, &reminder)?;
            router.sessions().reset(&user.id, session);
            Ok(Reply::Text(replies::reminder_created(
                &render::reminder_line(&reminder, user.zone()),
            )))
        }
        Some(_) => Ok(Reply::text(replies::past_date())),
        None => {
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingReminderDate, |ctx| {
                    ctx.clear();
                    ctx.reminder_title = Some(title.clone());
                    ctx.reminder_recurrence = recurrence.clone();
                });
            Ok(Reply::text(replies::ask_reminder_date()))
        }
    }
}

// --- tasks ------------------------------------------------------------------

/// Task fields are collected conversationally — the NLU carries no task
/// entity, so the intent only opens the guided chain.
fn handle_create_task(router: &Router, user: &User, session: &mut Session) -> PhaseResult {
    router
        .sessions()
        .transition(&user.id, session, ConvState::AddingTaskTitle, |ctx| {
            ctx.clear();
        });
    Ok(Reply::text(replies::ask_task_title()))
}

fn handle_list_tasks(router: &Router, user: &User) -> PhaseResult {
    let tasks = router
        .tasks()
        .list_open(&user.id)
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    if tasks.is_empty() {
        return Ok(Reply::text(replies::no_tasks()));
    }
    Ok(Reply::Text(render::task_list(&tasks, user.zone())))
}

fn handle_list_reminders(router: &Router, user: &User) -> PhaseResult {
    let reminders = router
        .reminders()
        .list(&user.id)
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    if reminders.is_empty() {
        return Ok(Reply::text(replies::no_reminders()));
    }
    Ok(Reply::Text(render::reminder_list(&reminders, user.zone())))
}

fn best_reminder_match(
    router: &Router,
    user: &User,
    query: &str,
) -> Result<Option<Reminder>, PhaseError> {
    let reminders = router
        .reminders()
        .list(&user.id)
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    let titles: Vec<String> = reminders.iter().map(|r| r.title.clone()).collect();
    Ok(
        fuzzy::best_match(query, &titles, fuzzy::DESTRUCTIVE_THRESHOLD)
            .map(|m| reminders[m.index].clone()),
    )
}

fn handle_delete_reminder(
    router: &Router,
    user: &User,
    msg: &InboundMessage,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.reminder.clone().unwrap_or_default();
    let query = entity.title.unwrap_or_else(|| msg.text.clone());
    match best_reminder_match(router, user, &query)? {
        Some(reminder) => {
            router
                .reminders()
                .delete(&reminder.id, &user.id)
                .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
            let _ = router.scheduler().cancel_reminder_jobs(&reminder.id);
            Ok(Reply::Text(replies::deleted(&render::reminder_line(
                &reminder,
                user.zone(),
            ))))
        }
        None => {
            let reminders = router
                .reminders()
                .list(&user.id)
                .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
            if reminders.is_empty() {
                Ok(Reply::text(replies::no_reminders()))
            } else {
                Ok(Reply::Text(format!(
                    "{}\n{}",
                    replies::nothing_found(),
                    render::reminder_list(&reminders, user.zone())
                )))
            }
        }
    }
}

fn handle_update_reminder(
    router: &Router,
    user: &User,
    msg: &InboundMessage,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.reminder.clone().unwrap_or_default();
    let query = entity.title.clone().unwrap_or_else(|| msg.text.clone());
    let Some(reminder) = best_reminder_match(router, user, &query)? else {
        return Ok(Reply::text(replies::nothing_found()));
    };

    let now = router.clock().now_utc();
    let mut patch = yoman_domain::ReminderPatch::default();
    if let Some(time_text) = entity.time.as_deref() {
        // Time-only update: the new clock time lands on the existing date.
        if let Some(at) = parse_date_query(time_text, user.zone(), now)
            .ok()
            .and_then(|q| q.instant_utc)
        {
            patch.time = Some(at.with_timezone(&user.zone()).time());
        }
    } else if let Some(q) = resolve_entity_datetime(
        entity.date_iso.as_deref(),
        entity.date_text.as_deref(),
        None,
        &msg.text,
        user,
        now,
    ) {
        patch.reminder_ts_utc = q.instant_utc;
    }

    if patch.time.is_none() && patch.reminder_ts_utc.is_none() {
        return Ok(Reply::text(replies::bad_date()));
    }

    let updated = router
        .reminders()
        .update(&reminder.id, &user.id, patch, user.zone())
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    let _ = router.scheduler().cancel_reminder_jobs(&updated.id);
    schedule_delivery(router, &updated)?;
    Ok(Reply::Text(replies::updated(&render::reminder_line(
        &updated,
        user.zone(),
    ))))
}

// --- comments ---------------------------------------------------------------

/// Resolve the event a comment operation targets: explicit title first,
/// then the quoted event.
fn resolve_comment_event(
    router: &Router,
    user: &User,
    session: &Session,
    event_title: Option<&str>,
) -> Result<Option<Event>, PhaseError> {
    if let Some(title) = event_title {
        let matches = router
            .events()
            .search(&user.id, title)
            .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
        if let Some((event, _)) = matches.into_iter().next() {
            return Ok(Some(event));
        }
    }
    if let Some(id) = &session.quoted_event_id {
        if let Ok(event) = router.events().get_by_id(id, &user.id) {
            return Ok(Some(event));
        }
    }
    Ok(None)
}

fn parse_comment_priority(raw: Option<&str>) -> Option<CommentPriority> {
    match raw?.trim() {
        "urgent" | "דחוף" => Some(CommentPriority::Urgent),
        "high" | "גבוה" | "חשוב" => Some(CommentPriority::High),
        "normal" | "רגיל" => Some(CommentPriority::Normal),
        _ => None,
    }
}

fn handle_add_comment(
    router: &Router,
    user: &User,
    session: &mut Session,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.comment.clone().unwrap_or_default();
    let Some(event) = resolve_comment_event(router, user, session, entity.event_title.as_deref())?
    else {
        return Ok(Reply::text(replies::nothing_found()));
    };
    let Some(text) = entity.text.clone().filter(|t| !t.trim().is_empty()) else {
        return Ok(Reply::text(replies::not_understood()));
    };

    let comment = router
        .events()
        .add_comment(
            &event.id,
            &user.id,
            &text,
            parse_comment_priority(entity.priority.as_deref()),
            vec![],
        )
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;

    // A comment with its own reminder time gets a linked reminder.
    if let Some(reminder_time) = entity.reminder_time.as_deref() {
        let now = router.clock().now_utc();
        if let Some(at) = parse_date_query(reminder_time, user.zone(), now)
            .ok()
            .and_then(|q| q.instant_utc)
            .filter(|at| *at > now)
        {
            let reminder = router
                .reminders()
                .create(NewReminder {
                    user_id: user.id.clone(),
                    title: text.clone(),
                    reminder_ts_utc: at,
                    recurrence_rule: None,
                    lead_time_minutes: None,
                    event_id: Some(event.id.clone()),
                })
                .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
            schedule_delivery(router, &reminder)?;
            let _ = router.events().update_comment(
                &event.id,
                &user.id,
                &comment.id,
                yoman_domain::event::CommentPatch {
                    reminder_id: Some(reminder.id.clone()),
                    ..Default::default()
                },
            );
        }
    }

    session.quoted_event_id = Some(event.id.clone());
    router.sessions().save(&user.id, session);
    Ok(Reply::Text(replies::comment_added(&event.title)))
}

fn handle_view_comments(
    router: &Router,
    user: &User,
    session: &mut Session,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.comment.clone().unwrap_or_default();
    let Some(event) = resolve_comment_event(router, user, session, entity.event_title.as_deref())?
    else {
        return Ok(Reply::text(replies::nothing_found()));
    };
    if event.notes.is_empty() {
        return Ok(Reply::Text(replies::no_comments(&event.title)));
    }
    let mut out = format!("הערות לאירוע \"{}\":\n", event.title);
    for (i, comment) in event.notes.iter().enumerate() {
        let tag = match comment.priority {
            CommentPriority::Urgent => " 🔴",
            CommentPriority::High => " 🟠",
            CommentPriority::Normal => "",
        };
        out.push_str(&format!("{}. {}{}\n", i + 1, comment.text, tag));
    }
    Ok(Reply::Text(out.trim_end().to_string()))
}

fn handle_delete_comment(
    router: &Router,
    user: &User,
    session: &mut Session,
    result: &NluResult,
) -> PhaseResult {
    let entity = result.comment.clone().unwrap_or_default();
    let Some(event) = resolve_comment_event(router, user, session, entity.event_title.as_deref())?
    else {
        return Ok(Reply::text(replies::nothing_found()));
    };

    let outcome = match entity.delete_by.as_deref() {
        Some("index") => {
            let index: usize = entity
                .delete_value
                .as_deref()
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0);
            router.events().delete_comment_by_index(&event.id, &user.id, index)
        }
        Some("text") => {
            let needle = entity.delete_value.clone().unwrap_or_default();
            router
                .events()
                .delete_comment_by_text(&event.id, &user.id, &needle)
        }
        _ => router.events().delete_last_comment(&event.id, &user.id),
    };

    match outcome {
        Ok(_) => Ok(Reply::text(replies::comment_deleted())),
        Err(yoman_domain::DomainError::Ambiguous { options }) => {
            Ok(Reply::Text(replies::comment_ambiguous(&options)))
        }
        Err(yoman_domain::DomainError::NotFound) => Ok(Reply::text(replies::nothing_found())),
        Err(e) => Err(PhaseError::new("handler", Some(&user.id), e)),
    }
}

// --- dashboard --------------------------------------------------------------

fn handle_dashboard(router: &Router, user: &User) -> PhaseResult {
    let config = &router.deps.config.dashboard;
    let token = Uuid::new_v4().simple().to_string();
    let ttl = Duration::minutes(config.token_ttl_minutes);
    let record = serde_json::json!({
        "user_id": user.id.as_str(),
        "expires_at": (router.clock().now_utc() + ttl).to_rfc3339(),
    });
    router
        .deps
        .kv
        .set_json(&yoman_kv::dashboard_token(&token), &record, Some(ttl))
        .map_err(|e| PhaseError::new("handler", Some(&user.id), e))?;
    let url = format!("{}?token={token}", config.base_url);
    Ok(Reply::Text(replies::dashboard_link(&url)))
}
