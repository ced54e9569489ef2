//! State-machine flow advancement: each in-flow state accepts the user's
//! text, validates it, and moves deterministically to the next state (or
//! re-prompts on bad input). `/cancel` never reaches here — commands are
//! dispatched first.

use chrono::{NaiveTime, TimeZone, Utc};
use tracing::debug;

use yoman_core::clock::format_local;
use yoman_core::message::{InboundMessage, Reply};
use yoman_domain::{EventPatch, NewReminder, NewTask, TaskPriority};
use yoman_hebrew::{parse_date_query, RecurrenceRule};
use yoman_nlu::NluResult;
use yoman_sessions::{ConvState, Session};
use yoman_users::User;

use crate::handlers::{
    finalize_event_creation, perform_event_deletion, route_intent, schedule_delivery,
};
use crate::pipeline::{PhaseError, PhaseResult, Router};
use crate::{render, replies};

/// Advance the current flow with `text` as input.
pub(crate) async fn advance(
    router: &Router,
    user: &User,
    session: &mut Session,
    msg: &InboundMessage,
) -> PhaseResult {
    let text = msg.text.trim();
    debug!(user_id = %user.id, state = ?session.state, "advancing flow");
    match session.state {
        // --- event creation ------------------------------------------------
        ConvState::AddingEventTitle => {
            if text.is_empty() {
                return Ok(Reply::text(replies::ask_event_title()));
            }
            let title = text.to_string();
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingEventDate, |ctx| {
                    ctx.event_title = Some(title);
                });
            Ok(Reply::text(replies::ask_event_date()))
        }
        ConvState::AddingEventDate => {
            let now = router.clock().now_utc();
            match parse_date_query(text, user.zone(), now) {
                Ok(q) if q.instant_utc.is_some() => {
                    let start = q.instant_utc.unwrap();
                    router
                        .sessions()
                        .transition(&user.id, session, ConvState::AddingEventLocation, |ctx| {
                            ctx.event_start_utc = Some(start);
                            ctx.event_has_time = true;
                        });
                    Ok(Reply::text(replies::ask_event_location()))
                }
                Ok(q) if q.is_range() && !q.is_week_range && !q.is_month_range => {
                    let start = q.range_start_utc.unwrap();
                    router
                        .sessions()
                        .transition(&user.id, session, ConvState::AddingEventTime, |ctx| {
                            ctx.event_start_utc = Some(start);
                            ctx.event_has_time = false;
                        });
                    Ok(Reply::text(replies::need_time()))
                }
                _ => Ok(Reply::text(replies::bad_date())),
            }
        }
        ConvState::AddingEventTime => {
            let Some(time) = parse_time_answer(router, user, text) else {
                return Ok(Reply::text(replies::need_time()));
            };
            let Some(date_anchor) = session.context.event_start_utc else {
                return Err(PhaseError::new(
                    "state",
                    Some(&user.id),
                    "time state without a stored date",
                ));
            };
            let start = combine_date_time(date_anchor, time, user);
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingEventLocation, |ctx| {
                    ctx.event_start_utc = Some(start);
                    ctx.event_has_time = true;
                });
            Ok(Reply::text(replies::ask_event_location()))
        }
        ConvState::AddingEventLocation => {
            let location = if replies::skip(text) || text.is_empty() {
                None
            } else {
                Some(text.to_string())
            };
            let summary = event_context_summary(session, user, location.as_deref());
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingEventConfirm, |ctx| {
                    ctx.event_location = location;
                });
            Ok(Reply::Text(replies::confirm_event(&summary)))
        }
        ConvState::AddingEventConfirm => {
            if replies::yes(text) {
                finalize_event_creation(router, user, session, false)
            } else if replies::no(text) {
                router.sessions().reset(&user.id, session);
                Ok(Reply::text(replies::cancelled()))
            } else {
                Ok(Reply::text("כן או לא?"))
            }
        }
        ConvState::AddingEventConflictConfirm => {
            if replies::yes(text) {
                finalize_event_creation(router, user, session, true)
            } else if replies::no(text) {
                router.sessions().reset(&user.id, session);
                Ok(Reply::text(replies::cancelled()))
            } else {
                Ok(Reply::text("כן או לא?"))
            }
        }

        // --- reminder creation ----------------------------------------------
        ConvState::AddingReminderTitle => {
            if text.is_empty() {
                return Ok(Reply::text(replies::ask_reminder_title()));
            }
            let title = text.to_string();
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingReminderDate, |ctx| {
                    ctx.reminder_title = Some(title);
                });
            Ok(Reply::text(replies::ask_reminder_date()))
        }
        ConvState::AddingReminderDate => {
            let now = router.clock().now_utc();
            match parse_date_query(text, user.zone(), now) {
                Ok(q) => match q.instant_utc {
                    Some(at) if at > now => {
                        router.sessions().transition(
                            &user.id,
                            session,
                            ConvState::AddingReminderRecurrence,
                            |ctx| ctx.reminder_at_utc = Some(at),
                        );
                        Ok(Reply::text(replies::ask_reminder_recurrence()))
                    }
                    Some(_) => Ok(Reply::text(replies::past_date())),
                    None => Ok(Reply::text(replies::need_time())),
                },
                Err(_) => Ok(Reply::text(replies::bad_date())),
            }
        }
        ConvState::AddingReminderRecurrence => {
            let recurrence = if replies::no(text) || replies::skip(text) {
                None
            } else {
                match RecurrenceRule::from_phrase(text) {
                    Some(rule) => Some(rule.to_string()),
                    None => return Ok(Reply::text(replies::ask_reminder_recurrence())),
                }
            };
            let summary = reminder_context_summary(session, user, recurrence.as_deref());
            router.sessions().transition(
                &user.id,
                session,
                ConvState::AddingReminderConfirm,
                |ctx| ctx.reminder_recurrence = recurrence,
            );
            Ok(Reply::Text(replies::confirm_reminder(&summary)))
        }
        ConvState::AddingReminderConfirm => {
            if replies::no(text) {
                router.sessions().reset(&user.id, session);
                return Ok(Reply::text(replies::cancelled()));
            }
            if !replies::yes(text) {
                return Ok(Reply::text("כן או לא?"));
            }
            let ctx = session.context.clone();
            let (Some(title), Some(at)) = (ctx.reminder_title, ctx.reminder_at_utc) else {
                return Err(PhaseError::new(
                    "state",
                    Some(&user.id),
                    "reminder context incomplete at confirm",
                ));
            };
            let reminder = router
                .reminders()
                .create(NewReminder {
                    user_id: user.id.clone(),
                    title,
                    reminder_ts_utc: at,
                    recurrence_rule: ctx.reminder_recurrence,
                    lead_time_minutes: None,
                    event_id: None,
                })
                .map_err(|e| PhaseError::new("state", Some(&user.id), e))?;
            schedule_delivery(router, &reminder)?;
            router.sessions().reset(&user.id, session);
            Ok(Reply::Text(replies::reminder_created(
                &render::reminder_line(&reminder, user.zone()),
            )))
        }

        // --- deletion -------------------------------------------------------
        ConvState::DeletingEventSelect => {
            let ids = session.context.candidate_event_ids.clone();
            match numbered_choice(text, ids.len()) {
                Some(index) => {
                    let event_id = ids[index].clone();
                    let event = router
                        .events()
                        .get_by_id(&event_id, &user.id)
                        .map_err(|e| PhaseError::new("state", Some(&user.id), e))?;
                    let line = render::event_line(&event, user.zone());
                    router.sessions().transition(
                        &user.id,
                        session,
                        ConvState::DeletingEventConfirm,
                        |ctx| ctx.selected_event_id = Some(event_id),
                    );
                    Ok(Reply::Text(replies::confirm_delete(&line)))
                }
                None => Ok(Reply::Text(replies::choose_number(ids.len()))),
            }
        }
        ConvState::DeletingEventConfirm => {
            if replies::no(text) {
                router.sessions().reset(&user.id, session);
                return Ok(Reply::text(replies::cancelled()));
            }
            if !replies::yes(text) {
                return Ok(Reply::text("כן או לא?"));
            }
            let Some(event_id) = session.context.selected_event_id.clone() else {
                return Err(PhaseError::new(
                    "state",
                    Some(&user.id),
                    "delete confirm without a selection",
                ));
            };
            let event = router
                .events()
                .get_by_id(&event_id, &user.id)
                .map_err(|e| PhaseError::new("state", Some(&user.id), e))?;
            perform_event_deletion(router, user, &event_id)?;
            router.sessions().reset(&user.id, session);
            Ok(Reply::Text(replies::deleted(&render::event_line(
                &event,
                user.zone(),
            ))))
        }

        // --- update ---------------------------------------------------------
        ConvState::UpdatingEventSelect => {
            let ids = session.context.candidate_event_ids.clone();
            match numbered_choice(text, ids.len()) {
                Some(index) => {
                    let event_id = ids[index].clone();
                    router.sessions().transition(
                        &user.id,
                        session,
                        ConvState::UpdatingEventField,
                        |ctx| ctx.selected_event_id = Some(event_id),
                    );
                    Ok(Reply::text(replies::ask_update_field()))
                }
                None => Ok(Reply::Text(replies::choose_number(ids.len()))),
            }
        }
        ConvState::UpdatingEventField => {
            let field = match text {
                "כותרת" | "שם" => Some("title"),
                "תאריך" => Some("date"),
                "שעה" => Some("time"),
                "מיקום" | "מקום" => Some("location"),
                _ => None,
            };
            match field {
                Some(field) => {
                    let label = text.to_string();
                    router.sessions().transition(
                        &user.id,
                        session,
                        ConvState::UpdatingEventValue,
                        |ctx| ctx.update_field = Some(field.to_string()),
                    );
                    Ok(Reply::Text(replies::ask_update_value(&label)))
                }
                None => Ok(Reply::text(replies::ask_update_field())),
            }
        }
        ConvState::UpdatingEventValue => apply_event_update(router, user, session, text),

        // --- tasks ----------------------------------------------------------
        ConvState::AddingTaskTitle => {
            if text.is_empty() {
                return Ok(Reply::text(replies::ask_task_title()));
            }
            let title = text.to_string();
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingTaskDetails, |ctx| {
                    ctx.task_title = Some(title);
                });
            Ok(Reply::text(replies::ask_task_details()))
        }
        ConvState::AddingTaskDetails => {
            let details = if replies::skip(text) || text.is_empty() {
                None
            } else {
                Some(text.to_string())
            };
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingTaskPriority, |ctx| {
                    ctx.task_description = details;
                });
            Ok(Reply::text(replies::ask_task_priority()))
        }
        ConvState::AddingTaskPriority => {
            let priority = match text {
                "דחוף" | "urgent" => "urgent",
                "גבוה" | "high" => "high",
                "נמוך" | "low" => "low",
                _ if replies::skip(text) || text == "רגיל" || text == "normal" => "normal",
                _ => return Ok(Reply::text(replies::ask_task_priority())),
            };
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingTaskDue, |ctx| {
                    ctx.task_priority = Some(priority.to_string());
                });
            Ok(Reply::text(replies::ask_task_due()))
        }
        ConvState::AddingTaskDue => {
            let now = router.clock().now_utc();
            let due = if replies::skip(text) {
                None
            } else {
                match parse_date_query(text, user.zone(), now) {
                    Ok(q) => q.instant_utc.or(q.range_start_utc),
                    Err(_) => return Ok(Reply::text(replies::bad_date())),
                }
            };
            let summary = task_context_summary(session, user, due);
            router
                .sessions()
                .transition(&user.id, session, ConvState::AddingTaskConfirm, |ctx| {
                    ctx.task_due_utc = due;
                });
            Ok(Reply::Text(replies::confirm_task(&summary)))
        }
        ConvState::AddingTaskConfirm => {
            if replies::no(text) {
                router.sessions().reset(&user.id, session);
                return Ok(Reply::text(replies::cancelled()));
            }
            if !replies::yes(text) {
                return Ok(Reply::text("כן או לא?"));
            }
            let ctx = session.context.clone();
            let Some(title) = ctx.task_title else {
                return Err(PhaseError::new(
                    "state",
                    Some(&user.id),
                    "task context incomplete at confirm",
                ));
            };
            let priority = ctx
                .task_priority
                .as_deref()
                .and_then(|p| p.parse::<TaskPriority>().ok())
                .unwrap_or_default();
            let task = router
                .tasks()
                .create(NewTask {
                    user_id: user.id.clone(),
                    title,
                    description: ctx.task_description,
                    priority,
                    due_ts_utc: ctx.task_due_utc,
                })
                .map_err(|e| PhaseError::new("state", Some(&user.id), e))?;
            router.sessions().reset(&user.id, session);
            Ok(Reply::Text(replies::task_created(&task.title)))
        }

        // --- clarification --------------------------------------------------
        ConvState::ClarifyingIntent => {
            let candidates = session.context.clarify_candidates.clone();
            match numbered_choice(text, candidates.len()) {
                Some(index) => {
                    let Ok(result) = serde_json::from_str::<NluResult>(&candidates[index]) else {
                        router.sessions().reset(&user.id, session);
                        return Ok(Reply::text(replies::generic_error()));
                    };
                    router.sessions().reset(&user.id, session);
                    route_intent(router, user, session, msg, result, true).await
                }
                None => Ok(Reply::Text(replies::choose_number(candidates.len()))),
            }
        }

        // Auth states are handled before this point; MainMenu never enters.
        _ => {
            router.sessions().reset(&user.id, session);
            Ok(Reply::text(replies::menu()))
        }
    }
}

/// Parse a 1-based numbered selection.
fn numbered_choice(text: &str, max: usize) -> Option<usize> {
    let n: usize = text.trim().trim_end_matches('.').parse().ok()?;
    if n >= 1 && n <= max {
        Some(n - 1)
    } else {
        None
    }
}

/// Parse a time-only answer. The ב prefix marks digits as a clock time so
/// small hours get the afternoon reading ("3" → 15:00).
fn parse_time_answer(router: &Router, user: &User, text: &str) -> Option<NaiveTime> {
    let now = router.clock().now_utc();
    let attempt = if text.contains(':') || text.chars().any(|c| !c.is_ascii_digit()) {
        text.to_string()
    } else {
        format!("ב-{text}")
    };
    parse_date_query(&attempt, user.zone(), now)
        .ok()
        .and_then(|q| q.instant_utc)
        .map(|at| at.with_timezone(&user.zone()).time())
}

/// Replace the clock-time of a stored anchor instant, in the user zone.
fn combine_date_time(
    anchor: chrono::DateTime<Utc>,
    time: NaiveTime,
    user: &User,
) -> chrono::DateTime<Utc> {
    let zone = user.zone();
    let date = anchor.with_timezone(&zone).date_naive();
    zone.from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(anchor)
}

fn event_context_summary(session: &Session, user: &User, location: Option<&str>) -> String {
    let ctx = &session.context;
    let mut summary = ctx.event_title.clone().unwrap_or_default();
    if let Some(start) = ctx.event_start_utc {
        summary.push_str(&format!(" — {}", format_local(start, user.zone())));
    }
    if let Some(location) = location {
        summary.push_str(&format!(" @ {location}"));
    }
    summary
}

fn reminder_context_summary(session: &Session, user: &User, recurrence: Option<&str>) -> String {
    let ctx = &session.context;
    let mut summary = ctx.reminder_title.clone().unwrap_or_default();
    if let Some(at) = ctx.reminder_at_utc {
        summary.push_str(&format!(" — {}", format_local(at, user.zone())));
    }
    if recurrence.is_some() {
        summary.push_str(" 🔁");
    }
    summary
}

fn task_context_summary(
    session: &Session,
    user: &User,
    due: Option<chrono::DateTime<Utc>>,
) -> String {
    let ctx = &session.context;
    let mut summary = ctx.task_title.clone().unwrap_or_default();
    if let Some(priority) = &ctx.task_priority {
        summary.push_str(&format!(" ({priority})"));
    }
    if let Some(due) = due {
        summary.push_str(&format!(" — עד {}", format_local(due, user.zone())));
    }
    summary
}

/// Apply the update collected by the update flow, rescheduling derived
/// reminders when the start time moved.
fn apply_event_update(
    router: &Router,
    user: &User,
    session: &mut Session,
    text: &str,
) -> PhaseResult {
    let ctx = session.context.clone();
    let (Some(event_id), Some(field)) = (ctx.selected_event_id.clone(), ctx.update_field.clone())
    else {
        return Err(PhaseError::new(
            "state",
            Some(&user.id),
            "update value without selection",
        ));
    };
    let current = router
        .events()
        .get_by_id(&event_id, &user.id)
        .map_err(|e| PhaseError::new("state", Some(&user.id), e))?;
    let now = router.clock().now_utc();

    let mut patch = EventPatch::default();
    match field.as_str() {
        "title" => patch.title = Some(text.to_string()),
        "location" => patch.location = Some(text.to_string()),
        "date" => match parse_date_query(text, user.zone(), now) {
            Ok(q) => {
                let new_start = match q.instant_utc {
                    Some(at) => at,
                    None => match q.local_date(user.zone()) {
                        // Date-only answer: keep the current clock time.
                        Some(date) => {
                            let time = current.start_ts_utc.with_timezone(&user.zone()).time();
                            combine_date_time(
                                yoman_core::clock::local_midnight_utc(date, user.zone()),
                                time,
                                user,
                            )
                        }
                        None => return Ok(Reply::text(replies::bad_date())),
                    },
                };
                patch.start_ts_utc = Some(new_start);
            }
            Err(_) => return Ok(Reply::text(replies::bad_date())),
        },
        "time" => {
            let Some(time) = parse_time_answer(router, user, text) else {
                return Ok(Reply::text(replies::need_time()));
            };
            patch.start_ts_utc = Some(combine_date_time(current.start_ts_utc, time, user));
        }
        other => {
            return Err(PhaseError::new(
                "state",
                Some(&user.id),
                format!("unknown update field {other}"),
            ))
        }
    }

    let start_changed = patch.start_ts_utc.is_some();
    let updated = router
        .events()
        .update(&event_id, &user.id, patch)
        .map_err(|e| PhaseError::new("state", Some(&user.id), e))?;

    if start_changed {
        let moved = router
            .reminders()
            .reschedule_for_event(&event_id, &user.id, updated.start_ts_utc)
            .map_err(|e| PhaseError::new("state", Some(&user.id), e))?;
        for (reminder_id, _old, _new) in &moved {
            let _ = router.scheduler().cancel_reminder_jobs(reminder_id);
            if let Ok(reminder) = router.reminders().get_by_id(reminder_id, &user.id) {
                schedule_delivery(router, &reminder)?;
            }
        }
    }

    router.sessions().reset(&user.id, session);
    Ok(Reply::Text(replies::updated(&render::event_line(
        &updated,
        user.zone(),
    ))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_choice_bounds() {
        assert_eq!(numbered_choice("1", 3), Some(0));
        assert_eq!(numbered_choice("3.", 3), Some(2));
        assert_eq!(numbered_choice("4", 3), None);
        assert_eq!(numbered_choice("0", 3), None);
        assert_eq!(numbered_choice("אחת", 3), None);
    }
}
