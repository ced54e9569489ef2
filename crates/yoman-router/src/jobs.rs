//! Scheduled-job execution: reminder delivery, morning summaries and the
//! daily rollout. Runs on the scheduler's worker pool; nothing here ever
//! replies to an inbound message.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use tracing::{debug, info, warn};

use yoman_core::clock::Clock;
use yoman_core::config::SchedulerConfig;
use yoman_core::types::UserId;
use yoman_domain::{EventService, FireOutcome, MessageDirection, MessageLog, ReminderService, TaskService};
use yoman_scheduler::{Job, JobError, JobHandler, JobKind, SchedulerHandle};
use yoman_transport::Egress;
use yoman_users::UserService;

use crate::{render, replies};

/// Executes fired jobs against the domain services and the egress.
pub struct DeliveryHandler {
    pub clock: Arc<dyn Clock>,
    pub users: Arc<UserService>,
    pub events: Arc<EventService>,
    pub reminders: Arc<ReminderService>,
    pub tasks: Arc<TaskService>,
    pub message_log: Arc<MessageLog>,
    pub scheduler: SchedulerHandle,
    pub egress: Arc<Egress>,
    pub config: SchedulerConfig,
}

#[async_trait]
impl JobHandler for DeliveryHandler {
    async fn handle(&self, job: &Job) -> Result<(), JobError> {
        match &job.kind {
            JobKind::ReminderDelivery {
                reminder_id,
                user_id,
                occurrence_utc,
            } => {
                self.deliver_reminder(reminder_id, &UserId::from(user_id.as_str()), *occurrence_utc)
                    .await
            }
            JobKind::MorningSummary { user_id } => {
                self.send_morning_summary(&UserId::from(user_id.as_str()))
                    .await
            }
            JobKind::DailyRollout => self.daily_rollout().await,
        }
    }
}

impl DeliveryHandler {
    /// Deliver one reminder occurrence.
    ///
    /// The compare-and-set runs BEFORE the send: a crash between the two
    /// loses at most one message but can never deliver twice, which is the
    /// at-most-once contract.
    async fn deliver_reminder(
        &self,
        reminder_id: &str,
        user_id: &UserId,
        occurrence_utc: DateTime<Utc>,
    ) -> Result<(), JobError> {
        let user = self
            .users
            .get_by_id(user_id)
            .map_err(|e| JobError::Permanent(format!("user lookup: {e}")))?;

        let reminder = match self.reminders.get_by_id(reminder_id, user_id) {
            Ok(r) => r,
            // Deleted/cancelled since enqueueing: nothing to deliver.
            Err(yoman_domain::DomainError::NotFound) => return Ok(()),
            Err(e) => return Err(JobError::Transient(format!("reminder lookup: {e}"))),
        };

        let outcome = self
            .reminders
            .mark_fired(reminder_id, occurrence_utc, user.zone())
            .map_err(|e| JobError::Transient(format!("mark_fired: {e}")))?;

        let next = match outcome {
            FireOutcome::AlreadyFired => {
                // A previous worker (possibly one that crashed mid-flight)
                // already owns this occurrence. Re-chain the advanced
                // occurrence — enqueueing is idempotent — and stop.
                if let Ok(current) = self.reminders.get_by_id(reminder_id, user_id) {
                    if current.status == yoman_domain::ReminderStatus::Active {
                        let _ = self.scheduler.enqueue(
                            JobKind::ReminderDelivery {
                                reminder_id: reminder_id.to_string(),
                                user_id: user_id.as_str().to_string(),
                                occurrence_utc: current.reminder_ts_utc,
                            },
                            current.reminder_ts_utc,
                        );
                    }
                }
                debug!(reminder_id, "occurrence already delivered — skipping");
                return Ok(());
            }
            FireOutcome::Won { next_occurrence } => next_occurrence,
        };

        // Chain the next occurrence before the send so a send crash does
        // not break the recurrence.
        if let Some(next_at) = next {
            let _ = self.scheduler.enqueue(
                JobKind::ReminderDelivery {
                    reminder_id: reminder_id.to_string(),
                    user_id: user_id.as_str().to_string(),
                    occurrence_utc: next_at,
                },
                next_at,
            );
        }

        let text = replies::reminder_fire(&reminder.title);
        match self.egress.send_text(&user.phone, &text).await {
            Ok(_) => {
                self.message_log
                    .append(Some(user_id), MessageDirection::Outbound, &text);
                info!(reminder_id, occurrence = %occurrence_utc, "reminder delivered");
                Ok(())
            }
            Err(e) => {
                // The CAS already advanced; retrying would be a double
                // delivery. At-most-once accepts the loss.
                warn!(reminder_id, error = %e, "reminder send failed after fire mark");
                Ok(())
            }
        }
    }

    async fn send_morning_summary(&self, user_id: &UserId) -> Result<(), JobError> {
        let user = self
            .users
            .get_by_id(user_id)
            .map_err(|e| JobError::Permanent(format!("user lookup: {e}")))?;
        let zone = user.zone();
        let today = self.clock.now_utc().with_timezone(&zone).date_naive();

        let events = self
            .events
            .occurrences_for_day(user_id, today, zone)
            .map_err(|e| JobError::Transient(format!("events: {e}")))?;
        let tasks = if user.morning_notification.include_memos {
            Some(
                self.tasks
                    .list_open(user_id)
                    .map_err(|e| JobError::Transient(format!("tasks: {e}")))?,
            )
        } else {
            None
        };

        // Nothing on the calendar and no open tasks: stay silent.
        if events.is_empty() && tasks.as_ref().is_none_or(|t| t.is_empty()) {
            debug!(user_id = %user_id, "morning summary skipped — nothing to report");
            return Ok(());
        }

        let text = render::morning_summary(
            &replies::morning_greeting(&user.name),
            &events,
            tasks.as_deref(),
            zone,
        );
        self.egress
            .send_text(&user.phone, &text)
            .await
            .map_err(|e| JobError::Transient(format!("send: {e}")))?;
        self.message_log
            .append(Some(user_id), MessageDirection::Outbound, &text);
        Ok(())
    }

    /// Fan out today's morning-summary jobs and re-enqueue tomorrow's
    /// rollout.
    async fn daily_rollout(&self) -> Result<(), JobError> {
        let now = self.clock.now_utc();
        let users = self
            .users
            .list_morning_enabled()
            .map_err(|e| JobError::Transient(format!("user scan: {e}")))?;

        let mut scheduled = 0usize;
        for user in users {
            let zone = user.zone();
            let local_now = now.with_timezone(&zone);
            let weekday = local_now.weekday().num_days_from_sunday() as u8;
            if !user.morning_notification.wants_day(weekday) {
                continue;
            }
            let Some((hour, minute)) = user.morning_notification.local_time() else {
                warn!(user_id = %user.id, "unparseable morning time — skipped");
                continue;
            };
            let Some(local_at) = zone
                .with_ymd_and_hms(
                    local_now.year(),
                    local_now.month(),
                    local_now.day(),
                    hour,
                    minute,
                    0,
                )
                .earliest()
            else {
                continue;
            };
            let at = local_at.with_timezone(&Utc);
            // A configured time already past today is skipped; tomorrow's
            // rollout will pick it up again.
            if at <= now {
                continue;
            }
            let _ = self.scheduler.enqueue(
                JobKind::MorningSummary {
                    user_id: user.id.as_str().to_string(),
                },
                at,
            );
            scheduled += 1;
        }

        let next = next_rollout_at(now, self.config.daily_hour_utc);
        let _ = self.scheduler.enqueue(JobKind::DailyRollout, next);
        info!(scheduled, next_rollout = %next, "daily rollout complete");
        Ok(())
    }
}

/// The next daily-rollout instant strictly after `now`.
pub fn next_rollout_at(now: DateTime<Utc>, hour_utc: u8) -> DateTime<Utc> {
    let candidate = now
        .date_naive()
        .and_hms_opt(u32::from(hour_utc.min(23)), 0, 0)
        .unwrap()
        .and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_rollout_same_day_before_hour() {
        let now: DateTime<Utc> = "2025-10-10T07:00:00Z".parse().unwrap();
        assert_eq!(
            next_rollout_at(now, 9).to_rfc3339(),
            "2025-10-10T09:00:00+00:00"
        );
    }

    #[test]
    fn next_rollout_rolls_to_tomorrow_after_hour() {
        let now: DateTime<Utc> = "2025-10-10T10:00:00Z".parse().unwrap();
        assert_eq!(
            next_rollout_at(now, 9).to_rfc3339(),
            "2025-10-11T09:00:00+00:00"
        );
    }
}
