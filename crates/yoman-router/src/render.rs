//! Rendering of domain objects into user-zone Hebrew text.

use chrono_tz::Tz;

use yoman_core::clock::format_local;
use yoman_domain::{Event, Reminder, Task, TaskPriority};

/// One-line event summary: title, local time, optional location.
pub fn event_line(event: &Event, zone: Tz) -> String {
    let mut line = format!("{} — {}", event.title, format_local(event.start_ts_utc, zone));
    if let Some(location) = &event.location {
        line.push_str(&format!(" @ {location}"));
    }
    if event.recurrence_rule.is_some() {
        line.push_str(" 🔁");
    }
    line
}

pub fn event_list(events: &[Event], zone: Tz) -> String {
    let mut out = String::from("האירועים שלך:\n");
    for event in events {
        out.push_str(&format!("📅 {}\n", event_line(event, zone)));
    }
    out.trim_end().to_string()
}

pub fn reminder_line(reminder: &Reminder, zone: Tz) -> String {
    let mut line = format!(
        "{} — {}",
        reminder.title,
        format_local(reminder.reminder_ts_utc, zone)
    );
    if reminder.recurrence_rule.is_some() {
        line.push_str(" 🔁");
    }
    line
}

pub fn reminder_list(reminders: &[Reminder], zone: Tz) -> String {
    let mut out = String::from("התזכורות שלך:\n");
    for reminder in reminders {
        out.push_str(&format!("⏰ {}\n", reminder_line(reminder, zone)));
    }
    out.trim_end().to_string()
}

fn priority_tag(priority: TaskPriority) -> &'static str {
    match priority {
        TaskPriority::Urgent => "🔴",
        TaskPriority::High => "🟠",
        TaskPriority::Normal => "🟢",
        TaskPriority::Low => "⚪",
    }
}

pub fn task_line(task: &Task, zone: Tz) -> String {
    let mut line = format!("{} {}", priority_tag(task.priority), task.title);
    if let Some(due) = task.due_ts_utc {
        line.push_str(&format!(" (עד {})", format_local(due, zone)));
    }
    line
}

pub fn task_list(tasks: &[Task], zone: Tz) -> String {
    let mut out = String::from("המשימות הפתוחות שלך:\n");
    for task in tasks {
        out.push_str(&format!("{}\n", task_line(task, zone)));
    }
    out.trim_end().to_string()
}

/// The morning-summary body: today's events, then open tasks.
pub fn morning_summary(
    greeting: &str,
    events: &[Event],
    tasks: Option<&[Task]>,
    zone: Tz,
) -> String {
    let mut out = format!("{greeting}\n");
    if events.is_empty() {
        out.push_str("אין אירועים היום.\n");
    } else {
        out.push_str("היום ביומן:\n");
        for event in events {
            out.push_str(&format!("📅 {}\n", event_line(event, zone)));
        }
    }
    if let Some(tasks) = tasks {
        if !tasks.is_empty() {
            out.push_str("משימות פתוחות:\n");
            for task in tasks {
                out.push_str(&format!("{}\n", task_line(task, zone)));
            }
        }
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use yoman_core::types::UserId;
    use yoman_domain::{EventSource, ReminderStatus, TaskStatus};

    fn zone() -> Tz {
        chrono_tz::Asia::Jerusalem
    }

    fn event(title: &str, start: &str) -> Event {
        Event {
            id: "e".to_string(),
            user_id: UserId::from("u"),
            title: title.to_string(),
            start_ts_utc: start.parse().unwrap(),
            end_ts_utc: None,
            location: None,
            source: EventSource::Nlp,
            recurrence_rule: None,
            notes: vec![],
            created_at: start.parse().unwrap(),
            updated_at: start.parse().unwrap(),
        }
    }

    #[test]
    fn event_line_renders_local_time() {
        let e = event("פגישה עם דני", "2025-10-11T12:00:00Z");
        assert_eq!(event_line(&e, zone()), "פגישה עם דני — 11/10/2025 15:00");
    }

    #[test]
    fn recurring_reminder_marked() {
        let r = Reminder {
            id: "r".to_string(),
            user_id: UserId::from("u"),
            title: "תרופה".to_string(),
            reminder_ts_utc: "2025-10-11T05:00:00Z".parse().unwrap(),
            recurrence_rule: Some("FREQ=DAILY".to_string()),
            lead_time_minutes: None,
            event_id: None,
            status: ReminderStatus::Active,
            last_fired_ts_utc: None,
            created_at: "2025-10-10T07:00:00Z".parse().unwrap(),
            updated_at: "2025-10-10T07:00:00Z".parse().unwrap(),
        };
        assert!(reminder_line(&r, zone()).ends_with("🔁"));
    }

    #[test]
    fn morning_summary_with_tasks() {
        let events = vec![event("ישיבת צוות", "2025-10-11T07:00:00Z")];
        let tasks = vec![Task {
            id: "t".to_string(),
            user_id: UserId::from("u"),
            title: "לשלם חשבון".to_string(),
            description: None,
            priority: TaskPriority::High,
            status: TaskStatus::Pending,
            due_ts_utc: None,
            created_at: "2025-10-10T07:00:00Z".parse().unwrap(),
            updated_at: "2025-10-10T07:00:00Z".parse().unwrap(),
        }];
        let text = morning_summary("בוקר טוב!", &events, Some(&tasks), zone());
        assert!(text.contains("ישיבת צוות"));
        assert!(text.contains("לשלם חשבון"));
    }
}
