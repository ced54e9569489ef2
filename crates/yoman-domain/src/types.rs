use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use yoman_core::types::UserId;

/// Where an event entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    #[default]
    UserInput,
    Nlp,
    Api,
}

impl EventSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventSource::UserInput => "user_input",
            EventSource::Nlp => "nlp",
            EventSource::Api => "api",
        }
    }
}

impl std::str::FromStr for EventSource {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user_input" => Ok(EventSource::UserInput),
            "nlp" => Ok(EventSource::Nlp),
            "api" => Ok(EventSource::Api),
            other => Err(format!("unknown event source: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommentPriority {
    #[default]
    Normal,
    High,
    Urgent,
}

/// One entry of an event's `notes` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventComment {
    pub id: String,
    pub text: String,
    pub timestamp_utc: DateTime<Utc>,
    #[serde(default)]
    pub priority: CommentPriority,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder_id: Option<String>,
}

/// A calendar event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub user_id: UserId,
    pub title: String,
    pub start_ts_utc: DateTime<Utc>,
    pub end_ts_utc: Option<DateTime<Utc>>,
    pub location: Option<String>,
    pub source: EventSource,
    pub recurrence_rule: Option<String>,
    /// Always an array, never null.
    pub notes: Vec<EventComment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Primary,
    Companion,
}

impl ParticipantRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParticipantRole::Primary => "primary",
            ParticipantRole::Companion => "companion",
        }
    }
}

/// A person attached to an event. Unique per `(event_id, name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventParticipant {
    pub id: String,
    pub event_id: String,
    pub name: String,
    pub role: ParticipantRole,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStatus {
    #[default]
    Active,
    Paused,
    Done,
    Cancelled,
}

impl ReminderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderStatus::Active => "active",
            ReminderStatus::Paused => "paused",
            ReminderStatus::Done => "done",
            ReminderStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for ReminderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ReminderStatus::Active),
            "paused" => Ok(ReminderStatus::Paused),
            "done" => Ok(ReminderStatus::Done),
            "cancelled" => Ok(ReminderStatus::Cancelled),
            other => Err(format!("unknown reminder status: {other}")),
        }
    }
}

/// A scheduled reminder.
///
/// For recurring reminders `reminder_ts_utc` always holds the next
/// un-fired occurrence; `last_fired_ts_utc` together with the occurrence
/// instant is the at-most-once compare key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: String,
    pub user_id: UserId,
    pub title: String,
    pub reminder_ts_utc: DateTime<Utc>,
    pub recurrence_rule: Option<String>,
    pub lead_time_minutes: Option<i64>,
    /// The event this reminder was derived from, when created in an event
    /// context (lead-time reminders). Lets event deletion cancel it.
    pub event_id: Option<String>,
    pub status: ReminderStatus,
    pub last_fired_ts_utc: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Urgent,
    High,
    #[default]
    Normal,
    Low,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Urgent => "urgent",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
        }
    }
}

impl std::str::FromStr for TaskPriority {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "urgent" => Ok(TaskPriority::Urgent),
            "high" => Ok(TaskPriority::High),
            "normal" => Ok(TaskPriority::Normal),
            "low" => Ok(TaskPriority::Low),
            other => Err(format!("unknown task priority: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TaskStatus::Pending),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(format!("unknown task status: {other}")),
        }
    }
}

/// A to-do item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: UserId,
    pub title: String,
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub status: TaskStatus,
    pub due_ts_utc: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user-owned contact with alternative names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub id: String,
    pub user_id: UserId,
    pub name: String,
    pub phone: Option<String>,
    pub aliases: Vec<String>,
}

/// Direction of a logged transport message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::Inbound => "inbound",
            MessageDirection::Outbound => "outbound",
        }
    }
}
