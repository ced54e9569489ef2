use serde::{Deserialize, Serialize};

/// The enumerated intent set. Any unrecognized string a model returns
/// deserializes to `Unknown` instead of failing the whole response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateEvent,
    CreateReminder,
    CreateTask,
    ListEvents,
    ListReminders,
    ListTasks,
    SearchEvent,
    UpdateEvent,
    UpdateReminder,
    DeleteEvent,
    DeleteReminder,
    AddComment,
    ViewComments,
    DeleteComment,
    GenerateDashboard,
    Help,
    #[serde(other)]
    #[default]
    Unknown,
}

impl Intent {
    /// Destructive intents carry a higher confidence bar at the router.
    pub fn is_destructive(&self) -> bool {
        matches!(
            self,
            Intent::DeleteEvent
                | Intent::DeleteReminder
                | Intent::UpdateEvent
                | Intent::UpdateReminder
                | Intent::DeleteComment
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::CreateEvent => "create_event",
            Intent::CreateReminder => "create_reminder",
            Intent::CreateTask => "create_task",
            Intent::ListEvents => "list_events",
            Intent::ListReminders => "list_reminders",
            Intent::ListTasks => "list_tasks",
            Intent::SearchEvent => "search_event",
            Intent::UpdateEvent => "update_event",
            Intent::UpdateReminder => "update_reminder",
            Intent::DeleteEvent => "delete_event",
            Intent::DeleteReminder => "delete_reminder",
            Intent::AddComment => "add_comment",
            Intent::ViewComments => "view_comments",
            Intent::DeleteComment => "delete_comment",
            Intent::GenerateDashboard => "generate_dashboard",
            Intent::Help => "help",
            Intent::Unknown => "unknown",
        }
    }
}

/// Event fields extracted from the message.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct EventEntity {
    pub title: Option<String>,
    pub date_text: Option<String>,
    pub date_iso: Option<String>,
    pub time: Option<String>,
    pub duration_minutes: Option<i64>,
    pub location: Option<String>,
    pub contact_name: Option<String>,
    #[serde(default)]
    pub delete_all: bool,
    pub recurrence_text: Option<String>,
}

/// Reminder fields extracted from the message.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ReminderEntity {
    pub title: Option<String>,
    pub date_text: Option<String>,
    pub date_iso: Option<String>,
    pub time: Option<String>,
    pub lead_time_minutes: Option<i64>,
    pub recurrence_text: Option<String>,
}

/// Comment fields extracted from the message.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct CommentEntity {
    pub event_title: Option<String>,
    pub text: Option<String>,
    pub priority: Option<String>,
    pub reminder_time: Option<String>,
    /// One of "index", "last", "text".
    pub delete_by: Option<String>,
    pub delete_value: Option<String>,
}

/// The structured classification result.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NluResult {
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminder: Option<ReminderEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<CommentEntity>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub needs_clarification: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<NluResult>,
}

impl NluResult {
    pub fn unknown() -> Self {
        Self::default()
    }

    /// Validate a raw vendor JSON value into an `NluResult`.
    ///
    /// A non-conforming response becomes `unknown` with zero confidence
    /// instead of an error — one bad model must not sink the ensemble.
    pub fn from_model_json(value: serde_json::Value) -> Self {
        let mut result: NluResult = match serde_json::from_value(value) {
            Ok(r) => r,
            Err(_) => return Self::unknown(),
        };
        result.confidence = result.confidence.clamp(0.0, 1.0);
        result
    }
}
