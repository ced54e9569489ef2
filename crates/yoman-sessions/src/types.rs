use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed conversational state enumeration.
///
/// Transitions are deterministic: the router's flow handlers map
/// `(state, input)` to `(next_state, side_effect)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConvState {
    Unauthenticated,
    RegisteringName,
    RegisteringPin,
    AwaitingPin,
    #[default]
    MainMenu,
    AddingEventTitle,
    AddingEventDate,
    AddingEventTime,
    AddingEventLocation,
    AddingEventConfirm,
    AddingEventConflictConfirm,
    AddingReminderTitle,
    AddingReminderDate,
    AddingReminderRecurrence,
    AddingReminderConfirm,
    DeletingEventSelect,
    DeletingEventConfirm,
    UpdatingEventSelect,
    UpdatingEventField,
    UpdatingEventValue,
    AddingTaskTitle,
    AddingTaskDetails,
    AddingTaskPriority,
    AddingTaskDue,
    AddingTaskConfirm,
    ClarifyingIntent,
}

impl ConvState {
    /// Whether the user is mid-flow (anything but the menu and the
    /// pre-auth states the auth machine owns).
    pub fn in_flow(&self) -> bool {
        !matches!(
            self,
            ConvState::MainMenu
                | ConvState::Unauthenticated
                | ConvState::RegisteringName
                | ConvState::RegisteringPin
                | ConvState::AwaitingPin
        )
    }

    /// Inactivity timeout in minutes for this state.
    pub fn timeout_minutes(&self) -> i64 {
        30
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One entry of the bounded recent-conversation window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

/// In-flight entity fragments carried between prompts.
///
/// One bag for all flows; each flow reads and writes only its own fields
/// and [`FlowContext::clear`] wipes everything on flow exit.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FlowContext {
    // Event creation / update.
    pub event_title: Option<String>,
    pub event_start_utc: Option<DateTime<Utc>>,
    pub event_has_time: bool,
    pub event_location: Option<String>,
    pub event_recurrence: Option<String>,
    pub event_contact: Option<String>,
    /// Conflicting event summaries pending the user's go-ahead.
    pub overlap_summaries: Vec<String>,
    /// Target of a select flow (delete / update).
    pub selected_event_id: Option<String>,
    /// Candidate event ids presented for numbered selection.
    pub candidate_event_ids: Vec<String>,
    /// Field name chosen in the update flow.
    pub update_field: Option<String>,

    // Reminder creation.
    pub reminder_title: Option<String>,
    pub reminder_at_utc: Option<DateTime<Utc>>,
    pub reminder_recurrence: Option<String>,
    pub reminder_lead_minutes: Option<i64>,

    // Task creation.
    pub task_title: Option<String>,
    pub task_description: Option<String>,
    pub task_priority: Option<String>,
    pub task_due_utc: Option<DateTime<Utc>>,

    // Clarification: serialized NLU candidates awaiting a numbered pick.
    pub clarify_candidates: Vec<String>,
    pub clarify_labels: Vec<String>,

    // Registration scratch.
    pub pending_name: Option<String>,
}

impl FlowContext {
    pub fn clear(&mut self) {
        *self = FlowContext::default();
    }
}

/// The per-user session blob stored in the ephemeral store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub state: ConvState,
    pub context: FlowContext,
    pub last_activity: DateTime<Utc>,
    /// Bounded window of the most recent turns (max 20).
    pub recent: Vec<Turn>,
    /// Event the user most recently quoted/replied to, if any.
    pub quoted_event_id: Option<String>,
}

impl Session {
    pub const MAX_RECENT_TURNS: usize = 20;

    pub fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            state: ConvState::MainMenu,
            context: FlowContext::default(),
            last_activity: now,
            recent: Vec::new(),
            quoted_event_id: None,
        }
    }

    /// The last `n` turns, oldest first — fed to the NLU prompt.
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.recent.len().saturating_sub(n);
        &self.recent[start..]
    }
}
