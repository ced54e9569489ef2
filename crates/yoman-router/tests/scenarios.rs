//! End-to-end pipeline scenarios: a scripted NLU model, a fixed clock at
//! Friday 2025-10-10 10:00 Asia/Jerusalem, in-memory SQLite and the
//! loopback transport.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use yoman_core::clock::{Clock, FixedClock};
use yoman_core::config::YomanConfig;
use yoman_core::message::InboundMessage;
use yoman_core::types::Phone;
use yoman_domain::{
    ContactService, CreateOutcome, EventService, EventSource, MessageLog, NewEvent, NewReminder,
    ReminderService, ReminderStatus, TaskPriority, TaskService,
};
use yoman_nlu::prompt::NluPrompt;
use yoman_nlu::provider::{IntentModel, ModelReply, ProviderError};
use yoman_nlu::{EventEntity, Intent, NluEnsemble, NluResult, ReminderEntity};
use yoman_router::{DeliveryHandler, Router, RouterDeps};
use yoman_scheduler::{JobHandler, JobKind, SchedulerHandle};
use yoman_sessions::SessionManager;
use yoman_transport::{Egress, LoopbackTransport};
use yoman_users::{AuthManager, UserService};

/// NLU model fed from a queue of pre-scripted results.
struct ScriptedModel {
    replies: Mutex<VecDeque<NluResult>>,
}

#[async_trait]
impl IntentModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(&self, _prompt: &NluPrompt) -> Result<ModelReply, ProviderError> {
        let result = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        Ok(ModelReply {
            result,
            tokens_in: 10,
            tokens_out: 5,
        })
    }
}

struct Harness {
    clock: Arc<FixedClock>,
    router: Arc<Router>,
    transport: Arc<LoopbackTransport>,
    scripted: Arc<ScriptedModel>,
    users: Arc<UserService>,
    events: Arc<EventService>,
    reminders: Arc<ReminderService>,
    tasks: Arc<TaskService>,
    sessions: Arc<SessionManager>,
    scheduler: SchedulerHandle,
    handler: DeliveryHandler,
    phone: Phone,
    counter: AtomicU64,
}

impl Harness {
    /// Friday 2025-10-10 10:00 Asia/Jerusalem.
    fn now() -> DateTime<Utc> {
        "2025-10-10T07:00:00Z".parse().unwrap()
    }

    fn new() -> Self {
        let clock = Arc::new(FixedClock::new(Self::now()));
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let config = YomanConfig::default();

        let kv = Arc::new(yoman_kv::MemoryKv::new(clock_dyn.clone()));
        let sessions = Arc::new(SessionManager::new(kv.clone(), clock_dyn.clone()));
        let users = Arc::new(
            UserService::new(Connection::open_in_memory().unwrap(), clock_dyn.clone()).unwrap(),
        );
        let auth = Arc::new(AuthManager::new(
            users.clone(),
            kv.clone(),
            clock_dyn.clone(),
            config.auth.clone(),
        ));

        let domain_db = yoman_domain::open_shared(Connection::open_in_memory().unwrap()).unwrap();
        let events = Arc::new(EventService::new(
            domain_db.clone(),
            clock_dyn.clone(),
            config.events.clone(),
        ));
        let reminders = Arc::new(ReminderService::new(domain_db.clone(), clock_dyn.clone()));
        let tasks = Arc::new(TaskService::new(domain_db.clone(), clock_dyn.clone()));
        let contacts = Arc::new(ContactService::new(domain_db.clone()));
        let message_log = Arc::new(MessageLog::new(domain_db, clock_dyn.clone()));

        let transport = Arc::new(LoopbackTransport::new());
        let egress = Arc::new(Egress::new(
            transport.clone(),
            kv.clone(),
            config.transport.clone(),
        ));

        let scripted = Arc::new(ScriptedModel {
            replies: Mutex::new(VecDeque::new()),
        });
        let nlu = Arc::new(NluEnsemble::new(
            vec![scripted.clone() as Arc<dyn IntentModel>],
            std::time::Duration::from_millis(config.nlu.deadline_ms),
            clock_dyn.clone(),
            None,
            None,
        ));

        let scheduler =
            SchedulerHandle::new(Connection::open_in_memory().unwrap(), clock_dyn.clone()).unwrap();

        let handler = DeliveryHandler {
            clock: clock_dyn.clone(),
            users: users.clone(),
            events: events.clone(),
            reminders: reminders.clone(),
            tasks: tasks.clone(),
            message_log: message_log.clone(),
            scheduler: scheduler.clone(),
            egress: egress.clone(),
            config: config.scheduler.clone(),
        };

        let router = Arc::new(Router::new(RouterDeps {
            config,
            clock: clock_dyn,
            kv,
            sessions: sessions.clone(),
            auth,
            users: users.clone(),
            events: events.clone(),
            reminders: reminders.clone(),
            tasks: tasks.clone(),
            contacts,
            message_log,
            nlu,
            scheduler: scheduler.clone(),
            egress,
        }));

        Self {
            clock,
            router,
            transport,
            scripted,
            users,
            events,
            reminders,
            tasks,
            sessions,
            scheduler,
            handler,
            phone: Phone::normalize("+972541234567").unwrap(),
            counter: AtomicU64::new(0),
        }
    }

    fn script(&self, result: NluResult) {
        self.scripted.replies.lock().unwrap().push_back(result);
    }

    /// Send one inbound message and return the replies it produced.
    async fn send(&self, text: &str) -> Vec<String> {
        self.send_with_id(text, &format!("m-{}", self.counter.fetch_add(1, Ordering::SeqCst)))
            .await
    }

    async fn send_with_id(&self, text: &str, message_id: &str) -> Vec<String> {
        let before = self.transport.texts_to(&self.phone).len();
        self.router
            .handle(InboundMessage {
                conversation_id: "c-1".to_string(),
                sender_id: self.phone.clone(),
                text: text.to_string(),
                message_id: message_id.to_string(),
                received_at: self.clock.now_utc(),
            })
            .await;
        self.transport.texts_to(&self.phone)[before..].to_vec()
    }

    /// Register the test user through the real flow and return their id.
    async fn register(&self) -> yoman_core::types::UserId {
        self.send("שלום").await;
        self.send("דנה").await;
        self.send("1234").await;
        self.users
            .get_by_phone(&self.phone)
            .unwrap()
            .expect("registered")
            .id
    }

    fn user(&self) -> yoman_users::User {
        self.users.get_by_phone(&self.phone).unwrap().unwrap()
    }

    fn seed_event(&self, title: &str, start: &str) -> yoman_domain::Event {
        let user = self.user();
        match self
            .events
            .create(
                NewEvent {
                    user_id: user.id,
                    title: title.to_string(),
                    start_ts_utc: start.parse().unwrap(),
                    end_ts_utc: None,
                    location: None,
                    source: EventSource::UserInput,
                    recurrence_rule: None,
                },
                true,
            )
            .unwrap()
        {
            CreateOutcome::Created(e) => e,
            CreateOutcome::Conflict { .. } => unreachable!(),
        }
    }

    fn quote_event(&self, event_id: &str) {
        let user = self.user();
        let (mut session, _) = self.sessions.load(&user.id);
        session.quoted_event_id = Some(event_id.to_string());
        self.sessions.save(&user.id, &session);
    }
}

fn create_event_result(title: &str, date_text: Option<&str>, time: Option<&str>, contact: Option<&str>) -> NluResult {
    NluResult {
        intent: Intent::CreateEvent,
        confidence: 0.95,
        event: Some(EventEntity {
            title: Some(title.to_string()),
            date_text: date_text.map(String::from),
            time: time.map(String::from),
            contact_name: contact.map(String::from),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn simple_result(intent: Intent) -> NluResult {
    NluResult {
        intent,
        confidence: 0.95,
        ..Default::default()
    }
}

// --- registration & auth ----------------------------------------------------

#[tokio::test]
async fn registration_flow_end_to_end() {
    let h = Harness::new();
    let replies = h.send("שלום").await;
    assert!(replies[0].contains("איך קוראים לך"));

    let replies = h.send("דנה").await;
    assert!(replies[0].contains("PIN"));

    let replies = h.send("1234").await;
    assert!(replies.iter().any(|r| r.contains("נרשמת בהצלחה")));
    assert!(h.users.get_by_phone(&h.phone).unwrap().is_some());
}

#[tokio::test]
async fn unauthenticated_hebrew_non_greeting_is_ignored() {
    let h = Harness::new();
    let replies = h.send("מה יש לי השבוע").await;
    assert!(replies.is_empty());
}

#[tokio::test]
async fn unauthenticated_english_gets_one_invite() {
    let h = Harness::new();
    let replies = h.send("what can you do?").await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("Yoman"));
    // Second non-greeting message: silence.
    let replies = h.send("hello? anyone there?").await;
    assert!(replies.is_empty() || replies[0].contains("איך קוראים לך"));
}

#[tokio::test]
async fn wrong_pin_three_times_locks_out() {
    let h = Harness::new();
    h.register().await;
    h.send("/logout").await;

    // Returning user is asked for the PIN.
    let replies = h.send("שלום").await;
    assert!(replies[0].contains("PIN"));

    h.send("9999").await;
    h.send("9999").await;
    let replies = h.send("9999").await;
    assert!(replies[0].contains("ננעל"));

    // Locked out: even the correct PIN is silently refused.
    let replies = h.send("1234").await;
    assert!(replies.is_empty());

    // After the window, login works again.
    h.clock.advance(chrono::Duration::minutes(16));
    let replies = h.send("1234").await;
    assert!(replies.iter().any(|r| r.contains("ברוך שובך")));
}

// --- router phases ----------------------------------------------------------

#[tokio::test]
async fn duplicate_message_id_is_dropped() {
    let h = Harness::new();
    h.register().await;
    h.script(simple_result(Intent::Help));
    let first = h.send_with_id("עזרה", "dup-1").await;
    assert!(!first.is_empty());
    let second = h.send_with_id("עזרה", "dup-1").await;
    assert!(second.is_empty());
}

#[tokio::test]
async fn hash_message_becomes_bug_report_with_silent_ack() {
    let h = Harness::new();
    h.register().await;
    let replies = h.send("# הכפתור לא עובד").await;
    assert!(replies.is_empty());
    let reactions = h.transport.reactions();
    assert_eq!(reactions.len(), 1);
    assert_eq!(reactions[0].emoji, "🐛");
}

#[tokio::test]
async fn slash_commands_work() {
    let h = Harness::new();
    h.register().await;
    let replies = h.send("/help").await;
    assert!(replies[0].contains("/menu"));
    let replies = h.send("/menu").await;
    assert!(replies[0].contains("במה אפשר לעזור"));
}

#[tokio::test]
async fn rate_limit_throttles_once() {
    let h = Harness::new();
    h.register().await;
    let limit = 20;
    for _ in 0..limit {
        h.script(simple_result(Intent::Help));
        h.send("עזרה").await;
    }
    let replies = h.send("עוד אחת").await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].contains("לאט"));
    // Further excess is silent.
    let replies = h.send("ועוד").await;
    assert!(replies.is_empty());
}

// --- §8 scenarios -----------------------------------------------------------

/// Scenario 1: simple event creation.
#[tokio::test]
async fn scenario_simple_event_creation() {
    let h = Harness::new();
    let user_id = h.register().await;

    h.script(create_event_result(
        "פגישה עם דני",
        Some("מחר"),
        Some("ב-3"),
        Some("דני"),
    ));
    let replies = h.send("קבע פגישה עם דני מחר ב-3").await;

    assert!(replies.iter().any(|r| r.contains("11/10/2025 15:00")), "{replies:?}");

    let events = h.events.list_upcoming(&user_id, None).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "פגישה עם דני");
    assert_eq!(
        events[0].start_ts_utc.to_rfc3339(),
        "2025-10-11T12:00:00+00:00"
    );

    // The contact was extracted and attached.
    let participants = h
        .events
        .list_participants(&events[0].id, &user_id)
        .unwrap();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].name, "דני");
}

/// Scenario 2: bare-number time disambiguation — 21 is 21:00 today, not
/// November 21st.
#[tokio::test]
async fn scenario_bare_number_time() {
    let h = Harness::new();
    let user_id = h.register().await;

    h.script(create_event_result("פגישה עם דימה", None, Some("21"), None));
    h.send("פגישה ב 21 עם דימה").await;

    let events = h.events.list_upcoming(&user_id, None).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].start_ts_utc.to_rfc3339(),
        "2025-10-10T18:00:00+00:00"
    );
}

/// Scenario 3: week-range query lists only this week's events, ordered.
#[tokio::test]
async fn scenario_week_range_query() {
    let h = Harness::new();
    h.register().await;

    let inside_late = h.seed_event("מאוחר בשבוע", "2025-10-11T08:00:00Z");
    let inside_early = h.seed_event("מוקדם בשבוע", "2025-10-10T12:00:00Z");
    // Sunday Oct 12 local — next week.
    let outside = h.seed_event("שבוע הבא", "2025-10-13T08:00:00Z");

    h.script(simple_result(Intent::ListEvents));
    let replies = h.send("מה יש לי השבוע?").await;
    let body = replies.join("\n");
    assert!(body.contains(&inside_early.title));
    assert!(body.contains(&inside_late.title));
    assert!(!body.contains(&outside.title));

    // Ascending by start: the earlier event is listed first.
    let early_pos = body.find(&inside_early.title).unwrap();
    let late_pos = body.find(&inside_late.title).unwrap();
    assert!(early_pos < late_pos);
}

/// Scenario 4: lead-time reminder from a quoted event.
#[tokio::test]
async fn scenario_lead_time_from_quoted_event() {
    let h = Harness::new();
    let user_id = h.register().await;
    let event = h.seed_event("חתונה", "2025-11-08T07:00:00Z");
    h.quote_event(&event.id);

    h.script(simple_result(Intent::CreateReminder));
    let replies = h.send("תזכיר לי יום לפני").await;
    assert!(replies.iter().any(|r| r.contains("תזכורת נקבעה")));

    let reminders = h.reminders.list(&user_id).unwrap();
    assert_eq!(reminders.len(), 1);
    assert_eq!(
        reminders[0].reminder_ts_utc.to_rfc3339(),
        "2025-11-07T07:00:00+00:00"
    );
    assert_eq!(reminders[0].lead_time_minutes, Some(1440));
    assert_eq!(reminders[0].event_id.as_deref(), Some(event.id.as_str()));
}

/// Scenario 5: numeric-hours lead time.
#[tokio::test]
async fn scenario_numeric_hours_lead_time() {
    let h = Harness::new();
    let user_id = h.register().await;
    // Event at 11:00 local on Oct 20 (08:00 UTC).
    let event = h.seed_event("תור לרופא", "2025-10-20T08:00:00Z");
    h.quote_event(&event.id);

    h.script(NluResult {
        intent: Intent::CreateReminder,
        confidence: 0.9,
        reminder: Some(ReminderEntity {
            lead_time_minutes: Some(300),
            ..Default::default()
        }),
        ..Default::default()
    });
    h.send("תזכיר לי 5 שעות לפני").await;

    let reminders = h.reminders.list(&user_id).unwrap();
    assert_eq!(reminders[0].lead_time_minutes, Some(300));
    assert_eq!(
        reminders[0].reminder_ts_utc.to_rfc3339(),
        "2025-10-20T03:00:00+00:00"
    );
}

/// Scenario 6: destructive ambiguity needs an explicit pick.
#[tokio::test]
async fn scenario_destructive_ambiguity() {
    let h = Harness::new();
    let user_id = h.register().await;
    h.seed_event("פגישה", "2025-10-11T08:00:00Z");
    h.seed_event("פגישה", "2025-10-12T08:00:00Z");

    h.script(NluResult {
        intent: Intent::DeleteEvent,
        confidence: 0.9,
        event: Some(EventEntity {
            title: Some("פגישה".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    });
    let replies = h.send("מחק פגישה").await;
    assert!(replies[0].contains("1."));
    assert!(replies[0].contains("2."));
    // Nothing deleted yet.
    assert_eq!(h.events.list_upcoming(&user_id, None).unwrap().len(), 2);

    h.send("1").await;
    let replies = h.send("כן").await;
    assert!(replies.iter().any(|r| r.contains("נמחק")));
    assert_eq!(h.events.list_upcoming(&user_id, None).unwrap().len(), 1);
}

/// Scenario 7: at-most-once delivery across a simulated crash + restart.
#[tokio::test]
async fn scenario_at_most_once_across_restart() {
    let h = Harness::new();
    let user_id = h.register().await;
    let user = h.user();

    let at: DateTime<Utc> = "2025-10-10T08:00:00Z".parse().unwrap();
    let reminder = h
        .reminders
        .create(NewReminder {
            user_id: user_id.clone(),
            title: "תרופה".to_string(),
            reminder_ts_utc: at,
            recurrence_rule: Some("FREQ=DAILY".to_string()),
            lead_time_minutes: None,
            event_id: None,
        })
        .unwrap();
    let job = h
        .scheduler
        .enqueue(
            JobKind::ReminderDelivery {
                reminder_id: reminder.id.clone(),
                user_id: user_id.as_str().to_string(),
                occurrence_utc: at,
            },
            at,
        )
        .unwrap();

    // Crash: the compare-and-set succeeded but send_text never ran.
    h.reminders.mark_fired(&reminder.id, at, user.zone()).unwrap();
    let sent_before = h.transport.texts_to(&h.phone).len();

    // Restart: the stale job runs again.
    h.clock.advance(chrono::Duration::hours(1));
    h.handler.handle(&job).await.unwrap();

    // No second delivery for (R, T).
    assert_eq!(h.transport.texts_to(&h.phone).len(), sent_before);

    let stored = h.reminders.get_by_id(&reminder.id, &user_id).unwrap();
    assert_eq!(stored.last_fired_ts_utc, Some(at));
    assert_eq!(stored.status, ReminderStatus::Active);
    // The next occurrence was (re-)scheduled.
    let next_at: DateTime<Utc> = "2025-10-11T08:00:00Z".parse().unwrap();
    assert_eq!(stored.reminder_ts_utc, next_at);
    let pending = h.scheduler.list_pending().unwrap();
    assert!(pending.iter().any(|j| matches!(
        &j.kind,
        JobKind::ReminderDelivery { occurrence_utc, .. } if *occurrence_utc == next_at
    )));
}

/// Normal delivery path for completeness: fire → send → chain next.
#[tokio::test]
async fn reminder_delivery_happy_path() {
    let h = Harness::new();
    let user_id = h.register().await;

    let at: DateTime<Utc> = "2025-10-10T08:00:00Z".parse().unwrap();
    let reminder = h
        .reminders
        .create(NewReminder {
            user_id: user_id.clone(),
            title: "להתקשר לאמא".to_string(),
            reminder_ts_utc: at,
            recurrence_rule: None,
            lead_time_minutes: None,
            event_id: None,
        })
        .unwrap();
    let job = h
        .scheduler
        .enqueue(
            JobKind::ReminderDelivery {
                reminder_id: reminder.id.clone(),
                user_id: user_id.as_str().to_string(),
                occurrence_utc: at,
            },
            at,
        )
        .unwrap();

    h.clock.advance(chrono::Duration::hours(1));
    h.handler.handle(&job).await.unwrap();

    let sent = h.transport.texts_to(&h.phone);
    assert!(sent.iter().any(|t| t.contains("להתקשר לאמא")));
    let stored = h.reminders.get_by_id(&reminder.id, &user_id).unwrap();
    assert_eq!(stored.status, ReminderStatus::Done);

    // Re-running the same job is a no-op (no duplicate send).
    let count = sent.len();
    h.handler.handle(&job).await.unwrap();
    assert_eq!(h.transport.texts_to(&h.phone).len(), count);
}

// --- clarification ----------------------------------------------------------

#[tokio::test]
async fn low_confidence_enters_clarification_and_executes_pick() {
    let h = Harness::new();
    h.register().await;
    h.seed_event("ריצה בפארק", "2025-10-11T05:00:00Z");

    // Split vote: two candidates below the execution bar.
    h.script(NluResult {
        intent: Intent::ListEvents,
        confidence: 0.55,
        needs_clarification: true,
        candidates: vec![
            simple_result(Intent::ListEvents),
            simple_result(Intent::DeleteEvent),
        ],
        ..Default::default()
    });
    let replies = h.send("פגישות").await;
    assert!(replies[0].contains("למה התכוונת"));
    assert!(replies[0].contains("1."));

    // Picking 1 executes list_events without re-classification.
    let replies = h.send("1").await;
    assert!(replies.iter().any(|r| r.contains("ריצה בפארק")));
}

#[tokio::test]
async fn destructive_below_threshold_is_gated() {
    let h = Harness::new();
    let user_id = h.register().await;
    h.seed_event("פגישה חשובה", "2025-10-11T08:00:00Z");

    h.script(NluResult {
        intent: Intent::DeleteEvent,
        confidence: 0.55, // above create bar, below destructive bar
        event: Some(EventEntity {
            title: Some("פגישה חשובה".to_string()),
            ..Default::default()
        }),
        ..Default::default()
    });
    let replies = h.send("מחק את הפגישה").await;
    assert!(replies[0].contains("למה התכוונת"));
    assert_eq!(h.events.list_upcoming(&user_id, None).unwrap().len(), 1);
}

// --- conflict round-trip ----------------------------------------------------

#[tokio::test]
async fn overlap_requires_explicit_confirmation() {
    let h = Harness::new();
    let user_id = h.register().await;
    h.seed_event("קיים", "2025-10-11T12:00:00Z");

    h.script(create_event_result("חדש", Some("מחר"), Some("15:30"), None));
    let replies = h.send("קבע חדש מחר ב-15:30").await;
    assert!(replies[0].contains("חפיפה"));
    assert_eq!(h.events.list_upcoming(&user_id, None).unwrap().len(), 1);

    let replies = h.send("כן").await;
    assert!(replies.iter().any(|r| r.contains("נקבע")));
    assert_eq!(h.events.list_upcoming(&user_id, None).unwrap().len(), 2);
}

// --- guided flow ------------------------------------------------------------

#[tokio::test]
async fn guided_event_flow_collects_missing_fields() {
    let h = Harness::new();
    let user_id = h.register().await;

    // NLU found the intent but no entities: the flow asks step by step.
    h.script(simple_result(Intent::CreateEvent));
    let replies = h.send("תקבע לי משהו").await;
    assert!(replies[0].contains("מה שם האירוע"));

    let replies = h.send("ארוחת ערב").await;
    assert!(replies[0].contains("מתי"));

    // Date only — the flow asks for the time.
    let replies = h.send("מחר").await;
    assert!(replies[0].contains("שעה"));

    let replies = h.send("20:00").await;
    assert!(replies[0].contains("איפה"));

    let replies = h.send("דלג").await;
    assert!(replies[0].contains("לקבוע"));

    let replies = h.send("כן").await;
    assert!(replies.iter().any(|r| r.contains("נקבע")));

    let events = h.events.list_upcoming(&user_id, None).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(
        events[0].start_ts_utc.to_rfc3339(),
        "2025-10-11T17:00:00+00:00" // 20:00 local
    );
}

#[tokio::test]
async fn guided_task_flow_creates_and_lists_task() {
    let h = Harness::new();
    let user_id = h.register().await;

    h.script(simple_result(Intent::CreateTask));
    let replies = h.send("תוסיף משימה").await;
    assert!(replies[0].contains("מה המשימה"));

    let replies = h.send("לשלם חשבון חשמל").await;
    assert!(replies[0].contains("פרטים"));

    let replies = h.send("דלג").await;
    assert!(replies[0].contains("עדיפות"));

    let replies = h.send("דחוף").await;
    assert!(replies[0].contains("עד מתי"));

    let replies = h.send("מחר").await;
    assert!(replies[0].contains("להוסיף את המשימה"));

    let replies = h.send("כן").await;
    assert!(replies.iter().any(|r| r.contains("משימה נוספה")));

    let open = h.tasks.list_open(&user_id).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].title, "לשלם חשבון חשמל");
    assert_eq!(open[0].priority, TaskPriority::Urgent);
    assert!(open[0].due_ts_utc.is_some());

    // The listing intent renders it back.
    h.script(simple_result(Intent::ListTasks));
    let replies = h.send("מה המשימות שלי?").await;
    assert!(replies[0].contains("לשלם חשבון חשמל"));
}

#[tokio::test]
async fn list_tasks_with_nothing_open() {
    let h = Harness::new();
    h.register().await;
    h.script(simple_result(Intent::ListTasks));
    let replies = h.send("מה המשימות שלי?").await;
    assert!(replies[0].contains("אין משימות"));
}

#[tokio::test]
async fn cancel_aborts_mid_flow() {
    let h = Harness::new();
    let user_id = h.register().await;
    h.script(simple_result(Intent::CreateEvent));
    h.send("קבע משהו").await;
    h.send("כותרת כלשהי").await;

    let replies = h.send("/cancel").await;
    assert!(replies[0].contains("בוטל"));
    assert!(h.events.list_upcoming(&user_id, None).unwrap().is_empty());
}

#[tokio::test]
async fn flow_expires_after_inactivity_with_single_notice() {
    let h = Harness::new();
    h.register().await;
    h.script(simple_result(Intent::CreateEvent));
    h.send("קבע משהו").await;

    h.clock.advance(chrono::Duration::minutes(31));
    h.script(simple_result(Intent::Help));
    let replies = h.send("עזרה").await;
    // Expiry notice first, then normal handling of the new message.
    assert!(replies[0].contains("פגה"));
    assert!(replies.len() >= 2);
}
