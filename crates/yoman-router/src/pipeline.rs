use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use tracing::{error, info, warn};

use yoman_core::clock::Clock;
use yoman_core::config::YomanConfig;
use yoman_core::message::{InboundMessage, Reply};
use yoman_core::types::{Phone, UserId};
use yoman_domain::{
    ContactService, EventService, MessageDirection, MessageLog, ReminderService, TaskService,
};
use yoman_hebrew::{detect_language, is_greeting, DetectedLanguage};
use yoman_kv::MemoryKv;
use yoman_nlu::NluEnsemble;
use yoman_scheduler::SchedulerHandle;
use yoman_sessions::{ConvState, SessionManager, TurnRole};
use yoman_transport::Egress;
use yoman_users::{AuthManager, LoginOutcome, User, UserService};

use crate::{commands, flows, handlers, replies};

/// Overall per-message processing budget.
const MESSAGE_BUDGET_SECS: u64 = 30;

/// A bug report captured from a `#`-prefixed message. Status moves from
/// `pending` to `fixed` by operator tooling, which fills the last two
/// fields.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct BugReport {
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
}

/// Everything the router needs, constructor-injected.
pub struct RouterDeps {
    pub config: YomanConfig,
    pub clock: Arc<dyn Clock>,
    pub kv: Arc<MemoryKv>,
    pub sessions: Arc<SessionManager>,
    pub auth: Arc<AuthManager>,
    pub users: Arc<UserService>,
    pub events: Arc<EventService>,
    pub reminders: Arc<ReminderService>,
    pub tasks: Arc<TaskService>,
    pub contacts: Arc<ContactService>,
    pub message_log: Arc<MessageLog>,
    pub nlu: Arc<NluEnsemble>,
    pub scheduler: SchedulerHandle,
    pub egress: Arc<Egress>,
}

/// Failure of one pipeline phase. Turned into a generic localized error
/// and a state reset; the message is never re-enqueued.
#[derive(Debug)]
pub(crate) struct PhaseError {
    pub phase: &'static str,
    pub user_id: Option<UserId>,
    pub detail: String,
}

impl PhaseError {
    pub fn new(phase: &'static str, user_id: Option<&UserId>, detail: impl ToString) -> Self {
        Self {
            phase,
            user_id: user_id.cloned(),
            detail: detail.to_string(),
        }
    }
}

pub(crate) type PhaseResult = std::result::Result<Reply, PhaseError>;

/// The pipeline orchestrator.
pub struct Router {
    pub(crate) deps: RouterDeps,
}

impl Router {
    pub fn new(deps: RouterDeps) -> Self {
        Self { deps }
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.deps.clock
    }

    pub(crate) fn sessions(&self) -> &SessionManager {
        &self.deps.sessions
    }

    pub(crate) fn events(&self) -> &EventService {
        &self.deps.events
    }

    pub(crate) fn reminders(&self) -> &ReminderService {
        &self.deps.reminders
    }

    pub(crate) fn tasks(&self) -> &TaskService {
        &self.deps.tasks
    }

    pub(crate) fn contacts(&self) -> &ContactService {
        &self.deps.contacts
    }

    pub(crate) fn scheduler(&self) -> &SchedulerHandle {
        &self.deps.scheduler
    }

    /// Pre-auth sessions are keyed by phone (no user id exists yet).
    pub(crate) fn preauth_key(phone: &Phone) -> UserId {
        UserId::from(format!("pre:{phone}"))
    }

    /// Entry point for one inbound message. Never panics the lane; every
    /// failure becomes a generic localized reply.
    pub async fn handle(&self, msg: InboundMessage) {
        // Phase: dedup — transport retries are dropped silently.
        let dedup_key = yoman_kv::dedup(&msg.conversation_id, &msg.message_id);
        if !self.deps.kv.set_nx(&dedup_key, "1", Duration::minutes(5)) {
            return;
        }

        // Phase: bug-report capture — `#` messages bypass the pipeline.
        if msg.text.trim_start().starts_with('#') {
            let report = BugReport {
                text: msg.text.trim_start().trim_start_matches('#').trim().to_string(),
                timestamp: self.deps.clock.now_utc(),
                status: "pending".to_string(),
                fixed_at: None,
                commit_hash: None,
            };
            let _ = self.deps.kv.push(yoman_kv::BUGS_PENDING, &report);
            self.deps
                .egress
                .react(&msg.sender_id, &msg.message_id, "🐛")
                .await;
            return;
        }

        // Cross-process mutual exclusion; lanes already serialize
        // in-process, so contention here only means another node.
        let lock_key = yoman_kv::sender_lock(&msg.sender_id);
        if !self
            .deps
            .kv
            .set_nx(&lock_key, "1", Duration::seconds(MESSAGE_BUDGET_SECS as i64 + 5))
        {
            warn!(sender = %msg.sender_id, "sender lock contended");
        }

        let budget = StdDuration::from_secs(MESSAGE_BUDGET_SECS);
        let outcome = tokio::time::timeout(budget, self.process(&msg)).await;
        self.deps.kv.delete(&lock_key);

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(_) => Some(PhaseError::new("budget", None, "30s budget exceeded")),
        };

        if let Some(e) = failure {
            error!(
                phase = e.phase,
                user_id = %e.user_id.as_ref().map(|u| u.as_str()).unwrap_or("-"),
                message_id = %msg.message_id,
                detail = %e.detail,
                "pipeline phase failed"
            );
            if let Some(user_id) = &e.user_id {
                let (mut session, _) = self.deps.sessions.load(user_id);
                self.deps.sessions.reset(user_id, &mut session);
            }
            let _ = self
                .deps
                .egress
                .send_text(&msg.sender_id, replies::generic_error())
                .await;
        }
    }

    async fn process(&self, msg: &InboundMessage) -> std::result::Result<(), PhaseError> {
        // Phase: language gate + authentication.
        let Some(user_id) = self.deps.auth.authenticated_user(&msg.sender_id) else {
            let reply = self.handle_unauthenticated(msg).await?;
            self.send_reply(&msg.sender_id, None, &msg.message_id, reply)
                .await;
            return Ok(());
        };

        let user = self
            .deps
            .users
            .get_by_id(&user_id)
            .map_err(|e| PhaseError::new("auth", Some(&user_id), e))?;

        // Phase: rate limit.
        let bucket = yoman_kv::rate(&user.id);
        let count = self.deps.kv.incr(&bucket, Duration::minutes(1));
        let limit = i64::from(self.deps.config.transport.inbound_per_minute);
        if count > limit {
            // Notify exactly once per window; drop the rest silently.
            if count == limit + 1 {
                self.send_reply(
                    &msg.sender_id,
                    Some(&user),
                    &msg.message_id,
                    Reply::text(replies::throttled()),
                )
                .await;
            }
            return Ok(());
        }

        self.deps
            .message_log
            .append(Some(&user.id), MessageDirection::Inbound, &msg.text);

        let (mut session, flow_expired) = self.deps.sessions.load(&user.id);
        if flow_expired {
            self.send_reply(
                &msg.sender_id,
                Some(&user),
                &msg.message_id,
                Reply::text(replies::flow_expired()),
            )
            .await;
        }
        self.deps
            .sessions
            .push_turn(&user.id, &mut session, TurnRole::User, &msg.text);

        let text = msg.text.trim();
        // Phase: command dispatch.
        let reply = if text.starts_with('/') {
            commands::handle(self, &user, &mut session, text)?
        // Phase: state dispatch.
        } else if session.state.in_flow() {
            flows::advance(self, &user, &mut session, msg).await?
        // Phase: NLU dispatch.
        } else {
            handlers::dispatch_nlu(self, &user, &mut session, msg).await?
        };

        self.send_reply(&msg.sender_id, Some(&user), &msg.message_id, reply)
            .await;
        Ok(())
    }

    /// Registration / PIN-login sub-state machine for unauthenticated
    /// senders, with the language gate in front.
    async fn handle_unauthenticated(&self, msg: &InboundMessage) -> PhaseResult {
        let pre_key = Self::preauth_key(&msg.sender_id);
        let (mut session, _) = self.deps.sessions.load(&pre_key);
        let text = msg.text.trim();

        // Lockout short-circuit from the mirrored auth state.
        let auth_state = self.deps.auth.state(&msg.sender_id);
        if let Some(until) = auth_state.lockout_until {
            if until > self.deps.clock.now_utc() {
                return Ok(Reply::Silent);
            }
        }

        match session.state {
            ConvState::RegisteringName => {
                if text.is_empty() {
                    return Ok(Reply::text(replies::welcome_ask_name()));
                }
                self.deps.sessions.transition(
                    &pre_key,
                    &mut session,
                    ConvState::RegisteringPin,
                    |ctx| ctx.pending_name = Some(text.to_string()),
                );
                Ok(Reply::text(replies::ask_pin_new()))
            }
            ConvState::RegisteringPin => {
                let name = session
                    .context
                    .pending_name
                    .clone()
                    .unwrap_or_else(|| "חבר".to_string());
                match self.deps.auth.register(&msg.sender_id, &name, text) {
                    Ok(user) => {
                        self.deps.sessions.reset(&pre_key, &mut session);
                        info!(user_id = %user.id, "registration complete");
                        Ok(Reply::Many(vec![
                            replies::registered(&user.name),
                            replies::menu().to_string(),
                        ]))
                    }
                    Err(yoman_users::UserError::InvalidPin(_)) => {
                        Ok(Reply::text(replies::bad_pin_format()))
                    }
                    Err(e) => Err(PhaseError::new("auth", None, e)),
                }
            }
            ConvState::AwaitingPin => {
                match self
                    .deps
                    .auth
                    .login(&msg.sender_id, text)
                    .map_err(|e| PhaseError::new("auth", None, e))?
                {
                    LoginOutcome::Success(user_id) => {
                        self.deps.sessions.reset(&pre_key, &mut session);
                        let user = self
                            .deps
                            .users
                            .get_by_id(&user_id)
                            .map_err(|e| PhaseError::new("auth", Some(&user_id), e))?;
                        Ok(Reply::Many(vec![
                            replies::login_ok(&user.name),
                            replies::menu().to_string(),
                        ]))
                    }
                    LoginOutcome::WrongPin { remaining } => {
                        Ok(Reply::text(replies::wrong_pin(remaining)))
                    }
                    LoginOutcome::LockedOut { .. } => Ok(Reply::text(replies::locked_out())),
                }
            }
            _ => {
                // Fresh contact: greeting starts registration or login;
                // recognizable foreign text earns one invitation; anything
                // else is ignored.
                let known_user = self
                    .deps
                    .users
                    .get_by_phone(&msg.sender_id)
                    .map_err(|e| PhaseError::new("auth", None, e))?;

                if let Some(_user) = known_user {
                    self.deps.sessions.transition(
                        &pre_key,
                        &mut session,
                        ConvState::AwaitingPin,
                        |_| {},
                    );
                    return Ok(Reply::text(replies::ask_pin_login()));
                }

                if is_greeting(text) {
                    self.deps.sessions.transition(
                        &pre_key,
                        &mut session,
                        ConvState::RegisteringName,
                        |_| {},
                    );
                    return Ok(Reply::text(replies::welcome_ask_name()));
                }

                match detect_language(text) {
                    DetectedLanguage::Gibberish | DetectedLanguage::Hebrew => Ok(Reply::Silent),
                    lang => {
                        // One invitation per sender, ever-greenish TTL.
                        let invite_key = format!("invite:{}", msg.sender_id);
                        if self.deps.kv.set_nx(&invite_key, "1", Duration::hours(24)) {
                            Ok(Reply::text(replies::invite_register(lang)))
                        } else {
                            Ok(Reply::Silent)
                        }
                    }
                }
            }
        }
    }

    /// The single egress path for pipeline replies.
    pub(crate) async fn send_reply(
        &self,
        recipient: &Phone,
        user: Option<&User>,
        inbound_message_id: &str,
        reply: Reply,
    ) {
        let texts: Vec<String> = match reply {
            Reply::Silent => return,
            Reply::Reaction(emoji) => {
                self.deps
                    .egress
                    .react(recipient, inbound_message_id, &emoji)
                    .await;
                return;
            }
            Reply::Text(t) => vec![t],
            Reply::Many(ts) => ts,
        };

        for text in texts {
            if let Some(user) = user {
                self.deps
                    .message_log
                    .append(Some(&user.id), MessageDirection::Outbound, &text);
                let (mut session, _) = self.deps.sessions.load(&user.id);
                self.deps
                    .sessions
                    .push_turn(&user.id, &mut session, TurnRole::Assistant, &text);
            }
            if let Err(e) = self.deps.egress.send_text(recipient, &text).await {
                warn!(recipient = %recipient, error = %e, "reply send failed");
            }
        }
    }
}
