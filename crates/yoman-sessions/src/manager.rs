use std::sync::Arc;

use chrono::Duration;
use tracing::debug;

use yoman_core::clock::Clock;
use yoman_core::types::UserId;
use yoman_kv::MemoryKv;

use crate::types::{ConvState, FlowContext, Session, Turn, TurnRole};

/// Storage TTL for the session blob. Logical flow expiry is evaluated
/// against `last_activity`, not this value, so the "your flow expired"
/// notice can still be produced after the 30-minute window.
const BLOB_TTL_HOURS: i64 = 24;

/// Manager for per-user conversational sessions in the ephemeral store.
pub struct SessionManager {
    kv: Arc<MemoryKv>,
    clock: Arc<dyn Clock>,
}

impl SessionManager {
    pub fn new(kv: Arc<MemoryKv>, clock: Arc<dyn Clock>) -> Self {
        Self { kv, clock }
    }

    /// Load the session, applying the inactivity timeout.
    ///
    /// Returns the session plus `true` when an in-progress flow just
    /// expired — the router tells the user once.
    pub fn load(&self, user_id: &UserId) -> (Session, bool) {
        let now = self.clock.now_utc();
        let key = yoman_kv::conv_state(user_id);
        let Some(mut session) = self.kv.get_json::<Session>(&key) else {
            return (Session::fresh(now), false);
        };

        let idle = now - session.last_activity;
        if session.state.in_flow()
            && idle > Duration::minutes(session.state.timeout_minutes())
        {
            debug!(%user_id, state = ?session.state, "flow expired by inactivity");
            session.state = ConvState::MainMenu;
            session.context.clear();
            session.last_activity = now;
            self.save(user_id, &session);
            return (session, true);
        }
        (session, false)
    }

    /// Persist a session, refreshing activity and the storage TTL.
    pub fn save(&self, user_id: &UserId, session: &Session) {
        let key = yoman_kv::conv_state(user_id);
        let _ = self
            .kv
            .set_json(&key, session, Some(Duration::hours(BLOB_TTL_HOURS)));
    }

    /// Transition to a new state, applying a context patch.
    pub fn transition(
        &self,
        user_id: &UserId,
        session: &mut Session,
        new_state: ConvState,
        patch: impl FnOnce(&mut FlowContext),
    ) {
        session.state = new_state;
        patch(&mut session.context);
        session.last_activity = self.clock.now_utc();
        self.save(user_id, session);
    }

    /// Hard reset to the main menu, clearing all in-flight context.
    pub fn reset(&self, user_id: &UserId, session: &mut Session) {
        session.state = ConvState::MainMenu;
        session.context.clear();
        session.quoted_event_id = None;
        session.last_activity = self.clock.now_utc();
        self.save(user_id, session);
    }

    /// Append a turn to the bounded recent-conversation window.
    pub fn push_turn(&self, user_id: &UserId, session: &mut Session, role: TurnRole, text: &str) {
        session.recent.push(Turn {
            role,
            text: text.to_string(),
            at: self.clock.now_utc(),
        });
        if session.recent.len() > Session::MAX_RECENT_TURNS {
            let excess = session.recent.len() - Session::MAX_RECENT_TURNS;
            session.recent.drain(..excess);
        }
        session.last_activity = self.clock.now_utc();
        self.save(user_id, session);
    }
}
