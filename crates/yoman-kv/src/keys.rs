//! Canonical key layout for the ephemeral store.

use yoman_core::types::{Phone, UserId};

/// Conversation session blob, TTL 30 min.
pub fn conv_state(user_id: &UserId) -> String {
    format!("conv:state:{user_id}")
}

/// Auth state blob, TTL 48 h.
pub fn auth_state(phone: &Phone) -> String {
    format!("auth:state:{phone}")
}

/// Dashboard token record, TTL 15 min.
pub fn dashboard_token(token: &str) -> String {
    format!("dashboard:token:{token}")
}

/// Transport-retry dedup marker, TTL 5 min.
pub fn dedup(conversation_id: &str, message_id: &str) -> String {
    format!("dedup:{conversation_id}:{message_id}")
}

/// Per-user inbound rate bucket, TTL 1 min.
pub fn rate(user_id: &UserId) -> String {
    format!("rate:{user_id}")
}

/// Per-recipient outbound rate bucket, TTL 1 min.
pub fn egress_rate(phone: &Phone) -> String {
    format!("rate:out:{phone}")
}

/// Per-sender processing lock (single-flight), short TTL.
pub fn sender_lock(phone: &Phone) -> String {
    format!("lock:sender:{phone}")
}

/// Pending bug-report list.
pub const BUGS_PENDING: &str = "bugs:pending";

/// Fixed bug-report list.
pub const BUGS_FIXED: &str = "bugs:fixed";
