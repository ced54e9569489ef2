use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Phone;

/// Normalized inbound transport message.
///
/// Produced by the ingress adapter; `conversation_id` and `message_id` are
/// opaque transport tokens, `sender_id` is the canonical phone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub conversation_id: String,
    pub sender_id: Phone,
    pub text: String,
    pub message_id: String,
    pub received_at: DateTime<Utc>,
}

/// What a handler wants to happen on the transport after processing one
/// inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A single outbound text message.
    Text(String),
    /// A sequence of outbound messages, sent in order.
    Many(Vec<String>),
    /// An emoji reaction referencing the inbound message id.
    Reaction(String),
    /// State transition only — nothing is sent.
    Silent,
}

impl Reply {
    pub fn text(s: impl Into<String>) -> Self {
        Reply::Text(s.into())
    }

    pub fn is_silent(&self) -> bool {
        matches!(self, Reply::Silent)
    }
}
