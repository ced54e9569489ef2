use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

use yoman_core::message::InboundMessage;
use yoman_core::types::Phone;

/// Transport-agnostic inbound receiver.
///
/// Normalizes raw transport payloads into [`InboundMessage`] and forwards
/// them on a single FIFO channel, which preserves per-sender arrival
/// order. Dedup and everything after it belong to the router.
pub struct Ingress {
    tx: mpsc::Sender<InboundMessage>,
}

impl Ingress {
    /// Create the ingress and the channel the router consumes.
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<InboundMessage>) {
        let (tx, rx) = mpsc::channel(buffer);
        (Self { tx }, rx)
    }

    /// Normalize and forward one raw inbound message.
    ///
    /// Returns `false` when the message was dropped (unparseable sender or
    /// closed pipeline).
    pub async fn submit(
        &self,
        conversation_id: &str,
        sender_raw: &str,
        text: &str,
        message_id: &str,
        received_at: DateTime<Utc>,
    ) -> bool {
        let Some(sender_id) = Phone::normalize(sender_raw) else {
            warn!(sender = %sender_raw, "inbound dropped: unparseable sender id");
            return false;
        };
        let message = InboundMessage {
            conversation_id: conversation_id.to_string(),
            sender_id,
            text: text.to_string(),
            message_id: message_id.to_string(),
            received_at,
        };
        if self.tx.send(message).await.is_err() {
            warn!("inbound dropped: pipeline closed");
            return false;
        }
        true
    }
}
