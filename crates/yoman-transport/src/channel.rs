use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use yoman_core::types::Phone;

use crate::error::Result;

/// Common interface for chat transports.
///
/// `send_text` returns the transport's outbound message id; `react`
/// attaches a single emoji to an inbound message.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging.
    fn name(&self) -> &str;

    async fn send_text(&self, recipient: &Phone, text: &str) -> Result<String>;

    async fn react(&self, recipient: &Phone, message_id: &str, emoji: &str) -> Result<()>;
}

/// A message recorded by the loopback transport.
#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub recipient: Phone,
    pub text: String,
    pub outbound_id: String,
}

/// A reaction recorded by the loopback transport.
#[derive(Debug, Clone, PartialEq)]
pub struct SentReaction {
    pub recipient: Phone,
    pub message_id: String,
    pub emoji: String,
}

/// In-process transport: records everything it "sends".
///
/// Used by the gateway's local echo mode and by the end-to-end scenario
/// tests, which assert on the recorded traffic.
#[derive(Default)]
pub struct LoopbackTransport {
    sent: Mutex<Vec<SentMessage>>,
    reactions: Mutex<Vec<SentReaction>>,
    /// When true, sends fail as if the transport dropped its connection.
    disconnected: Mutex<bool>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn reactions(&self) -> Vec<SentReaction> {
        self.reactions.lock().unwrap().clone()
    }

    pub fn set_disconnected(&self, down: bool) {
        *self.disconnected.lock().unwrap() = down;
    }

    /// Texts sent to one recipient, in order.
    pub fn texts_to(&self, recipient: &Phone) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|m| &m.recipient == recipient)
            .map(|m| m.text.clone())
            .collect()
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn name(&self) -> &str {
        "loopback"
    }

    async fn send_text(&self, recipient: &Phone, text: &str) -> Result<String> {
        if *self.disconnected.lock().unwrap() {
            return Err(crate::error::TransportError::Disconnected(
                "loopback down".to_string(),
            ));
        }
        let outbound_id = Uuid::new_v4().to_string();
        self.sent.lock().unwrap().push(SentMessage {
            recipient: recipient.clone(),
            text: text.to_string(),
            outbound_id: outbound_id.clone(),
        });
        Ok(outbound_id)
    }

    async fn react(&self, recipient: &Phone, message_id: &str, emoji: &str) -> Result<()> {
        if *self.disconnected.lock().unwrap() {
            return Err(crate::error::TransportError::Disconnected(
                "loopback down".to_string(),
            ));
        }
        self.reactions.lock().unwrap().push(SentReaction {
            recipient: recipient.clone(),
            message_id: message_id.to_string(),
            emoji: emoji.to_string(),
        });
        Ok(())
    }
}
