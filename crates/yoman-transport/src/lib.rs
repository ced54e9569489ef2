//! Transport boundary: the abstract chat-transport trait, the ingress
//! normalizer and the egress adapter (per-recipient rate limiting,
//! disconnect retry with backoff, bounded outbound queue).
//!
//! The concrete WhatsApp client is an external collaborator; the loopback
//! transport here serves local mode and tests.

pub mod channel;
pub mod egress;
pub mod error;
pub mod ingress;

pub use channel::{LoopbackTransport, SentMessage, SentReaction, Transport};
pub use egress::Egress;
pub use error::TransportError;
pub use ingress::Ingress;
