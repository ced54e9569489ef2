//! Per-user conversational state.
//!
//! Sessions are ephemeral (kv-backed, not rows): a fixed state enumeration,
//! a context payload carrying in-flight entity fragments between prompts,
//! a bounded recent-conversation window, and a 30-minute inactivity
//! timeout that reverts to the main menu.

pub mod manager;
pub mod types;

pub use manager::SessionManager;
pub use types::{ConvState, FlowContext, Session, Turn, TurnRole};
