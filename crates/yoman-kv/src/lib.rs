//! Ephemeral TTL key/value store.
//!
//! Holds everything that is state but not a system of record: conversation
//! sessions, auth sessions, dedup sets, rate-limit buckets, per-sender
//! locks, dashboard tokens and the bug-report lists. Process-local and
//! clock-driven — expiry is evaluated against the injected [`Clock`], never
//! against wall time directly, so TTL behavior is testable.

mod keys;
mod store;

pub use keys::*;
pub use store::MemoryKv;
