//! Durable job scheduling and delivery.
//!
//! A SQLite-backed, ordered-by-execution-time queue with a 1-second engine
//! tick, plus a bounded worker pool that executes fired jobs with a global
//! dispatch rate cap, per-job deadline and exponential-backoff retries.
//! At-most-once delivery itself is the reminder CAS's job — the pool only
//! guarantees attempts.

pub mod db;
pub mod engine;
pub mod error;
pub mod types;
pub mod worker;

pub use engine::{SchedulerEngine, SchedulerHandle};
pub use error::{Result, SchedulerError};
pub use types::{Job, JobKind, JobStatus};
pub use worker::{JobError, JobHandler, WorkerPool};
