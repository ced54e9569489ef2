//! Domain services: events, reminders, tasks, contacts and the durable
//! message log. Each service enforces ownership, validation and its own
//! table invariants; all services share one SQLite connection handle.

pub mod contact;
pub mod db;
pub mod error;
pub mod event;
pub mod message_log;
pub mod reminder;
pub mod task;
pub mod types;

pub use contact::ContactService;
pub use db::{open_shared, Db};
pub use error::{DomainError, Result};
pub use event::{CommentPatch, CreateOutcome, EventPatch, EventService, NewEvent};
pub use message_log::MessageLog;
pub use reminder::{FireOutcome, NewReminder, ReminderPatch, ReminderService};
pub use task::{NewTask, TaskService};
pub use types::*;
