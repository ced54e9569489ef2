//! The message routing pipeline.
//!
//! One inbound message runs through strict phases: dedup → bug-report
//! capture → language gate / authentication → rate limit → slash commands
//! → state-machine flows → NLU dispatch → response. Reminder delivery and
//! the morning summaries run through [`jobs::DeliveryHandler`] on the
//! scheduler's worker pool.

pub mod commands;
pub mod dispatch;
pub mod flows;
pub mod handlers;
pub mod jobs;
pub mod pipeline;
pub mod render;
pub mod replies;

pub use dispatch::Dispatcher;
pub use jobs::DeliveryHandler;
pub use pipeline::{Router, RouterDeps};
