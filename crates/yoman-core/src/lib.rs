//! Shared foundation for the yoman workspace: configuration, the error
//! taxonomy, identifier newtypes, the clock abstraction and the transport
//! message envelope.

pub mod clock;
pub mod config;
pub mod error;
pub mod message;
pub mod types;

pub use error::{Result, YomanError};
