//! Hebrew/English language utilities: fuzzy matching, free-text date and
//! time parsing, lead-time phrases, recurrence rules and script detection.
//!
//! Everything here is pure — callers supply the user zone and "now", so the
//! same input always produces the same output.

pub mod dateparse;
pub mod error;
pub mod fuzzy;
pub mod langdetect;
pub mod leadtime;
pub mod recurrence;

pub use dateparse::{parse_date_query, DateQuery};
pub use error::HebrewError;
pub use fuzzy::{best_match, rank, score, Match};
pub use langdetect::{detect_language, is_greeting, DetectedLanguage};
pub use leadtime::parse_lead_time;
pub use recurrence::RecurrenceRule;
