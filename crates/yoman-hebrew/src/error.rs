use thiserror::Error;

#[derive(Debug, Error)]
pub enum HebrewError {
    #[error("unrecognized date expression: {0}")]
    UnrecognizedDate(String),

    #[error("value out of range: {0}")]
    OutOfRange(String),

    #[error("invalid recurrence rule: {0}")]
    InvalidRecurrence(String),
}

pub type Result<T> = std::result::Result<T, HebrewError>;
