use thiserror::Error;

/// Domain-service failures.
///
/// `NotFound` covers both missing rows and rows owned by another user, so
/// existence of foreign records is never disclosed.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("title must not be empty")]
    EmptyTitle,

    #[error("start time is in the past")]
    PastStart,

    #[error("end time precedes start time")]
    EndBeforeStart,

    #[error("invalid recurrence rule: {0}")]
    InvalidRecurrence(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found")]
    NotFound,

    #[error("ambiguous match")]
    Ambiguous { options: Vec<String> },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DomainError>;
