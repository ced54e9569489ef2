use thiserror::Error;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("user not found")]
    NotFound,

    #[error("phone already registered")]
    PhoneTaken,

    #[error("invalid PIN: {0}")]
    InvalidPin(String),

    #[error("account locked until {until}")]
    LockedOut { until: chrono::DateTime<chrono::Utc> },

    #[error("password hashing error: {0}")]
    Hash(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, UserError>;
