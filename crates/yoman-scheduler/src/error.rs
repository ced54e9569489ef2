use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job not found: {id}")]
    JobNotFound { id: String },

    #[error("invalid job payload: {0}")]
    InvalidJob(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;
