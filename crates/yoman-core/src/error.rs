use thiserror::Error;

/// Workspace-wide error taxonomy.
///
/// `NotFound` deliberately covers both "row does not exist" and "row belongs
/// to another user" so callers cannot probe for the existence of foreign
/// records. Localized user-facing text is produced only at the router
/// boundary; these variants never reach the transport verbatim.
#[derive(Debug, Error)]
pub enum YomanError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("rate limited")]
    RateLimited,

    #[error("authentication required")]
    AuthRequired,

    #[error("external service unavailable: {0}")]
    External(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, YomanError>;
