use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport disconnected: {0}")]
    Disconnected(String),

    #[error("recipient rate limit exceeded")]
    RateLimited,

    #[error("send failed: {0}")]
    SendFailed(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;
