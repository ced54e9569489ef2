use async_trait::async_trait;

use crate::prompt::NluPrompt;
use crate::types::NluResult;

/// One model's reply, with usage for the cost accountant.
#[derive(Debug, Clone)]
pub struct ModelReply {
    pub result: NluResult,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

/// Common interface for all NLU model slots.
#[async_trait]
pub trait IntentModel: Send + Sync {
    /// Model identifier for logging and the comparison table.
    fn name(&self) -> &str;

    /// Classify one message. Implementations return the parsed, validated
    /// result — wire-format concerns stay inside the provider.
    async fn classify(&self, prompt: &NluPrompt) -> Result<ModelReply, ProviderError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("deadline exceeded")]
    Timeout,
}
