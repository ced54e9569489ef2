use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::anthropic::parse_json_reply;
use crate::prompt::NluPrompt;
use crate::provider::{IntentModel, ModelReply, ProviderError};

/// OpenAI-wire-format model slot.
///
/// Also serves any OpenAI-compatible vendor — the third ensemble slot is
/// typically one of these with a custom `base_url`.
pub struct OpenAiModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl OpenAiModel {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".to_string()),
            model,
        }
    }
}

#[async_trait]
impl IntentModel for OpenAiModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn classify(&self, prompt: &NluPrompt) -> Result<ModelReply, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user },
            ],
            "response_format": { "type": "json_object" },
        });
        let url = format!("{}/v1/chat/completions", self.base_url);

        debug!(model = %self.model, "sending NLU request to OpenAI-compatible endpoint");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_ms: 5000,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "OpenAI-compatible API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        let text = api_resp
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(ModelReply {
            result: parse_json_reply(&text),
            tokens_in: api_resp.usage.prompt_tokens,
            tokens_out: api_resp.usage.completion_tokens,
        })
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize, Default)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
