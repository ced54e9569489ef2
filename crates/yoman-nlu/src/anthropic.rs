use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::prompt::NluPrompt;
use crate::provider::{IntentModel, ModelReply, ProviderError};
use crate::types::NluResult;

const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API model slot.
pub struct AnthropicModel {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicModel {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| "https://api.anthropic.com".to_string()),
            model,
        }
    }
}

#[async_trait]
impl IntentModel for AnthropicModel {
    fn name(&self) -> &str {
        &self.model
    }

    async fn classify(&self, prompt: &NluPrompt) -> Result<ModelReply, ProviderError> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 1024,
            "system": prompt.system,
            "messages": [{ "role": "user", "content": prompt.user }],
        });
        let url = format!("{}/v1/messages", self.base_url);

        debug!(model = %self.model, "sending NLU request to Anthropic");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if status == 429 {
            let retry = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(5000);
            return Err(ProviderError::RateLimited {
                retry_after_ms: retry,
            });
        }
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Anthropic API error");
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
            .content
            .iter()
            .find(|b| b.kind == "text")
            .map(|b| b.text.clone())
            .unwrap_or_default();

        Ok(ModelReply {
            result: parse_json_reply(&text),
            tokens_in: api_resp.usage.input_tokens,
            tokens_out: api_resp.usage.output_tokens,
        })
    }
}

/// Extract the JSON object from the model's text reply.
///
/// Models occasionally wrap the object in a markdown fence or prose; the
/// first `{…}` span is taken, and anything unparseable validates to
/// `unknown` downstream.
pub(crate) fn parse_json_reply(text: &str) -> NluResult {
    let trimmed = text.trim();
    let candidate = if trimmed.starts_with('{') {
        trimmed.to_string()
    } else {
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if end > start => trimmed[start..=end].to_string(),
            _ => return NluResult::unknown(),
        }
    };
    match serde_json::from_str(&candidate) {
        Ok(value) => NluResult::from_model_json(value),
        Err(_) => NluResult::unknown(),
    }
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Usage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Intent;

    #[test]
    fn plain_json_parses() {
        let r = parse_json_reply(r#"{"intent": "create_event", "confidence": 0.9}"#);
        assert_eq!(r.intent, Intent::CreateEvent);
    }

    #[test]
    fn fenced_json_parses() {
        let r = parse_json_reply(
            "```json\n{\"intent\": \"list_events\", \"confidence\": 0.8}\n```",
        );
        assert_eq!(r.intent, Intent::ListEvents);
    }

    #[test]
    fn prose_only_is_unknown() {
        let r = parse_json_reply("I could not classify this message.");
        assert_eq!(r.intent, Intent::Unknown);
        assert_eq!(r.confidence, 0.0);
    }
}
