use std::time::Duration;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use serde_json::{json, Value};

use crate::config::Settings;
use crate::error::ApiError;
use crate::llm::{LlmClient, LlmMessage, LlmProvider};
use crate::schema::ensure_strict;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

/// Chat-completions client for any endpoint speaking the OpenAI wire format.
pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: Option<String>,
    agent: ureq::Agent,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
            agent,
        }
    }

    pub fn from_settings(provider: LlmProvider, settings: &Settings) -> Result<Self> {
        Ok(Self::new(provider.base_url(settings)?, provider.api_key(settings)))
    }

    fn post(&self, path: &str, body: Value) -> Result<Value> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.agent.post(&url).set("Content-Type", "application/json");
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.set("Authorization", &format!("Bearer {key}"));
        }
        match request.send_json(body) {
            Ok(response) => response
                .into_json::<Value>()
                .with_context(|| format!("invalid JSON from {url}")),
            Err(ureq::Error::Status(status, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(ApiError::bad_gateway(format!("LLM provider returned {status}: {body}")).into())
            }
            Err(err) => Err(ApiError::bad_gateway(format!("LLM provider unreachable: {err}")).into()),
        }
    }
}

impl LlmClient for OpenAiCompatibleClient {
    fn generate_structured(
        &self,
        model: &str,
        messages: &[LlmMessage],
        response_schema: &Value,
        strict: bool,
    ) -> Result<Value> {
        let schema = if strict {
            ensure_strict(response_schema)?
        } else {
            response_schema.clone()
        };
        let body = json!({
            "model": model,
            "messages": messages,
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "response",
                    "strict": strict,
                    "schema": schema
                }
            }
        });
        let completion = self.post("/chat/completions", body)?;
        let content = completion
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_gateway("LLM response has no message content"))?;
        parse_json_content(content)
    }
}

/// Parses a completion body as JSON, tolerating a Markdown code fence.
pub fn parse_json_content(content: &str) -> Result<Value> {
    let trimmed = content.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.trim_end().strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(unfenced.trim())
        .map_err(|err| anyhow!(ApiError::bad_gateway(format!("LLM returned invalid JSON: {err}"))))
}
