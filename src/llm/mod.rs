pub mod client;
pub mod models;
pub mod provider;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use client::OpenAiCompatibleClient;
pub use models::list_available_models;
pub use provider::LlmProvider;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LlmMessage {
    pub role: Role,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A model endpoint that can answer with JSON matching a schema.
pub trait LlmClient: Send + Sync {
    fn generate_structured(
        &self,
        model: &str,
        messages: &[LlmMessage],
        response_schema: &Value,
        strict: bool,
    ) -> Result<Value>;
}
