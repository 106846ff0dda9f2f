use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::config::Settings;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    OpenAi,
    Google,
    Anthropic,
    Ollama,
    Custom,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "openai",
            LlmProvider::Google => "google",
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::Ollama => "ollama",
            LlmProvider::Custom => "custom",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::OpenAi => "gpt-4.1",
            LlmProvider::Google => "gemini-2.0-flash",
            LlmProvider::Anthropic => "claude-3-5-sonnet-latest",
            LlmProvider::Ollama => "llama3.2:3b",
            LlmProvider::Custom => "qwen-plus",
        }
    }

    /// OpenAI-compatible chat completions base URL for this provider.
    pub fn base_url(&self, settings: &Settings) -> Result<String> {
        let url = match self {
            LlmProvider::OpenAi => settings
                .get("OPENAI_BASE_URL")
                .unwrap_or("https://api.openai.com/v1")
                .to_string(),
            LlmProvider::Google => "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            LlmProvider::Anthropic => "https://api.anthropic.com/v1".to_string(),
            LlmProvider::Ollama => {
                let host = settings.get("OLLAMA_URL").unwrap_or("http://localhost:11434");
                format!("{}/v1", host.trim_end_matches('/'))
            }
            LlmProvider::Custom => settings
                .get("CUSTOM_LLM_URL")
                .ok_or_else(|| anyhow!("CUSTOM_LLM_URL must be set for the custom provider"))?
                .to_string(),
        };
        Ok(url.trim_end_matches('/').to_string())
    }

    pub fn api_key(&self, settings: &Settings) -> Option<String> {
        let key = match self {
            LlmProvider::OpenAi => "OPENAI_API_KEY",
            LlmProvider::Google => "GOOGLE_API_KEY",
            LlmProvider::Anthropic => "ANTHROPIC_API_KEY",
            LlmProvider::Ollama => return None,
            LlmProvider::Custom => "CUSTOM_LLM_API_KEY",
        };
        settings.get(key).map(String::from)
    }

    pub fn model(&self, settings: &Settings) -> String {
        let key = match self {
            LlmProvider::OpenAi => "OPENAI_MODEL",
            LlmProvider::Google => "GOOGLE_MODEL",
            LlmProvider::Anthropic => "ANTHROPIC_MODEL",
            LlmProvider::Ollama => "OLLAMA_MODEL",
            LlmProvider::Custom => "CUSTOM_MODEL",
        };
        settings
            .get(key)
            .unwrap_or_else(|| self.default_model())
            .to_string()
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(LlmProvider::OpenAi),
            "google" => Ok(LlmProvider::Google),
            "anthropic" => Ok(LlmProvider::Anthropic),
            "ollama" => Ok(LlmProvider::Ollama),
            "custom" => Ok(LlmProvider::Custom),
            other => Err(anyhow!("unsupported LLM provider `{other}`")),
        }
    }
}
