pub mod server;
pub mod user_config;

use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;

use anyhow::Result;
use serde_json::Value;

use crate::error::ApiError;
use crate::llm::LlmProvider;

pub use server::ServerConfig;
pub use user_config::UserConfig;

pub const DEFAULT_APP_DATA_DIRECTORY: &str = "./app_data";

/// Setting names read from the environment and accepted in the user config.
pub const SETTING_KEYS: &[&str] = &[
    "APP_DATA_DIRECTORY",
    "USER_CONFIG_PATH",
    "CAN_CHANGE_KEYS",
    "LLM",
    "OPENAI_API_KEY",
    "OPENAI_BASE_URL",
    "OPENAI_MODEL",
    "GOOGLE_API_KEY",
    "GOOGLE_MODEL",
    "ANTHROPIC_API_KEY",
    "ANTHROPIC_MODEL",
    "OLLAMA_URL",
    "OLLAMA_MODEL",
    "CUSTOM_LLM_URL",
    "CUSTOM_LLM_API_KEY",
    "CUSTOM_MODEL",
    "PEXELS_API_KEY",
    "PIXABAY_API_KEY",
    "IMAGE_PROVIDER",
    "DISABLE_IMAGE_GENERATION",
    "TOOL_CALLS",
    "DISABLE_THINKING",
    "EXTENDED_REASONING",
    "WEB_GROUNDING",
    "COMFYUI_URL",
    "COMFYUI_WORKFLOW",
];

/// A flat view of the string settings the backend runs with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn from_env() -> Self {
        let values = SETTING_KEYS
            .iter()
            .filter_map(|key| env::var(key).ok().map(|value| (key.to_string(), value)))
            .collect();
        Self { values }
    }

    /// Environment settings overlaid with the user config file. See
    /// [`Settings::layered`].
    pub fn effective() -> (Self, Vec<String>) {
        Self::from_env().layered()
    }

    /// Overlays the user config file when keys may be changed and the file
    /// exists. A broken file is reported in the returned warnings and
    /// otherwise ignored.
    pub fn layered(&self) -> (Self, Vec<String>) {
        let mut settings = self.clone();
        let mut warnings = Vec::new();
        if let Some(path) = self.user_config_path() {
            if self.can_change_keys() && path.is_file() {
                match UserConfig::load(&path) {
                    Ok(config) => settings.overlay(&config),
                    Err(err) => warnings.push(format!("error loading user config: {err:#}")),
                }
            }
        }
        (settings, warnings)
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn overlay(&mut self, config: &UserConfig) {
        for (key, value) in config.entries() {
            let text = match value {
                Value::String(text) => text.clone(),
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                _ => continue,
            };
            self.values.insert(key.clone(), text);
        }
    }

    pub fn app_data_directory(&self) -> PathBuf {
        PathBuf::from(
            self.get("APP_DATA_DIRECTORY")
                .unwrap_or(DEFAULT_APP_DATA_DIRECTORY),
        )
    }

    pub fn user_config_path(&self) -> Option<PathBuf> {
        self.get("USER_CONFIG_PATH").map(PathBuf::from)
    }

    pub fn can_change_keys(&self) -> bool {
        self.get("CAN_CHANGE_KEYS") != Some("false")
    }

    pub fn provider(&self) -> Result<LlmProvider> {
        let name = self
            .get("LLM")
            .ok_or_else(|| ApiError::bad_request("LLM provider is not configured"))?;
        name.parse::<LlmProvider>()
            .map_err(|err| anyhow::Error::from(ApiError::bad_request(err.to_string())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn overlay_replaces_env_values() {
        let mut settings = Settings::default()
            .with("LLM", "openai")
            .with("OPENAI_MODEL", "gpt-4.1");
        let config = UserConfig::from_value(json!({
            "LLM": "custom",
            "CUSTOM_MODEL": "qwen-max",
            "DISABLE_THINKING": true,
            "nested": { "ignored": 1 }
        }))
        .unwrap();
        settings.overlay(&config);
        assert_eq!(settings.provider().unwrap(), LlmProvider::Custom);
        assert_eq!(settings.get("CUSTOM_MODEL"), Some("qwen-max"));
        assert_eq!(settings.get("DISABLE_THINKING"), Some("true"));
        assert_eq!(settings.get("nested"), None);
    }

    #[test]
    fn missing_provider_is_a_bad_request() {
        let err = Settings::default().provider().unwrap_err();
        assert_eq!(err.downcast_ref::<ApiError>().map(|e| e.status), Some(400));
    }

    #[test]
    fn layered_reads_user_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("userConfig.json");
        std::fs::write(&path, r#"{"LLM":"ollama","OLLAMA_MODEL":"qwen2.5"}"#).unwrap();
        let base = Settings::default()
            .with("LLM", "openai")
            .with("USER_CONFIG_PATH", path.to_string_lossy());

        let (settings, warnings) = base.layered();
        assert!(warnings.is_empty());
        assert_eq!(settings.provider().unwrap(), LlmProvider::Ollama);

        let (locked, _) = base.clone().with("CAN_CHANGE_KEYS", "false").layered();
        assert_eq!(locked.provider().unwrap(), LlmProvider::OpenAi);

        std::fs::write(&path, "{broken").unwrap();
        let (fallback, warnings) = base.layered();
        assert_eq!(warnings.len(), 1);
        assert_eq!(fallback.get("LLM"), Some("openai"));
    }

    #[test]
    fn keys_change_unless_locked() {
        assert!(Settings::default().can_change_keys());
        assert!(!Settings::default().with("CAN_CHANGE_KEYS", "false").can_change_keys());
        assert_eq!(
            Settings::default().app_data_directory(),
            PathBuf::from(DEFAULT_APP_DATA_DIRECTORY)
        );
    }
}
