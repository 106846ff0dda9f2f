use std::fs;
use std::path::Path;

use anyhow::{bail, Context as AnyhowContext, Result};
use serde_json::{Map, Value};

/// The JSON object stored at `USER_CONFIG_PATH`. Unknown keys are kept.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserConfig(Map<String, Value>);

impl UserConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read user config {}", path.display()))?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let value: Value = serde_json::from_str(&text)
            .with_context(|| format!("invalid JSON in user config {}", path.display()))?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => bail!("user config must be a JSON object, got {other}"),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Shallow-merges `patch` over the file contents (a missing file counts
    /// as empty), writes the result back and returns it.
    pub fn merge_into_file(path: &Path, patch: &Value) -> Result<Map<String, Value>> {
        let Value::Object(patch) = patch else {
            bail!("user config update must be a JSON object");
        };
        let mut merged = if path.is_file() {
            Self::load(path)?.0
        } else {
            Map::new()
        };
        for (key, value) in patch {
            merged.insert(key.clone(), value.clone());
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("unable to create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(&Value::Object(merged.clone()))?;
        fs::write(path, text)
            .with_context(|| format!("unable to write user config {}", path.display()))?;
        Ok(merged)
    }
}
