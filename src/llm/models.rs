use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use crate::error::ApiError;

/// Lists model ids from an OpenAI-compatible `GET /models` endpoint.
pub fn list_available_models(url: &str, api_key: &str) -> Result<Vec<String>> {
    if url.trim().is_empty() || api_key.trim().is_empty() {
        return Err(ApiError::bad_request("URL and API Key are required").into());
    }
    let models_url = format!("{}/models", url.trim().trim_end_matches('/'));
    let agent = ureq::AgentBuilder::new()
        .timeout(Duration::from_secs(30))
        .build();
    let response = agent
        .get(&models_url)
        .set("Authorization", &format!("Bearer {api_key}"))
        .set("Content-Type", "application/json")
        .call();
    let body: Value = match response {
        Ok(response) => response
            .into_json()
            .map_err(|err| ApiError::bad_gateway(format!("invalid models response: {err}")))?,
        Err(ureq::Error::Status(status, response)) => {
            let reason = response.status_text().to_string();
            return Err(ApiError::new(status, format!("Failed to fetch models: {reason}")).into());
        }
        Err(err) => {
            return Err(ApiError::internal(format!("Internal server error: {err}")).into());
        }
    };
    Ok(model_ids(&body))
}

/// Accepts `{ "data": [{ "id": .. }] }` as well as bare arrays of model
/// objects or names.
pub fn model_ids(body: &Value) -> Vec<String> {
    let entries = match body {
        Value::Object(map) => match map.get("data") {
            Some(Value::Array(items)) => items,
            _ => return Vec::new(),
        },
        Value::Array(items) => items,
        _ => return Vec::new(),
    };
    entries
        .iter()
        .filter_map(|entry| match entry {
            Value::String(name) => Some(name.clone()),
            Value::Object(map) => map
                .get("id")
                .or_else(|| map.get("name"))
                .and_then(Value::as_str)
                .map(String::from),
            _ => None,
        })
        .collect()
}
