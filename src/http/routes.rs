use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use base64::Engine;
use serde_json::{json, Value};

use crate::config::{Settings, UserConfig};
use crate::error::ApiError;
use crate::http::{start_http_host, Route};
use crate::llm::{list_available_models, LlmClient, OpenAiCompatibleClient};
use crate::registry::{Context, ContractMetadata, Registry};
use crate::schools::{UniversityDirectory, DEFAULT_LIST_LIMIT, DEFAULT_SEARCH_LIMIT};
use crate::slides::{generate_slide_content, prepare_response_schema, SlideContentRequest};
use crate::templates;
use crate::tooling::log_event;

pub const CONTRACT_TEMPLATE_UPLOAD: &str = "presenton://api/templates/request_upload@1";
pub const CONTRACT_SCHOOLS_SEARCH: &str = "presenton://api/schools/search@1";
pub const CONTRACT_SCHOOLS_LIST: &str = "presenton://api/schools/list@1";
pub const CONTRACT_MODELS_AVAILABLE: &str = "presenton://api/models/available@1";
pub const CONTRACT_SLIDE_CONTENT: &str = "presenton://api/slides/content@1";
pub const CONTRACT_SCHEMA_PREPARE: &str = "presenton://api/schema/prepare@1";
pub const CONTRACT_USER_CONFIG_GET: &str = "presenton://api/user_config/get@1";
pub const CONTRACT_USER_CONFIG_UPDATE: &str = "presenton://api/user_config/update@1";

/// Shared state behind the API contracts.
pub struct AppState {
    settings: Settings,
    data_dir: PathBuf,
    directory: Mutex<UniversityDirectory>,
    llm: Option<(Arc<dyn LlmClient>, String)>,
}

impl AppState {
    pub fn new(settings: Settings, data_dir: PathBuf, directory: UniversityDirectory) -> Self {
        Self {
            settings,
            data_dir,
            directory: Mutex::new(directory),
            llm: None,
        }
    }

    /// Uses `client` and `model` instead of building a client from settings.
    pub fn with_llm_client(mut self, client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        self.llm = Some((client, model.into()));
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn llm(&self, settings: &Settings) -> Result<(Arc<dyn LlmClient>, String)> {
        if let Some((client, model)) = &self.llm {
            return Ok((Arc::clone(client), model.clone()));
        }
        let provider = settings.provider()?;
        let client = OpenAiCompatibleClient::from_settings(provider, settings)
            .map_err(|err| ApiError::bad_request(err.to_string()))?;
        Ok((Arc::new(client), provider.model(settings)))
    }
}

pub fn api_routes() -> Vec<Route> {
    vec![
        Route::new("POST", "/api/v1/templates/request-upload", CONTRACT_TEMPLATE_UPLOAD),
        Route::new("GET", "/api/v1/schools/search", CONTRACT_SCHOOLS_SEARCH),
        Route::new("GET", "/api/v1/schools", CONTRACT_SCHOOLS_LIST),
        Route::new("POST", "/api/v1/ppt/openai/models/available", CONTRACT_MODELS_AVAILABLE),
        Route::new("POST", "/api/v1/ppt/slide-content", CONTRACT_SLIDE_CONTENT),
        Route::new("POST", "/api/v1/ppt/schema/prepare", CONTRACT_SCHEMA_PREPARE),
        Route::new("GET", "/api/user-config", CONTRACT_USER_CONFIG_GET),
        Route::new("POST", "/api/user-config", CONTRACT_USER_CONFIG_UPDATE),
    ]
}

type Handler = fn(&mut Context, &AppState, &Value) -> Result<Value>;

/// Route contracts only see `request` and only answer `status` and `body`.
fn bind(registry: &Registry, name: &str, state: &Arc<AppState>, handler: Handler) {
    let state = Arc::clone(state);
    registry.register_with_metadata(
        name,
        move |ctx: &mut Context, input: Value, _meta: Option<Value>| -> Result<Value> {
            let request = input.get("request").cloned().unwrap_or(Value::Null);
            let body = handler(ctx, &state, &request)?;
            Ok(json!({ "status": 200, "body": body }))
        },
        ContractMetadata::new(&["request"], &["status", "body"]),
    );
}

pub fn register_api(registry: &Registry, state: Arc<AppState>) {
    bind(registry, CONTRACT_TEMPLATE_UPLOAD, &state, template_upload);
    bind(registry, CONTRACT_SCHOOLS_SEARCH, &state, schools_search);
    bind(registry, CONTRACT_SCHOOLS_LIST, &state, schools_list);
    bind(registry, CONTRACT_MODELS_AVAILABLE, &state, models_available);
    bind(registry, CONTRACT_SLIDE_CONTENT, &state, slide_content);
    bind(registry, CONTRACT_SCHEMA_PREPARE, &state, schema_prepare);
    bind(registry, CONTRACT_USER_CONFIG_GET, &state, user_config_get);
    bind(registry, CONTRACT_USER_CONFIG_UPDATE, &state, user_config_update);
}

/// Registers the API contracts and starts a host serving [`api_routes`].
pub fn serve(ctx: &mut Context, host: &str, port: u16, state: Arc<AppState>) -> Result<Value> {
    register_api(&ctx.registry_clone(), state);
    start_http_host(ctx, host, port, &api_routes())
}

fn query_param(request: &Value, name: &str) -> Option<String> {
    match request.get("query")?.get(name)? {
        Value::String(value) => Some(value.clone()),
        Value::Array(values) => values.first().and_then(Value::as_str).map(String::from),
        _ => None,
    }
}

fn usize_param(request: &Value, name: &str, default: usize) -> Result<usize> {
    match query_param(request, name) {
        Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
            anyhow::Error::from(ApiError::unprocessable(format!(
                "query parameter `{name}` must be a non-negative integer"
            )))
        }),
        None => Ok(default),
    }
}

fn json_body(request: &Value) -> Result<&Value> {
    match request.get("body") {
        Some(body @ Value::Object(_)) => Ok(body),
        _ => Err(ApiError::unprocessable("Expected a JSON object body").into()),
    }
}

fn template_upload(_ctx: &mut Context, state: &AppState, request: &Value) -> Result<Value> {
    let content_type = request
        .pointer("/headers/content-type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let raw = match request.get("rawBody").and_then(Value::as_str) {
        Some(encoded) => base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|err| anyhow!("request body is not valid base64: {err}"))?,
        None => Vec::new(),
    };
    let response = templates::handle_upload(state.data_dir(), content_type, &raw)?;
    Ok(serde_json::to_value(response)?)
}

fn schools_search(_ctx: &mut Context, state: &AppState, request: &Value) -> Result<Value> {
    let query = query_param(request, "q")
        .ok_or_else(|| ApiError::unprocessable("Field required: q"))?;
    let limit = usize_param(request, "limit", DEFAULT_SEARCH_LIMIT)?;
    let directory = state
        .directory
        .lock()
        .map_err(|_| anyhow!("university directory poisoned"))?;
    Ok(serde_json::to_value(directory.search(&query, limit)?)?)
}

fn schools_list(_ctx: &mut Context, state: &AppState, request: &Value) -> Result<Value> {
    let limit = usize_param(request, "limit", DEFAULT_LIST_LIMIT)?;
    let offset = usize_param(request, "offset", 0)?;
    let directory = state
        .directory
        .lock()
        .map_err(|_| anyhow!("university directory poisoned"))?;
    Ok(serde_json::to_value(directory.list(limit, offset))?)
}

fn models_available(_ctx: &mut Context, _state: &AppState, request: &Value) -> Result<Value> {
    let body = json_body(request)?;
    let url = body.get("url").and_then(Value::as_str).unwrap_or_default();
    let api_key = body.get("api_key").and_then(Value::as_str).unwrap_or_default();
    Ok(json!(list_available_models(url, api_key)?))
}

fn slide_content(ctx: &mut Context, state: &AppState, request: &Value) -> Result<Value> {
    let body = json_body(request)?;
    let slide_request: SlideContentRequest = serde_json::from_value(body.clone())
        .map_err(|err| ApiError::unprocessable(err.to_string()))?;
    let (settings, warnings) = state.settings.layered();
    for warning in warnings {
        log_event(ctx, "warn", &warning, None);
    }
    let (client, model) = state.llm(&settings)?;
    generate_slide_content(client.as_ref(), &model, &slide_request)
}

fn schema_prepare(_ctx: &mut Context, _state: &AppState, request: &Value) -> Result<Value> {
    let body = json_body(request)?;
    let layout = body
        .get("schema")
        .or_else(|| body.get("layout_schema"))
        .ok_or_else(|| ApiError::unprocessable("Field required: schema"))?;
    let schema = prepare_response_schema(layout)
        .map_err(|err| ApiError::unprocessable(err.to_string()))?;
    Ok(json!({ "schema": schema }))
}

fn user_config_path(settings: &Settings) -> Result<PathBuf> {
    if !settings.can_change_keys() {
        return Err(ApiError::forbidden("You are not allowed to access this resource").into());
    }
    settings
        .user_config_path()
        .ok_or_else(|| anyhow::Error::from(ApiError::internal("User config path not found")))
}

fn user_config_get(_ctx: &mut Context, state: &AppState, _request: &Value) -> Result<Value> {
    let path = user_config_path(&state.settings)?;
    if !path.is_file() {
        return Ok(json!({}));
    }
    Ok(UserConfig::load(&path)?.to_value())
}

fn user_config_update(ctx: &mut Context, state: &AppState, request: &Value) -> Result<Value> {
    let path = user_config_path(&state.settings)?;
    let patch = json_body(request)?;
    let merged = UserConfig::merge_into_file(&path, patch)?;
    let keys: Vec<&String> = merged.keys().collect();
    log_event(ctx, "info", "user config updated", Some(json!({ "keys": keys })));
    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_query_parameters() {
        let request = json!({ "query": { "q": ["浙江", "ignored"], "limit": "5", "offset": "x" } });
        assert_eq!(query_param(&request, "q").as_deref(), Some("浙江"));
        assert_eq!(usize_param(&request, "limit", 20).unwrap(), 5);
        assert_eq!(usize_param(&request, "missing", 20).unwrap(), 20);
        let err = usize_param(&request, "offset", 0).unwrap_err();
        assert_eq!(err.downcast_ref::<ApiError>().map(|e| e.status), Some(422));
    }

    #[test]
    fn user_config_is_locked_when_keys_cannot_change() {
        let settings = Settings::default()
            .with("USER_CONFIG_PATH", "/tmp/user.json")
            .with("CAN_CHANGE_KEYS", "false");
        let err = user_config_path(&settings).unwrap_err();
        assert_eq!(err.downcast_ref::<ApiError>().map(|e| e.status), Some(403));

        let err = user_config_path(&Settings::default()).unwrap_err();
        assert_eq!(err.downcast_ref::<ApiError>().map(|e| e.status), Some(500));
    }

    #[test]
    fn every_route_has_a_contract() {
        let registry = Registry::new();
        let state = Arc::new(AppState::new(
            Settings::default(),
            PathBuf::from("."),
            UniversityDirectory::in_memory(),
        ));
        register_api(&registry, state);
        for route in api_routes() {
            assert!(registry.contains(&route.call), "{}", route.call);
        }

        let mut ctx = registry.context();
        let out = ctx
            .call(
                CONTRACT_SCHEMA_PREPARE,
                json!({
                    "request": { "body": { "schema": { "type": "object", "properties": {} } } },
                    "ignored": true
                }),
                None,
            )
            .unwrap();
        assert_eq!(out["status"], 200);
        assert_eq!(out["body"]["schema"]["required"], json!(["__speaker_note__"]));
        assert_eq!(out.as_object().map(|m| m.len()), Some(2));
    }
}
