pub mod manager;
pub mod routes;

use std::collections::HashMap;
use std::io::Cursor;
use std::net::TcpListener;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use base64::Engine;
use manager::HttpHostControl;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tiny_http::{Header, Response, StatusCode};
use url::Url;

use crate::error::ApiError;
use crate::registry::{Context, Registry};
use crate::tooling::log_event;

pub use routes::{api_routes, register_api, serve, AppState};

pub const CONTRACT_HTTP_HOST: &str = "presenton://env/http_host@1";
pub const CONTRACT_HTTP_HOST_STOP: &str = "presenton://env/http_host/stop@1";

const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, PUT, PATCH, DELETE, OPTIONS"),
    ("Access-Control-Allow-Headers", "*"),
];

/// Binds `METHOD path` to the contract that handles it. The contract receives
/// `{ "request": ... }` and answers `{ "status"?, "body" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    pub method: String,
    pub path: String,
    pub call: String,
}

impl Route {
    pub fn new(method: &str, path: &str, call: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            path: join_paths(&["/", path]),
            call: call.to_string(),
        }
    }

    fn key(&self) -> String {
        format!("{} {}", self.method.to_uppercase(), join_paths(&["/", &self.path]))
    }
}

pub fn register_http_contracts(registry: &Registry) {
    registry.register(CONTRACT_HTTP_HOST, env_http_host_contract);
    registry.register(CONTRACT_HTTP_HOST_STOP, env_http_host_stop_contract);
}

fn normalize_segment(segment: &str) -> Option<String> {
    let trimmed = segment.trim();
    if trimmed.is_empty() || trimmed == "/" {
        return None;
    }
    let stripped = trimmed.trim_matches('/');
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

fn join_paths(parts: &[&str]) -> String {
    let segments: Vec<String> = parts.iter().filter_map(|part| normalize_segment(part)).collect();
    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", segments.join("/"))
    }
}

fn env_http_host_stop_contract(
    ctx: &mut Context,
    input: Value,
    _meta: Option<Value>,
) -> Result<Value> {
    let handle = input
        .get("handle")
        .cloned()
        .ok_or_else(|| anyhow!("handle is required to stop http host"))?;
    ctx.stop_http_host(&handle)
}

fn env_http_host_contract(ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let host = input
        .get("host")
        .and_then(Value::as_str)
        .unwrap_or("127.0.0.1")
        .to_string();
    let port_value = input.get("port").and_then(Value::as_u64).unwrap_or(0);
    if port_value > u16::MAX as u64 {
        return Err(anyhow!("env/http_host requires a valid port"));
    }
    let routes: Vec<Route> = match input.get("routes") {
        Some(value) => serde_json::from_value(value.clone()).context("invalid route list")?,
        None => Vec::new(),
    };
    start_http_host(ctx, &host, port_value as u16, &routes)
}

/// Starts a host on its own thread and registers its stop handle with the
/// context. Port 0 picks a free port; the result carries the bound `url`.
pub fn start_http_host(ctx: &mut Context, host: &str, port: u16, routes: &[Route]) -> Result<Value> {
    let mut route_map: HashMap<String, Route> = HashMap::new();
    for route in routes {
        let key = route.key();
        if route_map.contains_key(&key) {
            return Err(anyhow!("duplicate route registered: {key}"));
        }
        route_map.insert(key, route.clone());
    }

    let listener = TcpListener::bind((host, port))
        .with_context(|| format!("unable to bind HTTP host socket on {host}:{port}"))?;
    let actual_port = listener.local_addr()?.port();
    let server = Arc::new(
        tiny_http::Server::from_listener(listener, None)
            .map_err(|err| anyhow!("failed to create HTTP server: {err}"))?,
    );
    let running = Arc::new(AtomicBool::new(true));

    let registry = ctx.registry_clone();
    let server_for_thread = Arc::clone(&server);
    let running_flag = Arc::clone(&running);
    let route_map = Arc::new(route_map);

    let thread_handle = thread::spawn(move || {
        let mut incoming = server_for_thread.incoming_requests();
        while running_flag.load(Ordering::SeqCst) {
            match incoming.next() {
                Some(request) => {
                    if let Err(err) = handle_http_request(&registry, route_map.as_ref(), request) {
                        let mut log_ctx = registry.context();
                        log_event(
                            &mut log_ctx,
                            "error",
                            "http host failed to answer request",
                            Some(json!({ "error": format!("{err:#}") })),
                        );
                    }
                }
                None => {
                    if !running_flag.load(Ordering::SeqCst) {
                        break;
                    }
                }
            }
        }
    });

    let control = HttpHostControl::new(server, running, thread_handle);
    let handle_value = ctx.register_http_host(control);

    let public_host = match host {
        "0.0.0.0" | "::" => "127.0.0.1",
        other => other,
    };
    let mut listed: Vec<Value> = routes
        .iter()
        .map(|route| json!({ "method": route.method, "path": route.path, "call": route.call }))
        .collect();
    listed.sort_by_key(|route| route["path"].as_str().unwrap_or_default().to_string());

    Ok(json!({
        "url": format!("http://{public_host}:{actual_port}"),
        "port": actual_port,
        "routes": listed,
        "handle": handle_value
    }))
}

fn json_response(status: u16, body: &Value) -> Response<Cursor<Vec<u8>>> {
    let data = if status == 204 {
        Vec::new()
    } else {
        serde_json::to_vec(body).unwrap_or_default()
    };
    let mut response = Response::from_data(data).with_status_code(StatusCode(status));
    let content_type = [("Content-Type", "application/json")];
    for (name, value) in CORS_HEADERS.iter().chain(content_type.iter()) {
        if let Ok(header) = Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            response = response.with_header(header);
        }
    }
    response
}

/// Maps a handler failure onto a status and a `{"detail"}` body.
pub fn error_response(err: &anyhow::Error) -> (u16, Value) {
    match err.downcast_ref::<ApiError>() {
        Some(api) => (api.status, json!({ "detail": api.detail })),
        None => (500, json!({ "detail": format!("{err:#}") })),
    }
}

fn push_multi(map: &mut Map<String, Value>, key: String, value: String) {
    let entry = map.entry(key).or_insert(Value::Null);
    match entry {
        Value::Null => *entry = Value::String(value),
        Value::String(existing) => {
            *entry = Value::Array(vec![Value::String(existing.clone()), Value::String(value)]);
        }
        Value::Array(items) => items.push(Value::String(value)),
        _ => {}
    }
}

fn handle_http_request(
    registry: &Registry,
    routes: &HashMap<String, Route>,
    mut request: tiny_http::Request,
) -> Result<()> {
    let started = Instant::now();
    let method = request.method().as_str().to_uppercase();
    let raw_url = request.url().to_string();
    let (path_part, query_part) = match raw_url.split_once('?') {
        Some((path, query)) => (path.to_string(), Some(query.to_string())),
        None => (raw_url.clone(), None),
    };
    let normalized_path = join_paths(&["/", &path_part]);
    let mut ctx = registry.context();
    let mut tags = Map::new();
    tags.insert("method".to_string(), json!(method));
    tags.insert("path".to_string(), json!(normalized_path));
    ctx.push_log_tags(tags);

    let (status, body) = if method == "OPTIONS" {
        (204, Value::Null)
    } else if let Some(route) = routes.get(&format!("{method} {normalized_path}")) {
        let outcome = build_request_context(&mut request, &method, &normalized_path, query_part.as_deref())
            .and_then(|request_context| ctx.call(&route.call, json!({ "request": request_context }), None));
        match outcome {
            Ok(result) => {
                let status = result
                    .get("status")
                    .and_then(Value::as_u64)
                    .unwrap_or(200)
                    .clamp(100, 599) as u16;
                (status, result.get("body").cloned().unwrap_or(Value::Null))
            }
            Err(err) => {
                let (status, body) = error_response(&err);
                log_event(
                    &mut ctx,
                    if status >= 500 { "error" } else { "warn" },
                    "http handler failed",
                    Some(json!({ "path": normalized_path, "status": status, "error": format!("{err:#}") })),
                );
                (status, body)
            }
        }
    } else {
        (404, json!({ "error": "Not found" }))
    };

    request.respond(json_response(status, &body))?;
    log_event(
        &mut ctx,
        "info",
        "http request",
        Some(json!({
            "method": method,
            "path": normalized_path,
            "status": status,
            "durationMs": started.elapsed().as_millis() as u64
        })),
    );
    Ok(())
}

fn build_request_context(
    request: &mut tiny_http::Request,
    method: &str,
    path: &str,
    query: Option<&str>,
) -> Result<Value> {
    let mut body_bytes = Vec::new();
    request
        .as_reader()
        .read_to_end(&mut body_bytes)
        .context("failed to read request body")?;

    let mut headers = Map::new();
    for header in request.headers() {
        push_multi(
            &mut headers,
            header.field.to_string().to_ascii_lowercase(),
            header.value.to_string(),
        );
    }
    let content_type = headers
        .get("content-type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_lowercase();

    let parsed_url = Url::parse(&format!("http://local.host{}", request.url()))?;
    let mut query_map = Map::new();
    for (key, value) in parsed_url.query_pairs() {
        push_multi(&mut query_map, key.into_owned(), value.into_owned());
    }

    let body = if body_bytes.is_empty() {
        Value::Null
    } else if content_type.starts_with("application/json") {
        serde_json::from_slice::<Value>(&body_bytes)
            .map_err(|err| ApiError::unprocessable(format!("Invalid JSON body: {err}")))?
    } else if content_type.starts_with("multipart/") {
        Value::Null
    } else {
        Value::String(String::from_utf8_lossy(&body_bytes).to_string())
    };
    let raw_body = if body_bytes.is_empty() {
        Value::Null
    } else {
        Value::String(base64::engine::general_purpose::STANDARD.encode(&body_bytes))
    };

    Ok(json!({
        "method": method,
        "path": path,
        "url": match query {
            Some(q) => format!("{path}?{q}"),
            None => path.to_string(),
        },
        "query": query_map,
        "headers": headers,
        "body": body,
        "rawBody": raw_body
    }))
}
