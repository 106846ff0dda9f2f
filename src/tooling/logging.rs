use std::io::{stderr, stdout, Write};
use std::str::FromStr;
use std::time::SystemTime;

use anyhow::{anyhow, Result};
use humantime::format_rfc3339;
use serde_json::{json, Map, Value};

use crate::registry::{Context, Registry};

pub const LOG_CONTRACT_ID: &str = "presenton://contract/tooling/log@1";
pub const KERNEL_HELPER_ID: &str = "presenton://kernel/log@1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl Level {
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Fatal => "fatal",
        }
    }
}

impl FromStr for Level {
    type Err = anyhow::Error;

    fn from_str(raw: &str) -> Result<Self> {
        Ok(match raw {
            "trace" => Level::Trace,
            "debug" => Level::Debug,
            "info" => Level::Info,
            "warn" => Level::Warn,
            "error" => Level::Error,
            "fatal" => Level::Fatal,
            other => return Err(anyhow!("unsupported log level: {other}")),
        })
    }
}

fn now_rfc3339() -> String {
    format_rfc3339(SystemTime::now()).to_string()
}

/// Only scalar tag values survive.
fn scalar_tags(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(tags)) => tags
            .into_iter()
            .filter(|(_, v)| matches!(v, Value::String(_) | Value::Number(_) | Value::Bool(_)))
            .collect(),
        _ => Map::new(),
    }
}

fn required_text(payload: &mut Map<String, Value>, key: &str) -> Result<String> {
    match payload.shift_remove(key) {
        Some(Value::String(text)) if !text.is_empty() => Ok(text),
        _ => Err(anyhow!("log payload missing '{key}'")),
    }
}

/// Validates a raw payload and turns it into the entry that gets written:
/// `{level, message, data?, error?, tags?, timestamp}`.
fn build_entry(ctx: &Context, input: Value, component: Option<&str>) -> Result<Map<String, Value>> {
    let mut payload = match input {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => return Err(anyhow!("log payload must be an object, got {other}")),
    };
    let level: Level = required_text(&mut payload, "level")?.parse()?;
    let message = required_text(&mut payload, "message")?;

    let mut entry = Map::new();
    entry.insert("level".to_string(), json!(level.as_str()));
    entry.insert("message".to_string(), json!(message));
    for key in ["data", "error"] {
        match payload.shift_remove(key) {
            Some(value @ Value::Object(_)) => {
                entry.insert(key.to_string(), value);
            }
            Some(_) => return Err(anyhow!("log '{key}' must be an object")),
            None => {}
        }
    }

    let mut tags: Map<String, Value> = ctx
        .log_tag_stack()
        .iter()
        .flat_map(|scope| scope.iter().map(|(k, v)| (k.clone(), v.clone())))
        .collect();
    if let Some(component) = component {
        tags.insert("component".to_string(), json!(component));
    }
    tags.extend(scalar_tags(payload.shift_remove("tags")));
    if !tags.is_empty() {
        entry.insert("tags".to_string(), Value::Object(tags));
    }

    let timestamp = match payload.shift_remove("timestamp") {
        Some(Value::String(ts)) => ts,
        Some(_) => return Err(anyhow!("log 'timestamp' must be a string")),
        None => now_rfc3339(),
    };
    entry.insert("timestamp".to_string(), Value::String(timestamp));
    Ok(entry)
}

/// One JSON line per entry; `error` and `fatal` go to stderr.
fn write_line(entry: &Map<String, Value>) {
    let Ok(line) = serde_json::to_string(entry) else {
        return;
    };
    let level = entry
        .get("level")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse::<Level>().ok())
        .unwrap_or(Level::Info);
    if level >= Level::Error {
        let _ = writeln!(stderr(), "{line}");
    } else {
        let _ = writeln!(stdout(), "{line}");
    }
}

fn emit(ctx: &mut Context, input: Value, component: Option<&str>) -> Result<Value> {
    let entry = build_entry(ctx, input, component)?;

    let rebound = ctx
        .binding_for(LOG_CONTRACT_ID)
        .filter(|target| target != LOG_CONTRACT_ID && target != KERNEL_HELPER_ID);
    let Some(target) = rebound else {
        write_line(&entry);
        return Ok(Value::Object(entry));
    };

    let registry = ctx.registry_clone();
    match registry.call(ctx, &target, Value::Object(entry.clone()), None) {
        Ok(Value::Null) => Ok(Value::Object(entry)),
        Ok(value) => Ok(value),
        Err(err) => {
            let mut failure = Map::new();
            failure.insert("level".to_string(), json!("error"));
            failure.insert("message".to_string(), json!("log handler failed"));
            failure.insert("data".to_string(), json!({ "target": target, "error": format!("{err:#}") }));
            failure.insert("timestamp".to_string(), json!(now_rfc3339()));
            write_line(&failure);
            Ok(Value::Null)
        }
    }
}

pub fn register_logging(registry: &Registry) {
    registry.register(
        LOG_CONTRACT_ID,
        |ctx: &mut Context, input: Value, _meta: Option<Value>| emit(ctx, input, None),
    );
    registry.register(
        KERNEL_HELPER_ID,
        |ctx: &mut Context, input: Value, _meta: Option<Value>| emit(ctx, input, Some("kernel")),
    );
}

/// Logs through the kernel helper. Never fails the caller: when logging is
/// not registered the payload goes straight to stderr.
pub fn log_event(ctx: &mut Context, level: &str, message: &str, data: Option<Value>) {
    let mut payload = json!({ "level": level, "message": message });
    if let Some(data) = data {
        payload["data"] = data;
    }
    if ctx.call(KERNEL_HELPER_ID, payload.clone(), None).is_err() {
        let _ = writeln!(stderr(), "{payload}");
    }
}
