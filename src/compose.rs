use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::registry::Context;

/// One straight-line pipeline step: call a contract with inputs resolved from
/// the running state and copy selected outputs back into it.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Step {
    pub call: String,
    #[serde(default, rename = "in")]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub out: Map<String, Value>,
}

fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(part)?,
            Value::Array(arr) => {
                let idx: usize = part.parse().ok()?;
                current = arr.get(idx)?;
            }
            _ => return None,
        }
    }
    Some(current)
}

fn resolve_value(value: &Value, state: &Value) -> Value {
    match value {
        Value::String(s) if s == "$" => state.clone(),
        Value::String(s) => match s.strip_prefix("$.") {
            Some(stripped) => get_path(state, stripped).cloned().unwrap_or(Value::Null),
            None => value.clone(),
        },
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, nested)| (key.clone(), resolve_value(nested, state)))
                .collect(),
        ),
        Value::Array(items) => {
            Value::Array(items.iter().map(|item| resolve_value(item, state)).collect())
        }
        other => other.clone(),
    }
}

fn apply_outputs(state: &mut Map<String, Value>, mappings: &Map<String, Value>, output: &Value) {
    for (alias, key_value) in mappings {
        let resolved = match key_value {
            Value::String(s) if s == "$" => output.clone(),
            Value::String(s) => get_path(output, s).cloned().unwrap_or(Value::Null),
            other => other.clone(),
        };
        state.insert(alias.clone(), resolved);
    }
}

pub fn run_compose(ctx: &mut Context, steps: &[Step], initial_state: Value) -> Result<Value> {
    let mut state = initial_state.as_object().cloned().unwrap_or_default();
    for (index, step) in steps.iter().enumerate() {
        let snapshot = Value::Object(state.clone());
        let input = Value::Object(
            step.inputs
                .iter()
                .map(|(key, value)| (key.clone(), resolve_value(value, &snapshot)))
                .collect(),
        );
        let output = ctx
            .call(&step.call, input, None)
            .with_context(|| format!("step {index} ({}) failed", step.call))?;
        apply_outputs(&mut state, &step.out, &output);
    }
    Ok(Value::Object(state))
}

/// Parses a step list. `"-"` is shorthand for the identity mapping: an input
/// `"foo": "-"` reads `$.foo`, an output `"bar": "-"` copies `bar`.
pub fn parse_compose(value: &Value) -> Result<Vec<Step>> {
    let mut steps: Vec<Step> = serde_json::from_value(value.clone())?;
    for step in &mut steps {
        for (key, value) in step.inputs.iter_mut() {
            if value.as_str() == Some("-") {
                *value = Value::String(format!("$.{key}"));
            }
        }
        for (key, value) in step.out.iter_mut() {
            if value.as_str() == Some("-") {
                *value = Value::String(key.clone());
            }
        }
    }
    Ok(steps)
}

/// Loads steps from a JSON or YAML document, either a bare list or an object
/// with a `compose` list.
pub fn load_compose(path: &Path) -> Result<Vec<Step>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("unable to read compose file: {}", path.display()))?;
    let doc: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("invalid compose document: {}", path.display()))?;
    let steps = match doc {
        Value::Array(_) => doc,
        Value::Object(mut map) => map
            .shift_remove("compose")
            .ok_or_else(|| anyhow!("compose root missing in {}", path.display()))?,
        _ => return Err(anyhow!("compose must be a list in {}", path.display())),
    };
    parse_compose(&steps).with_context(|| format!("invalid compose structure in {}", path.display()))
}
