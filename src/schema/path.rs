use std::fmt;

use anyhow::{anyhow, Result};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Key(key) => write!(f, "{key}"),
            PathSegment::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Renders a path the way error messages show it: `$/properties/a/items`.
pub fn display_path(path: &[PathSegment]) -> String {
    let mut out = String::from("$");
    for segment in path {
        out.push('/');
        out.push_str(&segment.to_string());
    }
    out
}

/// Paths to every object in `root` that directly contains `key`, in document
/// order. The root itself is the empty path.
pub fn paths_with_key(root: &Value, key: &str) -> Vec<Vec<PathSegment>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    collect_paths(root, key, &mut current, &mut out);
    out
}

fn collect_paths(
    value: &Value,
    key: &str,
    current: &mut Vec<PathSegment>,
    out: &mut Vec<Vec<PathSegment>>,
) {
    match value {
        Value::Object(map) => {
            if map.contains_key(key) {
                out.push(current.clone());
            }
            for (child_key, child) in map {
                current.push(PathSegment::Key(child_key.clone()));
                collect_paths(child, key, current, out);
                current.pop();
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                current.push(PathSegment::Index(index));
                collect_paths(child, key, current, out);
                current.pop();
            }
        }
        _ => {}
    }
}

pub fn value_at_path<'a>(mut current: &'a Value, segments: &[PathSegment]) -> Option<&'a Value> {
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get(key)?,
            (PathSegment::Index(index), Value::Array(vec)) => vec.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

pub fn value_at_path_mut<'a>(
    mut current: &'a mut Value,
    segments: &[PathSegment],
) -> Option<&'a mut Value> {
    for segment in segments {
        current = match (segment, current) {
            (PathSegment::Key(key), Value::Object(map)) => map.get_mut(key)?,
            (PathSegment::Index(index), Value::Array(vec)) => vec.get_mut(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolves a local JSON pointer such as `#/$defs/Item` against `root`.
pub fn resolve_pointer<'a>(root: &'a Value, reference: &str) -> Result<&'a Value> {
    let pointer = reference
        .strip_prefix('#')
        .ok_or_else(|| anyhow!("only local references are supported, got `{reference}`"))?;
    if pointer.is_empty() {
        return Ok(root);
    }
    root.pointer(pointer)
        .ok_or_else(|| anyhow!("reference `{reference}` does not point into the document"))
}
