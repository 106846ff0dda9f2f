use serde_json::Value;

use crate::error::SchemaError;
use crate::schema::path::{display_path, resolve_pointer, PathSegment};

pub const SUPPORTED_STRING_FORMATS: [&str; 9] = [
    "date-time", "time", "date", "duration", "email", "hostname", "ipv4", "ipv6", "uuid",
];

/// Normalises a whole document for providers that enforce strict structured
/// output. `schema` is both the node being normalised and the `$ref` root.
pub fn ensure_strict(schema: &Value) -> Result<Value, SchemaError> {
    ensure_strict_json_schema(schema.clone(), &mut Vec::new(), schema)
}

/// Normalises `node` (located at `path` inside `root`):
/// objects get `additionalProperties: false`, every property becomes required,
/// single-entry `allOf` is inlined, unsupported string formats and `null`
/// defaults are dropped, and `$ref`s with sibling keys are expanded.
pub fn ensure_strict_json_schema(
    node: Value,
    path: &mut Vec<PathSegment>,
    root: &Value,
) -> Result<Value, SchemaError> {
    normalise(node, path, root, &mut Vec::new())
}

/// `expanding` holds the references whose expansion encloses `node`; meeting
/// one of them again leaves that `$ref` unexpanded.
fn normalise(
    node: Value,
    path: &mut Vec<PathSegment>,
    root: &Value,
    expanding: &mut Vec<String>,
) -> Result<Value, SchemaError> {
    let Value::Object(mut schema) = node else {
        return Err(SchemaError::NotAnObject {
            path: display_path(path),
        });
    };

    for defs_key in ["$defs", "definitions"] {
        if let Some(Value::Object(defs)) = schema.get_mut(defs_key) {
            let entries = std::mem::take(defs);
            for (name, def_schema) in entries {
                path.push(PathSegment::Key(defs_key.to_string()));
                path.push(PathSegment::Key(name.clone()));
                let normalised = normalise(def_schema, path, root, expanding);
                path.truncate(path.len() - 2);
                defs.insert(name, normalised?);
            }
        }
    }

    let typ = schema.get("type").and_then(Value::as_str).map(str::to_string);
    if typ.as_deref() == Some("object") && !schema.contains_key("additionalProperties") {
        schema.insert("additionalProperties".to_string(), Value::Bool(false));
    }

    if let Some(Value::Object(properties)) = schema.get_mut("properties") {
        let entries = std::mem::take(properties);
        let required: Vec<Value> = entries.keys().cloned().map(Value::String).collect();
        for (key, prop_schema) in entries {
            path.push(PathSegment::Key("properties".to_string()));
            path.push(PathSegment::Key(key.clone()));
            let result = normalise(prop_schema, path, root, expanding);
            path.truncate(path.len() - 2);
            properties.insert(key, result?);
        }
        schema.insert("required".to_string(), Value::Array(required));
    }

    if let Some(items @ Value::Object(_)) = schema.get_mut("items") {
        path.push(PathSegment::Key("items".to_string()));
        let result = normalise(std::mem::take(items), path, root, expanding);
        path.pop();
        *items = result?;
    }

    if let Some(Value::Array(variants)) = schema.get_mut("anyOf") {
        let entries = std::mem::take(variants);
        for (index, variant) in entries.into_iter().enumerate() {
            path.push(PathSegment::Key("anyOf".to_string()));
            path.push(PathSegment::Index(index));
            let result = normalise(variant, path, root, expanding);
            path.truncate(path.len() - 2);
            variants.push(result?);
        }
    }

    let single_all_of = matches!(schema.get("allOf"), Some(Value::Array(entries)) if entries.len() == 1);
    if single_all_of {
        if let Some(Value::Array(mut entries)) = schema.shift_remove("allOf") {
            path.push(PathSegment::Key("allOf".to_string()));
            path.push(PathSegment::Index(0));
            let result = normalise(entries.remove(0), path, root, expanding);
            path.truncate(path.len() - 2);
            if let Value::Object(inlined) = result? {
                for (key, value) in inlined {
                    schema.insert(key, value);
                }
            }
        }
    } else if let Some(Value::Array(entries)) = schema.get_mut("allOf") {
        let taken = std::mem::take(entries);
        for (index, entry) in taken.into_iter().enumerate() {
            path.push(PathSegment::Key("allOf".to_string()));
            path.push(PathSegment::Index(index));
            let result = normalise(entry, path, root, expanding);
            path.truncate(path.len() - 2);
            entries.push(result?);
        }
    }

    if typ.as_deref() == Some("string") {
        let unsupported = schema
            .get("format")
            .is_some_and(|format| !format.as_str().is_some_and(|f| SUPPORTED_STRING_FORMATS.contains(&f)));
        if unsupported {
            schema.shift_remove("format");
        }
    }

    if schema.get("default").is_some_and(Value::is_null) {
        schema.shift_remove("default");
    }

    if schema.len() > 1 {
        let reference = match schema.get("$ref") {
            Some(Value::String(reference)) if !expanding.contains(reference) => Some(reference.clone()),
            _ => None,
        };
        if let Some(reference) = reference {
            let resolved = resolve_pointer(root, &reference)
                .ok()
                .and_then(Value::as_object)
                .ok_or_else(|| SchemaError::UnresolvedRef(reference.clone()))?;
            let mut merged = resolved.clone();
            schema.shift_remove("$ref");
            for (key, value) in schema {
                merged.insert(key, value);
            }
            expanding.push(reference);
            let result = normalise(Value::Object(merged), path, root, expanding);
            expanding.pop();
            return result;
        }
    }

    Ok(Value::Object(schema))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn object_nodes_become_closed_and_fully_required() {
        let schema = json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "format": "markdown" },
                "when": { "type": "string", "format": "date" },
                "note": { "type": "string", "default": null }
            },
            "required": ["title"]
        });
        let out = ensure_strict(&schema).unwrap();
        assert_eq!(out["additionalProperties"], json!(false));
        assert_eq!(out["required"], json!(["title", "when", "note"]));
        assert_eq!(out["properties"]["title"], json!({ "type": "string" }));
        assert_eq!(out["properties"]["when"]["format"], json!("date"));
        assert!(out["properties"]["note"].get("default").is_none());
    }

    #[test]
    fn non_object_node_reports_path() {
        let schema = json!({ "properties": { "a": true } });
        let err = ensure_strict(&schema).unwrap_err();
        assert_eq!(
            err,
            SchemaError::NotAnObject {
                path: "$/properties/a".into()
            }
        );
    }

    #[test]
    fn any_of_variants_are_normalised() {
        let schema = json!({
            "anyOf": [
                { "type": "object", "properties": { "a": { "type": "string" } } },
                { "type": "string", "format": "markdown" }
            ]
        });
        let out = ensure_strict(&schema).unwrap();
        assert_eq!(
            out,
            json!({
                "anyOf": [
                    {
                        "type": "object",
                        "properties": { "a": { "type": "string" } },
                        "additionalProperties": false,
                        "required": ["a"]
                    },
                    { "type": "string" }
                ]
            })
        );
    }

    #[test]
    fn single_all_of_is_inlined() {
        let schema = json!({
            "description": "wrapper",
            "allOf": [{ "type": "object", "properties": { "a": { "type": "integer" } } }]
        });
        let out = ensure_strict(&schema).unwrap();
        assert_eq!(
            out,
            json!({
                "description": "wrapper",
                "type": "object",
                "properties": { "a": { "type": "integer" } },
                "additionalProperties": false,
                "required": ["a"]
            })
        );
        assert!(out.get("allOf").is_none());
    }

    #[test]
    fn multi_all_of_entries_are_normalised_in_place() {
        let schema = json!({
            "allOf": [
                { "type": "object", "properties": { "a": {} } },
                { "type": "string", "format": "markdown" }
            ]
        });
        let out = ensure_strict(&schema).unwrap();
        assert_eq!(
            out,
            json!({
                "allOf": [
                    {
                        "type": "object",
                        "properties": { "a": {} },
                        "additionalProperties": false,
                        "required": ["a"]
                    },
                    { "type": "string" }
                ]
            })
        );
    }

    #[test]
    fn ref_with_siblings_expands_and_node_keys_win() {
        let schema = json!({
            "$defs": { "Name": { "type": "string", "description": "base", "format": "markdown" } },
            "properties": {
                "name": { "$ref": "#/$defs/Name", "description": "override" },
                "alias": { "$ref": "#/$defs/Name" }
            }
        });
        let out = ensure_strict(&schema).unwrap();
        assert_eq!(
            out["properties"]["name"],
            json!({ "type": "string", "description": "override" })
        );
        assert_eq!(out["properties"]["alias"], json!({ "$ref": "#/$defs/Name" }));
        assert_eq!(out["required"], json!(["name", "alias"]));
    }

    #[test]
    fn unresolvable_ref_is_an_error() {
        let schema = json!({
            "properties": { "n": { "$ref": "#/$defs/Missing", "description": "x" } }
        });
        assert_eq!(
            ensure_strict(&schema).unwrap_err(),
            SchemaError::UnresolvedRef("#/$defs/Missing".into())
        );
    }

    #[test]
    fn recursive_refs_with_siblings_terminate() {
        let schema = json!({
            "properties": { "head": { "$ref": "#/$defs/Node" } },
            "$defs": {
                "Node": {
                    "type": "object",
                    "properties": {
                        "value": { "type": "string" },
                        "next": { "$ref": "#/$defs/Node", "description": "next node" }
                    }
                }
            }
        });
        let out = ensure_strict(&schema).unwrap();
        assert_eq!(out["properties"]["head"], json!({ "$ref": "#/$defs/Node" }));
        let next = &out["$defs"]["Node"]["properties"]["next"];
        assert_eq!(next["description"], "next node");
        assert_eq!(next["additionalProperties"], json!(false));
        assert_eq!(next["required"], json!(["value", "next"]));
        assert_eq!(
            next["properties"]["next"],
            json!({ "$ref": "#/$defs/Node", "description": "next node" })
        );
    }

    #[test]
    fn root_ref_with_siblings_terminates() {
        let schema = json!({
            "type": "object",
            "properties": { "child": { "$ref": "#", "description": "subtree" } }
        });
        let out = ensure_strict(&schema).unwrap();
        let child = &out["properties"]["child"];
        assert_eq!(child["description"], "subtree");
        assert_eq!(child["additionalProperties"], json!(false));
        assert_eq!(
            child["properties"]["child"],
            json!({ "$ref": "#", "description": "subtree" })
        );
    }
}
