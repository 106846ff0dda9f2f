use serde_json::{Map, Value};

use crate::error::SchemaError;

/// Inlines local `$ref`s and drops the definitions table.
///
/// Definitions come from `$defs`, or from `definitions` when `$defs` is absent
/// or empty. A `$ref` is matched on its last path segment; siblings of a
/// resolved `$ref` are discarded. References to unknown names stay in place.
pub fn flatten_json_schema(schema: &Value) -> Result<Value, SchemaError> {
    let mut schema = schema.clone();
    let defs = match schema.as_object_mut() {
        Some(root) => take_definitions(root),
        None => Map::new(),
    };
    let mut expanding = Vec::new();
    resolve_refs(schema, &defs, &mut expanding)
}

fn take_definitions(root: &mut Map<String, Value>) -> Map<String, Value> {
    match root.shift_remove("$defs") {
        Some(Value::Object(defs)) if !defs.is_empty() => defs,
        _ => match root.shift_remove("definitions") {
            Some(Value::Object(defs)) => defs,
            _ => Map::new(),
        },
    }
}

fn reference_name(reference: &str) -> &str {
    reference.rsplit('/').next().unwrap_or(reference)
}

fn resolve_refs(
    node: Value,
    defs: &Map<String, Value>,
    expanding: &mut Vec<String>,
) -> Result<Value, SchemaError> {
    match node {
        Value::Object(map) => {
            if let Some(Value::String(reference)) = map.get("$ref") {
                let name = reference_name(reference);
                if let Some(definition) = defs.get(name) {
                    if expanding.iter().any(|active| active == name) {
                        return Err(SchemaError::CyclicRef(name.to_string()));
                    }
                    expanding.push(name.to_string());
                    let resolved = resolve_refs(definition.clone(), defs, expanding);
                    expanding.pop();
                    return resolved;
                }
            }
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                out.insert(key, resolve_refs(value, defs, expanding)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|item| resolve_refs(item, defs, expanding))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn inlines_nested_definitions() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": { "type": "array", "items": { "$ref": "#/$defs/Bullet" } }
            },
            "$defs": {
                "Bullet": {
                    "type": "object",
                    "properties": { "icon": { "$ref": "#/$defs/Icon" } }
                },
                "Icon": { "type": "object", "properties": { "__icon_query__": { "type": "string" } } }
            }
        });
        let out = flatten_json_schema(&schema).unwrap();
        assert!(out.get("$defs").is_none());
        assert_eq!(
            out["properties"]["items"]["items"]["properties"]["icon"],
            json!({ "type": "object", "properties": { "__icon_query__": { "type": "string" } } })
        );
    }

    #[test]
    fn falls_back_to_definitions_and_keeps_unknown_refs() {
        let schema = json!({
            "definitions": { "Name": { "type": "string" } },
            "properties": {
                "name": { "$ref": "#/definitions/Name", "description": "dropped" },
                "other": { "$ref": "#/definitions/Missing" }
            }
        });
        let out = flatten_json_schema(&schema).unwrap();
        assert_eq!(
            out,
            json!({
                "properties": {
                    "name": { "type": "string" },
                    "other": { "$ref": "#/definitions/Missing" }
                }
            })
        );
    }

    #[test]
    fn cyclic_definitions_are_rejected() {
        let schema = json!({
            "$defs": { "Node": { "properties": { "next": { "$ref": "#/$defs/Node" } } } },
            "$ref": "#/$defs/Node"
        });
        let err = flatten_json_schema(&schema).unwrap_err();
        assert_eq!(err, SchemaError::CyclicRef("Node".into()));
    }
}
