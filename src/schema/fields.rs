use serde_json::{Map, Value};

use crate::error::SchemaError;
use crate::schema::path::{paths_with_key, value_at_path_mut};

/// Drops `fields` from every `properties` map and every `required` list in the
/// document.
pub fn remove_fields_from_schema<S: AsRef<str>>(schema: &Value, fields: &[S]) -> Value {
    let mut schema = schema.clone();
    let is_removed = |name: &str| fields.iter().any(|field| field.as_ref() == name);

    for path in paths_with_key(&schema, "properties") {
        let Some(Value::Object(parent)) = value_at_path_mut(&mut schema, &path) else {
            continue;
        };
        if let Some(Value::Object(properties)) = parent.get_mut("properties") {
            for field in fields {
                properties.shift_remove(field.as_ref());
            }
        }
    }

    for path in paths_with_key(&schema, "required") {
        let Some(Value::Object(parent)) = value_at_path_mut(&mut schema, &path) else {
            continue;
        };
        if let Some(Value::Array(required)) = parent.get_mut("required") {
            required.retain(|entry| !entry.as_str().is_some_and(is_removed));
        }
    }

    schema
}

/// Sets `properties.<name>` on the root schema and adds or removes `name` from
/// the root `required` list.
pub fn add_field_in_schema(
    schema: &Value,
    name: &str,
    field_schema: &Value,
    required: bool,
) -> Result<Value, SchemaError> {
    if !field_schema.is_object() {
        return Err(SchemaError::FieldSchemaNotObject(name.to_string()));
    }
    let mut updated = match schema {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    if !updated.get("properties").is_some_and(Value::is_object) {
        updated.insert("properties".to_string(), Value::Object(Map::new()));
    }
    if let Some(Value::Object(properties)) = updated.get_mut("properties") {
        properties.insert(name.to_string(), field_schema.clone());
    }

    let mut existing: Vec<Value> = match updated.get("required") {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    };
    if required {
        if !existing.iter().any(|entry| entry.as_str() == Some(name)) {
            existing.push(Value::String(name.to_string()));
        }
    } else {
        existing.retain(|entry| entry.as_str() != Some(name));
    }

    if existing.is_empty() {
        updated.shift_remove("required");
    } else {
        updated.insert("required".to_string(), Value::Array(existing));
    }
    Ok(Value::Object(updated))
}

/// Contract form of [`add_field_in_schema`]: `field` is `{name: schema}`.
pub fn add_field_entry(schema: &Value, field: &Value, required: bool) -> Result<Value, SchemaError> {
    let entries = field.as_object().ok_or(SchemaError::InvalidField)?;
    if entries.len() != 1 {
        return Err(SchemaError::InvalidField);
    }
    let (name, field_schema) = entries.iter().next().ok_or(SchemaError::InvalidField)?;
    add_field_in_schema(schema, name, field_schema, required)
}

/// Lists every property as required, recursively through property schemas and
/// array `items`.
pub fn make_all_fields_required(schema: &mut Value) {
    let Value::Object(node) = schema else {
        return;
    };
    if let Some(Value::Object(properties)) = node.get("properties") {
        let names: Vec<String> = properties.keys().cloned().collect();
        if !node.get("required").is_some_and(Value::is_array) {
            node.insert("required".to_string(), Value::Array(Vec::new()));
        }
        if let Some(Value::Array(required)) = node.get_mut("required") {
            for name in names {
                if !required.iter().any(|entry| entry.as_str() == Some(name.as_str())) {
                    required.push(Value::String(name));
                }
            }
        }
    }
    if let Some(Value::Object(properties)) = node.get_mut("properties") {
        for property in properties.values_mut() {
            make_all_fields_required(property);
        }
    }
    if let Some(items @ Value::Object(_)) = node.get_mut("items") {
        make_all_fields_required(items);
    }
}
