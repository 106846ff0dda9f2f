//! JSON-Schema shaping for structured LLM output.
//!
//! Every transform is a plain function over `serde_json::Value` and is also
//! exposed as a registry contract taking `{ "schema": ... }`.

pub mod clean;
pub mod fields;
pub mod flatten;
pub mod keywords;
pub mod path;
pub mod strict;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::registry::{Context, Registry};

pub use clean::clean_llm_response;
pub use fields::{
    add_field_entry, add_field_in_schema, make_all_fields_required, remove_fields_from_schema,
};
pub use flatten::flatten_json_schema;
pub use keywords::{remove_defaults_from_schema, remove_titles_from_schema};
pub use strict::{ensure_strict, ensure_strict_json_schema, SUPPORTED_STRING_FORMATS};

pub const CONTRACT_REMOVE_FIELDS: &str = "presenton://schema/remove_fields@1";
pub const CONTRACT_ADD_FIELD: &str = "presenton://schema/add_field@1";
pub const CONTRACT_REMOVE_DEFAULTS: &str = "presenton://schema/remove_defaults@1";
pub const CONTRACT_REMOVE_TITLES: &str = "presenton://schema/remove_titles@1";
pub const CONTRACT_MAKE_REQUIRED: &str = "presenton://schema/make_required@1";
pub const CONTRACT_ENSURE_STRICT: &str = "presenton://schema/ensure_strict@1";
pub const CONTRACT_FLATTEN: &str = "presenton://schema/flatten@1";
pub const CONTRACT_CLEAN_RESPONSE: &str = "presenton://schema/clean_response@1";

pub fn register_schema(registry: &Registry) {
    registry.register(CONTRACT_REMOVE_FIELDS, remove_fields_contract);
    registry.register(CONTRACT_ADD_FIELD, add_field_contract);
    registry.register(CONTRACT_REMOVE_DEFAULTS, remove_defaults_contract);
    registry.register(CONTRACT_REMOVE_TITLES, remove_titles_contract);
    registry.register(CONTRACT_MAKE_REQUIRED, make_required_contract);
    registry.register(CONTRACT_ENSURE_STRICT, ensure_strict_contract);
    registry.register(CONTRACT_FLATTEN, flatten_contract);
    registry.register(CONTRACT_CLEAN_RESPONSE, clean_response_contract);
}

fn schema_input(input: &Value) -> Result<Value> {
    input
        .get("schema")
        .cloned()
        .ok_or_else(|| anyhow!("`schema` is required"))
}

fn remove_fields_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let schema = schema_input(&input)?;
    let fields: Vec<String> = input
        .get("fields")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("`fields` must be an array of strings"))?
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect();
    Ok(json!({ "schema": remove_fields_from_schema(&schema, &fields) }))
}

fn add_field_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let schema = schema_input(&input)?;
    let field = input
        .get("field")
        .ok_or_else(|| anyhow!("`field` is required"))?;
    let required = input
        .get("required")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok(json!({ "schema": add_field_entry(&schema, field, required)? }))
}

fn remove_defaults_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let mut schema = schema_input(&input)?;
    remove_defaults_from_schema(&mut schema);
    Ok(json!({ "schema": schema }))
}

fn remove_titles_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let mut schema = schema_input(&input)?;
    remove_titles_from_schema(&mut schema);
    Ok(json!({ "schema": schema }))
}

fn make_required_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let mut schema = schema_input(&input)?;
    make_all_fields_required(&mut schema);
    Ok(json!({ "schema": schema }))
}

fn ensure_strict_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let schema = schema_input(&input)?;
    Ok(json!({ "schema": ensure_strict(&schema)? }))
}

fn flatten_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let schema = schema_input(&input)?;
    Ok(json!({ "schema": flatten_json_schema(&schema)? }))
}

fn clean_response_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let schema = schema_input(&input)?;
    let response = input.get("response").cloned().unwrap_or(Value::Null);
    Ok(json!({ "value": clean_llm_response(&response, &schema) }))
}
