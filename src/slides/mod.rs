//! Slide content generation: response-schema preparation, prompts and the
//! structured LLM call.

pub mod content;
pub mod prompts;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};

use crate::llm::LlmClient;
use crate::registry::{Context, Registry};

pub use content::{
    generate_slide_content, prepare_response_schema, unwrap_slide_response, SlideContentRequest,
    SPEAKER_NOTE_FIELD,
};

pub const CONTRACT_PREPARE_SCHEMA: &str = "presenton://slides/prepare_schema@1";
pub const CONTRACT_UNWRAP_RESPONSE: &str = "presenton://slides/unwrap_response@1";
pub const CONTRACT_GENERATE: &str = "presenton://slides/generate@1";

pub fn register_slides(registry: &Registry) {
    registry.register(CONTRACT_PREPARE_SCHEMA, prepare_schema_contract);
    registry.register(CONTRACT_UNWRAP_RESPONSE, unwrap_response_contract);
}

/// Registers the generation contract bound to one client and model. Input is a
/// [`SlideContentRequest`]; output is the cleaned slide content.
pub fn register_slide_generator(registry: &Registry, client: Arc<dyn LlmClient>, model: String) {
    registry.register(
        CONTRACT_GENERATE,
        move |_ctx: &mut Context, input: Value, _meta: Option<Value>| -> Result<Value> {
            let request: SlideContentRequest = serde_json::from_value(input)
                .map_err(|err| crate::error::ApiError::unprocessable(err.to_string()))?;
            generate_slide_content(client.as_ref(), &model, &request)
        },
    );
}

fn prepare_schema_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let layout = input
        .get("schema")
        .ok_or_else(|| anyhow!("`schema` is required"))?;
    Ok(json!({ "schema": prepare_response_schema(layout)? }))
}

fn unwrap_response_contract(_ctx: &mut Context, input: Value, _meta: Option<Value>) -> Result<Value> {
    let response = input.get("response").cloned().unwrap_or(Value::Null);
    Ok(json!({ "value": unwrap_slide_response(response) }))
}
