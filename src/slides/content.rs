use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, SchemaError};
use crate::llm::LlmClient;
use crate::schema::{
    add_field_in_schema, clean_llm_response, make_all_fields_required, remove_defaults_from_schema,
    remove_fields_from_schema,
};
use crate::slides::prompts;

pub const SPEAKER_NOTE_FIELD: &str = "__speaker_note__";
pub const ASSET_URL_FIELDS: [&str; 2] = ["__image_url__", "__icon_url__"];

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlideContentRequest {
    #[serde(alias = "json_schema")]
    pub layout_schema: Value,
    pub outline: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbosity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

pub fn speaker_note_schema() -> Value {
    json!({
        "type": "string",
        "minLength": 100,
        "maxLength": 250,
        "description": "Speaker note for the slide"
    })
}

/// Turns a layout schema into the schema the model answers with: asset URLs
/// and defaults removed, a required speaker note added, every field required.
pub fn prepare_response_schema(layout_schema: &Value) -> Result<Value, SchemaError> {
    if !layout_schema.is_object() {
        return Err(SchemaError::NotAnObject {
            path: "$".to_string(),
        });
    }
    let mut schema = remove_fields_from_schema(layout_schema, &ASSET_URL_FIELDS);
    remove_defaults_from_schema(&mut schema);
    let mut schema = add_field_in_schema(&schema, SPEAKER_NOTE_FIELD, &speaker_note_schema(), true)?;
    make_all_fields_required(&mut schema);
    Ok(schema)
}

/// Models sometimes answer `{"slide": {...}}`. Returns the inner object with a
/// root-level speaker note copied in; anything else is returned unchanged.
pub fn unwrap_slide_response(response: Value) -> Value {
    let Value::Object(mut root) = response else {
        return response;
    };
    if !root.get("slide").is_some_and(Value::is_object) {
        return Value::Object(root);
    }
    let Some(Value::Object(mut slide)) = root.shift_remove("slide") else {
        return Value::Object(root);
    };
    if let Some(note) = root.shift_remove(SPEAKER_NOTE_FIELD) {
        slide.insert(SPEAKER_NOTE_FIELD.to_string(), note);
    }
    Value::Object(slide)
}

pub fn generate_slide_content(
    client: &dyn LlmClient,
    model: &str,
    request: &SlideContentRequest,
) -> Result<Value> {
    let schema = prepare_response_schema(&request.layout_schema)
        .map_err(|err| ApiError::unprocessable(err.to_string()))?;
    let messages = prompts::messages(
        &request.outline,
        &request.language,
        request.tone.as_deref(),
        request.verbosity.as_deref(),
        request.instructions.as_deref(),
    );
    let response = client
        .generate_structured(model, &messages, &schema, false)
        .map_err(llm_failure)?;
    let slide = unwrap_slide_response(response);
    Ok(clean_llm_response(&slide, &schema))
}

fn llm_failure(err: anyhow::Error) -> anyhow::Error {
    if err.downcast_ref::<ApiError>().is_some() {
        err
    } else {
        ApiError::internal(format!("LLM API error: {err:#}")).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prepares_layout_schema() {
        let layout = json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "default": "Welcome" },
                "image": {
                    "type": "object",
                    "properties": {
                        "__image_url__": { "type": "string" },
                        "__image_prompt__": { "type": "string" }
                    }
                }
            },
            "required": ["title"]
        });
        let schema = prepare_response_schema(&layout).unwrap();
        assert!(schema.pointer("/properties/title/default").is_none());
        assert!(schema
            .pointer("/properties/image/properties/__image_url__")
            .is_none());
        assert_eq!(
            schema["required"],
            json!(["title", "__speaker_note__", "image"])
        );
        assert_eq!(
            schema["properties"]["image"]["required"],
            json!(["__image_prompt__"])
        );
        assert_eq!(schema["properties"][SPEAKER_NOTE_FIELD]["minLength"], 100);
    }

    #[test]
    fn rejects_non_object_layout() {
        assert!(prepare_response_schema(&json!("slide")).is_err());
    }

    #[test]
    fn unwraps_slide_wrapper() {
        let wrapped = json!({
            "slide": { "title": "Hi", "__speaker_note__": "inner" },
            "__speaker_note__": "outer"
        });
        assert_eq!(
            unwrap_slide_response(wrapped),
            json!({ "title": "Hi", "__speaker_note__": "outer" })
        );

        let plain = json!({ "slide": "text", "title": "Hi" });
        assert_eq!(unwrap_slide_response(plain.clone()), plain);
    }
}
