use serde_json::{Map, Value};

/// Keys tried, in order, when a model returns an object where text was expected.
const TEXT_KEYS: [&str; 4] = ["text", "content", "title", "value"];

/// Coerces model output back into the shape `schema` describes. Models often
/// answer `{ "text": ..., "icon": ... }` for plain string fields; those are
/// collapsed to their text.
pub fn clean_llm_response(response: &Value, schema: &Value) -> Value {
    let Value::Object(schema) = schema else {
        return response.clone();
    };

    match (schema.get("type").and_then(Value::as_str), response) {
        (Some("string"), Value::Object(object)) => TEXT_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .map(|text| Value::String(text.to_string()))
            .unwrap_or_else(|| Value::String(response.to_string())),
        (Some("object"), Value::Object(object)) => {
            let properties = schema.get("properties").and_then(Value::as_object);
            let mut cleaned = Map::with_capacity(object.len());
            for (key, value) in object {
                let value = match properties.and_then(|props| props.get(key)) {
                    Some(property_schema) => clean_llm_response(value, property_schema),
                    None => value.clone(),
                };
                cleaned.insert(key.clone(), value);
            }
            Value::Object(cleaned)
        }
        (Some("array"), Value::Array(items)) => {
            let empty = Value::Object(Map::new());
            let items_schema = schema.get("items").unwrap_or(&empty);
            Value::Array(
                items
                    .iter()
                    .map(|item| clean_llm_response(item, items_schema))
                    .collect(),
            )
        }
        _ => response.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collapses_text_objects_into_strings() {
        let schema = json!({
            "type": "object",
            "properties": {
                "title": { "type": "string" },
                "bullets": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "heading": { "type": "string" } }
                    }
                }
            }
        });
        let response = json!({
            "title": { "text": "Welcome", "icon": "star" },
            "bullets": [ { "heading": { "content": "One" }, "extra": 1 } ],
            "__speaker_note__": "kept"
        });
        assert_eq!(
            clean_llm_response(&response, &schema),
            json!({
                "title": "Welcome",
                "bullets": [ { "heading": "One", "extra": 1 } ],
                "__speaker_note__": "kept"
            })
        );
    }

    #[test]
    fn falls_back_to_json_text() {
        let schema = json!({ "type": "string" });
        let response = json!({ "n": 1 });
        assert_eq!(clean_llm_response(&response, &schema), json!("{\"n\":1}"));
        assert_eq!(clean_llm_response(&json!(5), &schema), json!(5));
    }
}
