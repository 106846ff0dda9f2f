use serde_json::Value;

/// Keywords whose object values map names to subschemas.
const NAME_MAPS: [&str; 4] = ["properties", "patternProperties", "$defs", "definitions"];

pub fn remove_defaults_from_schema(schema: &mut Value) {
    strip_keyword(schema, "default");
}

pub fn remove_titles_from_schema(schema: &mut Value) {
    strip_keyword(schema, "title");
}

/// Removes `keyword` from every schema node. Entries of name maps such as
/// `properties` are treated as subschemas, so a property called `title`
/// survives `remove_titles_from_schema`.
pub fn strip_keyword(schema: &mut Value, keyword: &str) {
    match schema {
        Value::Object(map) => {
            map.shift_remove(keyword);
            for (key, value) in map.iter_mut() {
                if NAME_MAPS.contains(&key.as_str()) {
                    if let Value::Object(named) = value {
                        for subschema in named.values_mut() {
                            strip_keyword(subschema, keyword);
                        }
                        continue;
                    }
                }
                strip_keyword(value, keyword);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_keyword(item, keyword);
            }
        }
        _ => {}
    }
}
