use std::collections::BTreeMap;

use serde_json::{json, Map, Value as JsonValue};

const SET_PROPERTIES: &str = "if (ctx._source.props == null) { ctx._source.props = [:]; } \
     ctx._source.props.putAll(params.properties);";

const REMOVE_PROPERTIES: &str = "if (ctx._source.props != null) { \
     for (String p : params.properties) { ctx._source.props.remove(p); } }";

const APPEND_TAGS: &str = "if (ctx._source.tags == null) { ctx._source.tags = []; } \
     else if (!(ctx._source.tags instanceof List)) { ctx._source.tags = [ctx._source.tags]; } \
     for (String t : params.tags) { if (!ctx._source.tags.contains(t)) { ctx._source.tags.add(t); } }";

const REMOVE_TAGS: &str = "if (ctx._source.tags instanceof List) { \
     ctx._source.tags.removeAll(params.tags); } \
     else if (ctx._source.tags != null && params.tags.contains(ctx._source.tags)) { \
     ctx._source.tags = []; }";

/// The fixed catalog of metadata edits that can be applied to all chunks
/// matching a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateScript {
    /// Merge key/value pairs into the properties, overwriting existing keys
    SetProperties(BTreeMap<String, String>),

    RemoveProperties(Vec<String>),

    /// Add tags unless they are already present
    AppendTags(Vec<String>),

    RemoveTags(Vec<String>),
}

impl UpdateScript {
    pub fn name(&self) -> &'static str {
        match self {
            UpdateScript::SetProperties(_) => "set_properties",
            UpdateScript::RemoveProperties(_) => "remove_properties",
            UpdateScript::AppendTags(_) => "append_tags",
            UpdateScript::RemoveTags(_) => "remove_tags",
        }
    }

    /// Render the script as a painless script object for the backend
    pub fn to_json(&self) -> JsonValue {
        let (inline, params) = match self {
            UpdateScript::SetProperties(p) => (SET_PROPERTIES, json!({ "properties": p })),
            UpdateScript::RemoveProperties(p) => (REMOVE_PROPERTIES, json!({ "properties": p })),
            UpdateScript::AppendTags(t) => (APPEND_TAGS, json!({ "tags": t })),
            UpdateScript::RemoveTags(t) => (REMOVE_TAGS, json!({ "tags": t })),
        };
        json!({
            "lang": "painless",
            "inline": inline,
            "params": params,
        })
    }

    /// Apply the script to an index document
    pub fn apply(&self, doc: &mut JsonValue) {
        let Some(doc) = doc.as_object_mut() else {
            return;
        };

        match self {
            UpdateScript::SetProperties(properties) => {
                let mut props = take_object(doc, "props");
                for (k, v) in properties {
                    props.insert(k.clone(), JsonValue::String(v.clone()));
                }
                doc.insert("props".to_string(), JsonValue::Object(props));
            }

            UpdateScript::RemoveProperties(keys) => {
                if let Some(props) = doc.get_mut("props").and_then(JsonValue::as_object_mut) {
                    for k in keys {
                        props.remove(k);
                    }
                }
            }

            UpdateScript::AppendTags(tags) => {
                let mut existing = take_array(doc, "tags");
                for t in tags {
                    let t = JsonValue::String(t.clone());
                    if !existing.contains(&t) {
                        existing.push(t);
                    }
                }
                doc.insert("tags".to_string(), JsonValue::Array(existing));
            }

            UpdateScript::RemoveTags(tags) => {
                if doc.get("tags").is_some_and(|t| !t.is_null()) {
                    let mut existing = take_array(doc, "tags");
                    existing.retain(|t| !t.as_str().is_some_and(|s| tags.iter().any(|r| r == s)));
                    doc.insert("tags".to_string(), JsonValue::Array(existing));
                }
            }
        }
    }
}

/// Remove the object stored under `key`. Missing or non-object values yield
/// an empty object.
fn take_object(doc: &mut Map<String, JsonValue>, key: &str) -> Map<String, JsonValue> {
    match doc.remove(key) {
        Some(JsonValue::Object(o)) => o,
        _ => Map::new(),
    }
}

/// Remove the array stored under `key`. A single value is turned into an
/// array containing it.
fn take_array(doc: &mut Map<String, JsonValue>, key: &str) -> Vec<JsonValue> {
    match doc.remove(key) {
        None | Some(JsonValue::Null) => vec![],
        Some(JsonValue::Array(a)) => a,
        Some(single) => vec![single],
    }
}
