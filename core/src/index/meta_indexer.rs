use serde_json::{json, Value as JsonValue};

use crate::query::{Operator, QueryPart};

use super::{IndexerCategory, IndexerFactory, MatchPriority, Value};

/// Makes the metadata attached to chunks during import searchable. Bare
/// values match tags, comparisons match properties.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetaIndexerFactory;

impl IndexerFactory for MetaIndexerFactory {
    fn category(&self) -> IndexerCategory {
        IndexerCategory::Generic
    }

    fn mapping(&self) -> JsonValue {
        json!({
            "properties": {
                "path": { "type": "keyword" },
                "tags": { "type": "keyword" },
                "props": { "type": "object" },
                "chunkMeta": { "type": "object", "enabled": false },
                "correlationId": { "type": "keyword" },
                "filename": { "type": "keyword" },
                "timestamp": { "type": "date" }
            },
            "dynamic_templates": [{
                "propsAsKeywords": {
                    "path_match": "props.*",
                    "mapping": { "type": "keyword" }
                }
            }]
        })
    }

    fn query_priority(&self, part: &QueryPart) -> Option<MatchPriority> {
        match part {
            QueryPart::Value(_) | QueryPart::Comparison { .. } => Some(MatchPriority::Should),
            QueryPart::Logical(_) => None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> JsonValue {
        match part {
            QueryPart::Value(v) => json!({ "term": { "tags": v.to_string() } }),
            QueryPart::Comparison {
                operator,
                key,
                value,
            } => compile_comparison(&format!("props.{key}"), *operator, value),
            QueryPart::Logical(_) => JsonValue::Null,
        }
    }
}

/// Compile a comparison on the given field into a `term` or `range` filter
pub(crate) fn compile_comparison(field: &str, operator: Operator, value: &Value) -> JsonValue {
    match operator.range_bound() {
        None => json!({ "term": { field: value.to_json() } }),
        Some(bound) => json!({ "range": { field: { bound: value.to_json() } } }),
    }
}
