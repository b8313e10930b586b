use serde_json::{json, Value as JsonValue};

use crate::query::QueryPart;

use super::{meta_indexer::compile_comparison, IndexerCategory, IndexerFactory, MatchPriority};

/// Makes generic attributes extracted from chunk contents (e.g. GML generic
/// attributes or GeoJSON feature properties) searchable through comparisons
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericAttributeIndexerFactory;

impl IndexerFactory for GenericAttributeIndexerFactory {
    fn category(&self) -> IndexerCategory {
        IndexerCategory::Generic
    }

    fn mapping(&self) -> JsonValue {
        json!({
            "properties": {
                "genAttrs": { "type": "object" }
            },
            "dynamic_templates": [{
                "genAttrsAsKeywords": {
                    "path_match": "genAttrs.*",
                    "mapping": { "type": "keyword" }
                }
            }]
        })
    }

    fn query_priority(&self, part: &QueryPart) -> Option<MatchPriority> {
        match part {
            QueryPart::Comparison { .. } => Some(MatchPriority::Should),
            _ => None,
        }
    }

    fn compile_query(&self, part: &QueryPart) -> JsonValue {
        match part {
            QueryPart::Comparison {
                operator,
                key,
                value,
            } => compile_comparison(&format!("genAttrs.{key}"), *operator, value),
            _ => JsonValue::Null,
        }
    }
}
