use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::meta::{ChunkMeta, IndexMeta};

/// The index document stored for each chunk. Its ID is the chunk's path.
#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkDocument {
    pub path: String,

    pub chunk_meta: ChunkMeta,

    #[serde(default)]
    pub tags: Vec<String>,

    /// Properties from [`IndexMeta::properties`]
    #[serde(default)]
    pub props: BTreeMap<String, String>,

    /// Generic attributes extracted from the chunk by indexers
    #[serde(default)]
    pub gen_attrs: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    #[serde(
        default,
        rename = "fallbackCRSString",
        skip_serializing_if = "Option::is_none"
    )]
    pub fallback_crs_string: Option<String>,

    #[serde(default)]
    pub indexers: Vec<String>,
}

impl ChunkDocument {
    pub fn new(path: impl Into<String>, chunk_meta: ChunkMeta, index_meta: IndexMeta) -> Self {
        let IndexMeta {
            correlation_id,
            filename,
            timestamp,
            tags,
            properties,
            fallback_crs_string,
            indexers,
        } = index_meta;

        Self {
            path: path.into(),
            chunk_meta,
            tags,
            props: properties,
            gen_attrs: BTreeMap::new(),
            correlation_id,
            filename,
            timestamp,
            fallback_crs_string,
            indexers,
        }
    }

    pub fn with_generic_attributes(mut self, attributes: BTreeMap<String, String>) -> Self {
        self.gen_attrs.extend(attributes);
        self
    }

    pub fn to_json(&self) -> serde_json::Value {
        // all map keys are strings, so this cannot fail
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
