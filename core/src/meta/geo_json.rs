use serde::{Deserialize, Serialize};

/// Metadata of a GeoJSON chunk
#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoJsonChunkMeta {
    /// Offset of the chunk's first byte in the original document
    pub start: usize,

    /// Offset after the chunk's last byte in the original document
    pub end: usize,

    /// The value of the chunk object's `type` member (e.g. `Feature` or
    /// `Polygon`)
    #[serde(rename = "type")]
    pub object_type: String,

    /// The name of the array the chunk was split from (e.g. `features`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_field_name: Option<String>,
}

impl GeoJsonChunkMeta {
    pub fn new(object_type: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            object_type: object_type.into(),
            parent_field_name: None,
        }
    }

    /// Metadata of a chunk containing a single Feature
    pub fn feature() -> Self {
        Self::new("Feature", 0, 0)
    }

    /// Metadata of a chunk containing a single geometry of the given type
    pub fn geometry(geometry_type: impl Into<String>) -> Self {
        Self::new(geometry_type, 0, 0)
    }

    /// `true` if the chunk is a Feature that must be nested inside a
    /// FeatureCollection. Everything else is a complete geometry.
    pub fn is_feature(&self) -> bool {
        self.object_type == "Feature"
    }
}
