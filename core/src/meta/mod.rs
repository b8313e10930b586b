//! Value types describing stored chunks: how to re-embed a chunk into a
//! document of its format ([`ChunkMeta`]) and what makes it searchable
//! ([`IndexMeta`]).

use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use self::{
    geo_json::GeoJsonChunkMeta,
    xml::{Prefix, XmlChunkMeta, XmlStartElement},
};

pub mod geo_json;
pub mod xml;

pub const XML_MIME_TYPE: &str = "application/xml";
pub const GEO_JSON_MIME_TYPE: &str = "application/geo+json";

/// Errors that can occur when reading chunk metadata
#[derive(Error, Debug)]
pub enum ChunkMetaError {
    #[error("unsupported chunk type `{0}'")]
    UnsupportedChunkType(String),

    #[error("chunk metadata does not specify a MIME type")]
    MissingMimeType,

    #[error("malformed chunk metadata")]
    Malformed(#[from] serde_json::Error),
}

/// The closed set of chunk formats
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChunkFormat {
    Xml,
    GeoJson,
}

impl ChunkFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ChunkFormat::Xml => XML_MIME_TYPE,
            ChunkFormat::GeoJson => GEO_JSON_MIME_TYPE,
        }
    }

    pub fn from_mime_type(mime_type: &str) -> Option<Self> {
        match mime_type {
            XML_MIME_TYPE => Some(ChunkFormat::Xml),
            GEO_JSON_MIME_TYPE => Some(ChunkFormat::GeoJson),
            _ => None,
        }
    }
}

impl Display for ChunkFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkFormat::Xml => write!(f, "XML"),
            ChunkFormat::GeoJson => write!(f, "GeoJSON"),
        }
    }
}

/// Metadata about a chunk
#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "mimeType")]
pub enum ChunkMeta {
    #[serde(rename = "application/xml")]
    Xml(XmlChunkMeta),

    #[serde(rename = "application/geo+json")]
    GeoJson(GeoJsonChunkMeta),
}

impl ChunkMeta {
    pub fn format(&self) -> ChunkFormat {
        match self {
            ChunkMeta::Xml(_) => ChunkFormat::Xml,
            ChunkMeta::GeoJson(_) => ChunkFormat::GeoJson,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        self.format().mime_type()
    }

    /// Offsets of the chunk within the original document
    pub fn span(&self) -> (usize, usize) {
        match self {
            ChunkMeta::Xml(m) => (m.start, m.end),
            ChunkMeta::GeoJson(m) => (m.start, m.end),
        }
    }

    /// Reads chunk metadata from its JSON representation. Fails with
    /// [`ChunkMetaError::UnsupportedChunkType`] if the MIME type is unknown.
    pub fn from_json(value: serde_json::Value) -> Result<Self, ChunkMetaError> {
        let mime_type = value
            .get("mimeType")
            .and_then(|m| m.as_str())
            .ok_or(ChunkMetaError::MissingMimeType)?;
        if ChunkFormat::from_mime_type(mime_type).is_none() {
            return Err(ChunkMetaError::UnsupportedChunkType(mime_type.to_string()));
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> serde_json::Value {
        // all map keys are strings, so this cannot fail
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<XmlChunkMeta> for ChunkMeta {
    fn from(value: XmlChunkMeta) -> Self {
        ChunkMeta::Xml(value)
    }
}

impl From<GeoJsonChunkMeta> for ChunkMeta {
    fn from(value: GeoJsonChunkMeta) -> Self {
        ChunkMeta::GeoJson(value)
    }
}

/// Metadata attached to a chunk during import that affects the way it is
/// indexed
#[derive(PartialEq, Eq, Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexMeta {
    /// Identifies the import the chunk belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,

    /// Name of the file the chunk was imported from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Import time in milliseconds since the epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, String>,

    /// Spatial reference system to assume if the chunk does not specify one
    #[serde(
        default,
        rename = "fallbackCRSString",
        skip_serializing_if = "Option::is_none"
    )]
    pub fallback_crs_string: Option<String>,

    /// Identifiers of the indexers that should process the chunk
    #[serde(default)]
    pub indexers: Vec<String>,
}

impl IndexMeta {
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for t in tags {
            let t = t.into();
            if !self.tags.contains(&t) {
                self.tags.push(t);
            }
        }
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}
