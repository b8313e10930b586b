use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
};

use itertools::Itertools;
use quick_xml::{
    escape::escape,
    events::{BytesEnd, BytesStart},
};
use serde::{Deserialize, Serialize};

/// An XML namespace prefix declaration
#[derive(PartialEq, Eq, Clone, Debug, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum Prefix {
    Default,
    Named(String),
}

impl Display for Prefix {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Prefix::Default => write!(f, "<default>"),
            Prefix::Named(name) => write!(f, "{}", name),
        }
    }
}

impl From<Option<String>> for Prefix {
    fn from(value: Option<String>) -> Self {
        match value {
            None => Prefix::Default,
            Some(n) if n.is_empty() => Prefix::Default,
            Some(n) => Prefix::Named(n),
        }
    }
}

impl From<Prefix> for Option<String> {
    fn from(value: Prefix) -> Self {
        match value {
            Prefix::Default => None,
            Prefix::Named(n) => Some(n),
        }
    }
}

impl Prefix {
    /// The name of the attribute that binds this prefix to a namespace
    pub fn xmlns_attribute(&self) -> String {
        match self {
            Prefix::Default => "xmlns".to_string(),
            Prefix::Named(n) => format!("xmlns:{n}"),
        }
    }

    /// Qualifies the given local name with this prefix
    pub fn qualify(&self, local_name: &str) -> String {
        match self {
            Prefix::Default => local_name.to_string(),
            Prefix::Named(n) => format!("{n}:{local_name}"),
        }
    }
}

/// An XML start element of one of the ancestors a chunk was split from
#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlStartElement {
    /// The element's prefix
    pub prefix: Prefix,

    /// The element's local name
    pub local_name: String,

    /// The namespaces declared on this element
    #[serde(default)]
    pub namespaces: Vec<(Prefix, String)>,

    /// An optional `schemaLocation` attribute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_location: Option<(Prefix, Vec<(String, String)>)>,

    /// All other attributes (qualified name and unescaped value) in document
    /// order
    #[serde(default)]
    pub attributes: Vec<(String, String)>,
}

impl XmlStartElement {
    /// Creates a new element with the given name and namespaces
    pub fn new(
        prefix: Prefix,
        local_name: impl Into<String>,
        mut namespaces: Vec<(Prefix, String)>,
        mut schema_location: Option<(Prefix, Vec<(String, String)>)>,
        attributes: Vec<(String, String)>,
    ) -> Self {
        namespaces.sort_unstable();
        if let Some(ref mut sl) = schema_location {
            sl.1.sort_unstable();
        }
        Self {
            prefix,
            local_name: local_name.into(),
            namespaces,
            schema_location,
            attributes,
        }
    }

    /// Creates a plain element without namespaces and attributes
    pub fn plain(prefix: Prefix, local_name: impl Into<String>) -> Self {
        Self::new(prefix, local_name, vec![], None, vec![])
    }

    /// The element's qualified name
    pub fn qualified_name(&self) -> String {
        self.prefix.qualify(&self.local_name)
    }

    /// Create a [`BytesStart`] object from this element
    pub fn to_bytes_start(&self) -> BytesStart<'static> {
        let mut str = self.qualified_name();
        let name_len = str.len();

        // append namespaces
        for (prefix, ns) in &self.namespaces {
            str.push(' ');
            str.push_str(&prefix.xmlns_attribute());
            str.push_str("=\"");
            str.push_str(&escape(ns));
            str.push('"');
        }

        // append schema location attribute
        if let Some((sl_prefix, locations)) = &self.schema_location {
            str.push(' ');
            str.push_str(&sl_prefix.qualify("schemaLocation"));
            str.push_str("=\"");
            str.push_str(&escape(&format_schema_location(locations)));
            str.push('"');
        }

        for (key, value) in &self.attributes {
            str.push(' ');
            str.push_str(key);
            str.push_str("=\"");
            str.push_str(&escape(value));
            str.push('"');
        }

        BytesStart::from_content(str, name_len)
    }

    /// Create a [`BytesEnd`] object from this element
    pub fn to_bytes_end(&self) -> BytesEnd<'static> {
        BytesEnd::new(self.qualified_name())
    }
}

/// Parses the value of a `schemaLocation` attribute into pairs of namespace
/// and location. A trailing namespace without location is ignored.
pub(crate) fn parse_schema_location(v: &str) -> Vec<(String, String)> {
    let mut r = Vec::new();
    for c in &v.split(' ').filter(|v| !v.is_empty()).chunks(2) {
        if let Some((namespace, uri)) = c.collect_tuple() {
            r.push((namespace.to_string(), uri.to_string()));
        } else {
            break;
        }
    }
    r
}

/// Renders pairs of namespace and location as a `schemaLocation` value
pub(crate) fn format_schema_location(locations: &[(String, String)]) -> String {
    locations
        .iter()
        .flat_map(|(ns, uri)| [ns.as_str(), uri.as_str()])
        .join(" ")
}

/// The namespaces in scope at the innermost element of `chain`. Declarations
/// of inner elements override those of outer ones.
pub fn namespaces_in_scope(chain: &[XmlStartElement]) -> BTreeMap<Prefix, String> {
    let mut result = BTreeMap::new();
    for e in chain {
        for (p, ns) in &e.namespaces {
            result.insert(p.clone(), ns.clone());
        }
    }
    result
}

/// The schema locations declared anywhere in `chain`
pub fn schema_locations_in_scope(chain: &[XmlStartElement]) -> Vec<(String, String)> {
    let mut result: Vec<(String, String)> = Vec::new();
    for (_, locations) in chain.iter().filter_map(|e| e.schema_location.as_ref()) {
        for l in locations {
            if let Some(existing) = result.iter_mut().find(|e| e.0 == l.0) {
                existing.1 = l.1.clone();
            } else {
                result.push(l.clone());
            }
        }
    }
    result
}

/// Metadata of an XML chunk
#[derive(PartialEq, Eq, Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XmlChunkMeta {
    /// Offset of the chunk's first byte in the original document
    pub start: usize,

    /// Offset after the chunk's last byte in the original document
    pub end: usize,

    /// The chunk's ancestors, outermost first
    pub parents: Vec<XmlStartElement>,
}

impl XmlChunkMeta {
    pub fn new(parents: Vec<XmlStartElement>, start: usize, end: usize) -> Self {
        Self {
            start,
            end,
            parents,
        }
    }

    /// Creates metadata for a chunk that is the whole document
    pub fn root() -> Self {
        Self::new(vec![], 0, 0)
    }
}
