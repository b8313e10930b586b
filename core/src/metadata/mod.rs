//! Attribute discovery and bulk edits of the metadata of indexed chunks.
//! These operations never touch the stored chunk bytes.

use std::{collections::BTreeMap, sync::Arc};

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{event, Level};

use crate::{
    config::IndexConfig,
    index::{format_ttl, IndexBackend, ScrollResponse},
    query::QueryCompiler,
    Error,
};

pub use self::script::UpdateScript;

pub mod script;

/// Scope and paging parameters shared by all value queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrollParams {
    #[serde(default)]
    pub search: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    #[serde(default)]
    pub page_size: Option<usize>,

    /// Continues a previous query. Search and path are ignored if present.
    #[serde(default)]
    pub scroll_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetAttributeValuesRequest {
    pub attribute: String,

    #[serde(flatten)]
    pub scroll: ScrollParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertyValuesRequest {
    pub property: String,

    #[serde(flatten)]
    pub scroll: ScrollParams,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPropertiesRequest {
    #[serde(default)]
    pub search: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovePropertiesRequest {
    #[serde(default)]
    pub search: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    pub properties: Vec<String>,
}

/// Used for both appending and removing tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsRequest {
    #[serde(default)]
    pub search: Option<String>,

    #[serde(default)]
    pub path: Option<String>,

    pub tags: Vec<String>,
}

/// One page of attribute or property values. Values are reported once per
/// matching chunk, so duplicates are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValuesPage {
    pub hits: Vec<String>,
    pub total_hits: u64,
    pub scroll_id: Option<String>,
}

/// Deserialize a request from its JSON representation
pub fn parse_request<T: DeserializeOwned>(request: JsonValue) -> Result<T, Error> {
    serde_json::from_value(request).map_err(|e| Error::MalformedRequest(e.to_string()))
}

/// Queries and edits chunk metadata through the index backend
#[derive(Clone)]
pub struct MetadataService {
    backend: Arc<dyn IndexBackend>,
    compiler: QueryCompiler,
    config: IndexConfig,
}

impl MetadataService {
    pub fn new(backend: Arc<dyn IndexBackend>, compiler: QueryCompiler, config: IndexConfig) -> Self {
        Self {
            backend,
            compiler,
            config,
        }
    }

    /// Get the values of a generic attribute of all matching chunks
    pub async fn get_attribute_values(
        &self,
        request: &GetAttributeValuesRequest,
    ) -> Result<ValuesPage, Error> {
        self.get_values("genAttrs", &request.attribute, &request.scroll)
            .await
    }

    /// Get the values of a property of all matching chunks
    pub async fn get_property_values(
        &self,
        request: &GetPropertyValuesRequest,
    ) -> Result<ValuesPage, Error> {
        self.get_values("props", &request.property, &request.scroll)
            .await
    }

    async fn get_values(
        &self,
        map: &str,
        key: &str,
        params: &ScrollParams,
    ) -> Result<ValuesPage, Error> {
        if key.is_empty() {
            return Err(Error::MalformedRequest(format!(
                "missing name of the value to query in `{map}'"
            )));
        }

        let response = match &params.scroll_id {
            Some(scroll_id) => {
                event!(Level::DEBUG, scroll_id, "continuing value query");
                self.backend
                    .continue_scroll(scroll_id, self.config.scroll_ttl)
                    .await?
            }

            None => {
                let field = format!("{map}.{key}");
                let filter = self.compiler.compile_with_key_exists(
                    params.search.as_deref(),
                    params.path.as_deref(),
                    &field,
                )?;
                let size = params.page_size.unwrap_or(self.config.default_page_size);
                event!(
                    Level::DEBUG,
                    field,
                    size,
                    ttl = %format_ttl(self.config.scroll_ttl),
                    "opening value query"
                );
                self.backend
                    .begin_scroll(
                        &self.config.type_name,
                        None,
                        &filter,
                        size,
                        self.config.scroll_ttl,
                    )
                    .await?
            }
        };

        Ok(values_page(response, map, key))
    }

    pub async fn set_properties(&self, request: &SetPropertiesRequest) -> Result<(), Error> {
        self.update(
            request.search.as_deref(),
            request.path.as_deref(),
            UpdateScript::SetProperties(request.properties.clone()),
        )
        .await
    }

    pub async fn remove_properties(&self, request: &RemovePropertiesRequest) -> Result<(), Error> {
        self.update(
            request.search.as_deref(),
            request.path.as_deref(),
            UpdateScript::RemoveProperties(request.properties.clone()),
        )
        .await
    }

    pub async fn append_tags(&self, request: &TagsRequest) -> Result<(), Error> {
        self.update(
            request.search.as_deref(),
            request.path.as_deref(),
            UpdateScript::AppendTags(request.tags.clone()),
        )
        .await
    }

    pub async fn remove_tags(&self, request: &TagsRequest) -> Result<(), Error> {
        self.update(
            request.search.as_deref(),
            request.path.as_deref(),
            UpdateScript::RemoveTags(request.tags.clone()),
        )
        .await
    }

    /// Apply the script to all matching chunks in a single backend request.
    /// A reported timeout is a failure even if some documents were updated.
    async fn update(
        &self,
        search: Option<&str>,
        path: Option<&str>,
        script: UpdateScript,
    ) -> Result<(), Error> {
        let filter = self.compiler.compile(search, path)?;
        event!(
            Level::DEBUG,
            script = script.name(),
            search,
            path,
            "submitting metadata update"
        );

        let response = self
            .backend
            .update_by_query(&self.config.type_name, &filter, &script)
            .await
            .inspect_err(|e| {
                event!(Level::ERROR, script = script.name(), error = %e, "metadata update failed")
            })?;

        if response.timed_out {
            event!(
                Level::WARN,
                script = script.name(),
                updated = response.updated,
                "metadata update timed out"
            );
            return Err(Error::Timeout);
        }

        Ok(())
    }
}

/// Extract the value stored under `map.key` from each hit
fn values_page(response: ScrollResponse, map: &str, key: &str) -> ValuesPage {
    let hits = response
        .hits
        .iter()
        .filter_map(|h| h.source.get(map).and_then(|m| m.get(key)))
        .filter_map(|v| match v {
            JsonValue::Null => None,
            JsonValue::String(s) => Some(s.clone()),
            v => Some(v.to_string()),
        })
        .collect();

    ValuesPage {
        hits,
        total_hits: response.total_hits,
        scroll_id: response.scroll_id,
    }
}
