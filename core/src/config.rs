use std::time::Duration;

/// Settings for the index-side operations of the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexConfig {
    /// The name of the index the backend manages
    pub index_name: String,

    /// The document type all chunk documents are stored under
    pub type_name: String,

    /// The number of hits per page if a request does not specify one
    pub default_page_size: usize,

    /// How long the backend keeps an idle scroll open
    pub scroll_ttl: Duration,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            index_name: "georocket".to_string(),
            type_name: "object".to_string(),
            default_page_size: 100,
            scroll_ttl: Duration::from_secs(60),
        }
    }
}
