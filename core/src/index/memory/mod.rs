use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::{json, Value as JsonValue};
use tokio::time::Instant;
use tracing::{event, Level};
use ulid::Ulid;

use crate::{metadata::UpdateScript, util::deep_merge};

use super::{
    format_ttl, BackendError, Hit, IndexBackend, ScrollResponse, UpdateByQueryResponse,
};

mod filter;

/// The remaining hits of an open scroll
#[derive(Debug)]
struct ScrollContext {
    remaining: VecDeque<Hit>,
    size: usize,
    total_hits: u64,
    expires_at: Instant,
}

/// An [`IndexBackend`] that keeps all documents in memory. It understands
/// the filters and update scripts this crate generates. Scrolls operate on a
/// snapshot of the matching documents taken when the scroll is opened.
#[derive(Debug, Default)]
pub struct MemoryIndexBackend {
    index_created: RwLock<bool>,
    mappings: RwLock<BTreeMap<String, JsonValue>>,

    /// Documents per type, ordered by ID
    documents: RwLock<BTreeMap<String, BTreeMap<String, JsonValue>>>,

    scrolls: Mutex<FxHashMap<String, ScrollContext>>,
}

impl MemoryIndexBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_index_created(&self) -> bool {
        *self.index_created.read()
    }

    /// The merged mapping of the given type
    pub fn mapping(&self, type_name: &str) -> Option<JsonValue> {
        self.mappings.read().get(type_name).cloned()
    }

    pub fn document(&self, type_name: &str, id: &str) -> Option<JsonValue> {
        self.documents
            .read()
            .get(type_name)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    pub fn document_count(&self, type_name: &str) -> usize {
        self.documents
            .read()
            .get(type_name)
            .map(BTreeMap::len)
            .unwrap_or_default()
    }

    /// The number of scrolls that have not expired yet
    pub fn open_scrolls(&self) -> usize {
        let now = Instant::now();
        self.scrolls
            .lock()
            .values()
            .filter(|s| s.expires_at > now)
            .count()
    }

    fn next_page(scroll_id: String, ctx: &mut ScrollContext) -> ScrollResponse {
        let n = ctx.size.min(ctx.remaining.len());
        ScrollResponse {
            hits: ctx.remaining.drain(..n).collect(),
            total_hits: ctx.total_hits,
            scroll_id: Some(scroll_id),
        }
    }
}

#[async_trait]
impl IndexBackend for MemoryIndexBackend {
    async fn ensure_index(&self) -> Result<(), BackendError> {
        *self.index_created.write() = true;
        Ok(())
    }

    async fn put_mapping(&self, type_name: &str, mapping: &JsonValue) -> Result<(), BackendError> {
        let mut mappings = self.mappings.write();
        let m = mappings
            .entry(type_name.to_string())
            .or_insert_with(|| json!({}));
        deep_merge(m, mapping);
        Ok(())
    }

    async fn begin_scroll(
        &self,
        type_name: &str,
        query: Option<&JsonValue>,
        post_filter: &JsonValue,
        size: usize,
        ttl: Duration,
    ) -> Result<ScrollResponse, BackendError> {
        if size == 0 {
            return Err(BackendError::bad_request("page size must be positive"));
        }

        let mut remaining = VecDeque::new();
        if let Some(docs) = self.documents.read().get(type_name) {
            for (id, doc) in docs {
                let query_matches = match query {
                    Some(q) => filter::matches(q, doc)?,
                    None => true,
                };
                if query_matches && filter::matches(post_filter, doc)? {
                    remaining.push_back(Hit {
                        id: id.clone(),
                        source: doc.clone(),
                    });
                }
            }
        }

        let now = Instant::now();
        let mut ctx = ScrollContext {
            total_hits: remaining.len() as u64,
            remaining,
            size,
            expires_at: now + ttl,
        };

        let scroll_id = Ulid::new().to_string();
        event!(
            Level::DEBUG,
            scroll_id,
            total_hits = ctx.total_hits,
            ttl = %format_ttl(ttl),
            "opened scroll"
        );
        let page = Self::next_page(scroll_id.clone(), &mut ctx);

        let mut scrolls = self.scrolls.lock();
        scrolls.retain(|_, s| s.expires_at > now);
        scrolls.insert(scroll_id, ctx);

        Ok(page)
    }

    async fn continue_scroll(
        &self,
        scroll_id: &str,
        ttl: Duration,
    ) -> Result<ScrollResponse, BackendError> {
        let now = Instant::now();
        let mut scrolls = self.scrolls.lock();

        let expired = match scrolls.get(scroll_id) {
            None => true,
            Some(ctx) => ctx.expires_at <= now,
        };
        if expired {
            scrolls.remove(scroll_id);
            return Err(BackendError::ScrollExpired(scroll_id.to_string()));
        }

        let ctx = scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| BackendError::ScrollExpired(scroll_id.to_string()))?;
        ctx.expires_at = now + ttl;
        Ok(Self::next_page(scroll_id.to_string(), ctx))
    }

    async fn update_by_query(
        &self,
        type_name: &str,
        post_filter: &JsonValue,
        script: &UpdateScript,
    ) -> Result<UpdateByQueryResponse, BackendError> {
        let mut documents = self.documents.write();
        let Some(docs) = documents.get_mut(type_name) else {
            return Ok(UpdateByQueryResponse {
                timed_out: false,
                total: Some(0),
                updated: Some(0),
            });
        };

        // a failing filter must leave all documents untouched
        let mut matching = Vec::new();
        for (id, doc) in docs.iter() {
            if filter::matches(post_filter, doc)? {
                matching.push(id.clone());
            }
        }

        for id in &matching {
            if let Some(doc) = docs.get_mut(id) {
                script.apply(doc);
            }
        }

        event!(
            Level::DEBUG,
            updated = matching.len(),
            type_name,
            "applied update script"
        );

        Ok(UpdateByQueryResponse {
            timed_out: false,
            total: Some(matching.len() as u64),
            updated: Some(matching.len() as u64),
        })
    }

    async fn add_documents(
        &self,
        type_name: &str,
        documents: Vec<(String, JsonValue)>,
    ) -> Result<(), BackendError> {
        if let Some((id, _)) = documents.iter().find(|(_, doc)| !doc.is_object()) {
            return Err(BackendError::bad_request(format!(
                "document `{id}' is not an object"
            )));
        }

        let mut all = self.documents.write();
        all.entry(type_name.to_string())
            .or_default()
            .extend(documents);
        Ok(())
    }

    async fn delete_documents(&self, type_name: &str, ids: &[String]) -> Result<(), BackendError> {
        if let Some(docs) = self.documents.write().get_mut(type_name) {
            for id in ids {
                docs.remove(id);
            }
        }
        Ok(())
    }
}
