use std::{collections::VecDeque, sync::Arc, time::Duration};

use serde_json::Value as JsonValue;
use tracing::{event, Level};

use crate::{
    index::{Hit, IndexBackend, ScrollResponse},
    meta::ChunkMeta,
    Error,
};

/// A matched chunk: where it is stored and how to merge it
#[derive(Debug, Clone, PartialEq)]
pub struct CursorItem {
    pub path: String,
    pub meta: ChunkMeta,
}

impl TryFrom<Hit> for CursorItem {
    type Error = Error;

    fn try_from(hit: Hit) -> Result<Self, Self::Error> {
        let mut source = hit.source;
        let meta = source
            .get_mut("chunkMeta")
            .map(JsonValue::take)
            .unwrap_or_default();
        Ok(CursorItem {
            path: hit.id,
            meta: ChunkMeta::from_json(meta)?,
        })
    }
}

/// Iterates over all chunks matching a query, fetching one page at a time
/// from the index backend. The cursor is owned by the request that opened it.
pub struct StoreCursor {
    backend: Arc<dyn IndexBackend>,
    ttl: Duration,
    scroll_id: Option<String>,
    page: VecDeque<CursorItem>,
    total_hits: u64,
    position: u64,
    exhausted: bool,
}

impl StoreCursor {
    /// Open a new scroll and fetch the first page
    pub async fn open(
        backend: Arc<dyn IndexBackend>,
        type_name: &str,
        filter: &JsonValue,
        page_size: usize,
        ttl: Duration,
    ) -> Result<Self, Error> {
        let response = backend
            .begin_scroll(type_name, None, filter, page_size, ttl)
            .await?;
        event!(
            Level::DEBUG,
            total_hits = response.total_hits,
            page_size,
            "opened store cursor"
        );

        let mut cursor = StoreCursor {
            backend,
            ttl,
            scroll_id: None,
            page: VecDeque::new(),
            total_hits: 0,
            position: 0,
            exhausted: false,
        };
        cursor.accept(response)?;
        Ok(cursor)
    }

    /// The number of chunks matched when the cursor was opened
    pub fn total_hits(&self) -> u64 {
        self.total_hits
    }

    /// The number of chunks already returned by [`next`](Self::next)
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }

    pub fn has_next(&self) -> bool {
        !self.page.is_empty() || (!self.exhausted && self.position < self.total_hits)
    }

    /// Get the next matching chunk, or `None` if there are no more
    pub async fn next(&mut self) -> Result<Option<CursorItem>, Error> {
        if self.page.is_empty() && self.has_next() {
            self.fetch().await?;
        }

        let item = self.page.pop_front();
        if item.is_some() {
            self.position += 1;
        }
        Ok(item)
    }

    /// Get the rest of the current page, fetching a new one if it is empty.
    /// An empty result means the cursor is exhausted.
    pub async fn next_page(&mut self) -> Result<Vec<CursorItem>, Error> {
        if self.page.is_empty() && self.has_next() {
            self.fetch().await?;
        }

        let items = self.page.drain(..).collect::<Vec<_>>();
        self.position += items.len() as u64;
        Ok(items)
    }

    async fn fetch(&mut self) -> Result<(), Error> {
        let Some(scroll_id) = self.scroll_id.clone() else {
            self.exhausted = true;
            return Ok(());
        };

        event!(Level::DEBUG, scroll_id, position = self.position, "continuing store cursor");
        let response = self.backend.continue_scroll(&scroll_id, self.ttl).await?;
        self.accept(response)
    }

    fn accept(&mut self, response: ScrollResponse) -> Result<(), Error> {
        self.total_hits = response.total_hits;
        self.scroll_id = response.scroll_id;
        if response.hits.is_empty() {
            self.exhausted = true;
        }
        for hit in response.hits {
            self.page.push_back(CursorItem::try_from(hit)?);
        }
        Ok(())
    }
}
