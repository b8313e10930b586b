//! Persistent chunk bytes and the [`Store`] that keeps them in sync with the
//! index backend

use std::{
    collections::BTreeMap,
    io::{Cursor, Read, Write},
    sync::Arc,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{event, Level};
use ulid::{Generator, Ulid};

use crate::{
    config::IndexConfig,
    index::{ChunkDocument, IndexBackend, IndexerRegistry},
    meta::{ChunkMeta, IndexMeta},
    metadata::MetadataService,
    output::MultiMerger,
    query::QueryCompiler,
    Error,
};

pub use self::{
    cursor::{CursorItem, StoreCursor},
    memory::MemoryChunkStorage,
};

pub mod cursor;
pub mod memory;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// A key-value store for chunk bytes. Keys are chunk paths.
#[async_trait]
pub trait ChunkStorage: Send + Sync {
    /// Store a chunk, replacing any chunk with the same path
    async fn put(&self, path: &str, chunk: Vec<u8>) -> Result<(), StorageError>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Delete the chunks with the given paths. Missing chunks are ignored.
    async fn delete(&self, paths: &[String]) -> Result<(), StorageError>;
}

/// The bytes of a single stored chunk
#[derive(Debug)]
pub struct ChunkReadStream {
    inner: Cursor<Vec<u8>>,
}

impl ChunkReadStream {
    pub fn new(chunk: Vec<u8>) -> Self {
        Self {
            inner: Cursor::new(chunk),
        }
    }

    /// The total size of the chunk in bytes
    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Read for ChunkReadStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

/// Combines chunk storage with the index backend. Every stored chunk has
/// exactly one index document whose ID is the chunk's path.
#[derive(Clone)]
pub struct Store {
    storage: Arc<dyn ChunkStorage>,
    backend: Arc<dyn IndexBackend>,
    registry: Arc<IndexerRegistry>,
    compiler: QueryCompiler,
    config: IndexConfig,

    /// Chunk IDs created by this store sort in insertion order
    ids: Arc<Mutex<Generator>>,
}

impl Store {
    pub fn new(
        storage: Arc<dyn ChunkStorage>,
        backend: Arc<dyn IndexBackend>,
        registry: Arc<IndexerRegistry>,
        config: IndexConfig,
    ) -> Self {
        let compiler = QueryCompiler::new(registry.clone());
        Self {
            storage,
            backend,
            registry,
            compiler,
            config,
            ids: Arc::new(Mutex::new(Generator::new())),
        }
    }

    fn next_id(&self) -> Ulid {
        // the generator only fails if the random part overflows within
        // one millisecond
        self.ids.lock().generate().unwrap_or_else(|_| Ulid::new())
    }

    /// A service for querying and editing chunk metadata that shares this
    /// store's backend
    pub fn metadata(&self) -> MetadataService {
        MetadataService::new(
            self.backend.clone(),
            self.compiler.clone(),
            self.config.clone(),
        )
    }

    /// Create the index and register the mapping of all indexer factories
    pub async fn setup(&self) -> Result<(), Error> {
        event!(Level::INFO, index = self.config.index_name, "setting up index");
        self.backend.ensure_index().await?;
        self.backend
            .put_mapping(&self.config.type_name, &self.registry.mapping())
            .await?;
        Ok(())
    }

    /// Store a chunk in the given directory (the root directory if `None`)
    /// and index it. Returns the path of the new chunk.
    pub async fn add(
        &self,
        chunk: Vec<u8>,
        meta: ChunkMeta,
        path: Option<&str>,
        index_meta: IndexMeta,
    ) -> Result<String, Error> {
        self.add_with_attributes(chunk, meta, path, index_meta, BTreeMap::new())
            .await
    }

    /// Like [`add`](Self::add) but also indexes generic attributes extracted
    /// from the chunk
    pub async fn add_with_attributes(
        &self,
        chunk: Vec<u8>,
        meta: ChunkMeta,
        path: Option<&str>,
        index_meta: IndexMeta,
        attributes: BTreeMap<String, String>,
    ) -> Result<String, Error> {
        let path = chunk_path(path, self.next_id());
        let document = ChunkDocument::new(path.clone(), meta, index_meta)
            .with_generic_attributes(attributes);

        self.storage.put(&path, chunk).await?;

        let r = self
            .backend
            .add_documents(&self.config.type_name, vec![(path.clone(), document.to_json())])
            .await;
        if let Err(e) = r {
            event!(Level::WARN, path, error = %e, "could not index chunk");
            // do not leave unindexed chunks behind
            self.storage.delete(&[path]).await?;
            return Err(e.into());
        }

        event!(Level::DEBUG, path, "added chunk");
        Ok(path)
    }

    /// Get the bytes of the chunk with the given path
    pub async fn get_one(&self, path: &str) -> Result<ChunkReadStream, Error> {
        self.storage
            .get(path)
            .await?
            .map(ChunkReadStream::new)
            .ok_or_else(|| Error::NotFound(path.to_string()))
    }

    /// Open a cursor over all chunks matching the search in the given path
    pub async fn get(&self, search: Option<&str>, path: Option<&str>) -> Result<StoreCursor, Error> {
        let filter = self.compiler.compile(search, path)?;
        StoreCursor::open(
            self.backend.clone(),
            &self.config.type_name,
            &filter,
            self.config.default_page_size,
            self.config.scroll_ttl,
        )
        .await
    }

    /// Delete all matching chunks page by page. Index documents are removed
    /// before the bytes. Returns the number of deleted chunks.
    pub async fn delete(&self, search: Option<&str>, path: Option<&str>) -> Result<usize, Error> {
        let mut cursor = self.get(search, path).await?;
        let mut deleted = 0;
        loop {
            let page = cursor.next_page().await?;
            if page.is_empty() {
                break;
            }

            let paths = page.into_iter().map(|i| i.path).collect::<Vec<_>>();
            self.backend
                .delete_documents(&self.config.type_name, &paths)
                .await?;
            self.storage.delete(&paths).await?;
            deleted += paths.len();
        }

        event!(Level::INFO, deleted, search, path, "deleted chunks");
        Ok(deleted)
    }

    /// Merge all matching chunks into a single document. Returns the number
    /// of merged chunks.
    pub async fn export<W: Write + Send>(
        &self,
        search: Option<&str>,
        path: Option<&str>,
        out: &mut W,
    ) -> Result<usize, Error> {
        let mut cursor = self.get(search, path).await?;
        let mut merger = MultiMerger::new();
        let mut merged = 0;

        while let Some(item) = cursor.next().await? {
            let chunk = self
                .storage
                .get(&item.path)
                .await?
                .ok_or_else(|| Error::NotFound(item.path.clone()))?;
            merger.merge(&chunk, &item.meta, out)?;
            merged += 1;
        }

        merger.finish(out)?;
        event!(Level::DEBUG, merged, "exported chunks");
        Ok(merged)
    }
}

/// Build the path of a new chunk in the given directory
fn chunk_path(dir: Option<&str>, id: Ulid) -> String {
    let dir = dir.unwrap_or_default().trim_matches('/');
    if dir.is_empty() {
        format!("/{id}")
    } else {
        format!("/{dir}/{id}")
    }
}
