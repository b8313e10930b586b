use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{ChunkStorage, StorageError};

/// Keeps chunk bytes in memory, ordered by path
#[derive(Debug, Default)]
pub struct MemoryChunkStorage {
    chunks: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryChunkStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.chunks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.read().is_empty()
    }
}

#[async_trait]
impl ChunkStorage for MemoryChunkStorage {
    async fn put(&self, path: &str, chunk: Vec<u8>) -> Result<(), StorageError> {
        self.chunks.write().insert(path.to_string(), chunk);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.chunks.read().get(path).cloned())
    }

    async fn delete(&self, paths: &[String]) -> Result<(), StorageError> {
        let mut chunks = self.chunks.write();
        for p in paths {
            chunks.remove(p);
        }
        Ok(())
    }
}
