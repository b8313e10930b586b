use std::io::Write;

use thiserror::Error;

use crate::{meta::GeoJsonChunkMeta, output::Merger};

#[derive(Error, Debug)]
pub enum GeoJsonMergerError {
    #[error("a Feature cannot be merged into a GeometryCollection")]
    FeatureIntoGeometryCollection,

    #[error("the merger has already been initialized")]
    AlreadyInitialized,

    #[error("the merger cannot be initialized after merging has begun")]
    InitAfterMerge,

    #[error("the document has already been finished")]
    Finished,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// The top-level object wrapping all merged chunks
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Collection {
    Features,
    Geometries,
}

impl Collection {
    fn for_chunk(meta: &GeoJsonChunkMeta) -> Self {
        if meta.is_feature() {
            Collection::Features
        } else {
            Collection::Geometries
        }
    }

    fn header(&self) -> &'static [u8] {
        match self {
            Collection::Features => br#"{"type":"FeatureCollection","features":["#,
            Collection::Geometries => br#"{"type":"GeometryCollection","geometries":["#,
        }
    }
}

/// Merges GeoJSON chunks into a FeatureCollection or a GeometryCollection
#[derive(Debug, Default)]
pub struct GeoJsonMerger {
    collection: Option<Collection>,
    header_written: bool,
    merged_chunks: usize,
    finished: bool,
}

impl GeoJsonMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merged_chunks(&self) -> usize {
        self.merged_chunks
    }
}

impl Merger<GeoJsonChunkMeta> for GeoJsonMerger {
    type Error = GeoJsonMergerError;

    fn init(&mut self, meta: &GeoJsonChunkMeta) -> Result<(), GeoJsonMergerError> {
        if self.merged_chunks > 0 {
            return Err(GeoJsonMergerError::InitAfterMerge);
        }
        if self.collection.is_some() {
            return Err(GeoJsonMergerError::AlreadyInitialized);
        }
        self.collection = Some(Collection::for_chunk(meta));
        Ok(())
    }

    fn merge<W: Write>(
        &mut self,
        chunk: &[u8],
        meta: &GeoJsonChunkMeta,
        out: &mut W,
    ) -> Result<(), GeoJsonMergerError> {
        if self.finished {
            return Err(GeoJsonMergerError::Finished);
        }

        let collection = *self
            .collection
            .get_or_insert_with(|| Collection::for_chunk(meta));
        let wrap = match (collection, meta.is_feature()) {
            (Collection::Geometries, true) => {
                return Err(GeoJsonMergerError::FeatureIntoGeometryCollection)
            }
            (Collection::Features, false) => true,
            _ => false,
        };

        let mut buf = Vec::with_capacity(chunk.len() + 64);
        if !self.header_written {
            buf.extend_from_slice(collection.header());
        }
        if self.merged_chunks > 0 {
            buf.push(b',');
        }
        if wrap {
            buf.extend_from_slice(br#"{"type":"Feature","geometry":"#);
            buf.extend_from_slice(chunk);
            buf.push(b'}');
        } else {
            buf.extend_from_slice(chunk);
        }

        out.write_all(&buf)?;
        self.header_written = true;
        self.merged_chunks += 1;

        Ok(())
    }

    fn finish<W: Write>(&mut self, out: &mut W) -> Result<(), GeoJsonMergerError> {
        if self.finished {
            return Ok(());
        }

        if let Some(collection) = self.collection {
            let mut buf = Vec::new();
            if !self.header_written {
                buf.extend_from_slice(collection.header());
            }
            buf.extend_from_slice(b"]}");
            out.write_all(&buf)?;
            out.flush()?;
            self.header_written = true;
            self.finished = true;
        }

        Ok(())
    }
}
