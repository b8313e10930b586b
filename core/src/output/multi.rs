use std::io::Write;

use thiserror::Error;

use crate::{
    meta::{ChunkFormat, ChunkMeta},
    output::{
        geo_json::{GeoJsonMerger, GeoJsonMergerError},
        xml::{XmlMerger, XmlMergerError},
        Merger,
    },
};

#[derive(Error, Debug)]
pub enum MergeError {
    #[error("cannot merge {found} chunk into {expected} document")]
    FormatConflict {
        found: ChunkFormat,
        expected: ChunkFormat,
    },

    #[error("unsupported chunk type `{0}'")]
    UnsupportedChunkType(String),

    #[error(transparent)]
    Xml(#[from] XmlMergerError),

    #[error(transparent)]
    GeoJson(#[from] GeoJsonMergerError),
}

#[derive(Debug)]
enum BoundMerger {
    Xml(XmlMerger),
    GeoJson(GeoJsonMerger),
}

impl BoundMerger {
    fn for_format(format: ChunkFormat) -> Self {
        match format {
            ChunkFormat::Xml => BoundMerger::Xml(XmlMerger::new()),
            ChunkFormat::GeoJson => BoundMerger::GeoJson(GeoJsonMerger::new()),
        }
    }

    fn format(&self) -> ChunkFormat {
        match self {
            BoundMerger::Xml(_) => ChunkFormat::Xml,
            BoundMerger::GeoJson(_) => ChunkFormat::GeoJson,
        }
    }
}

fn conflict(found: ChunkFormat, bound: &BoundMerger) -> MergeError {
    MergeError::FormatConflict {
        found,
        expected: bound.format(),
    }
}

/// A merger that accepts chunks of any supported format. The first chunk
/// (or the metadata passed to [`init`](MultiMerger::init)) binds the
/// session to the merger for its format. Chunks of any other format are
/// rejected.
#[derive(Debug, Default)]
pub struct MultiMerger {
    merger: Option<BoundMerger>,
}

impl MultiMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// The format this session is bound to, if any
    pub fn format(&self) -> Option<ChunkFormat> {
        self.merger.as_ref().map(BoundMerger::format)
    }

    /// Binds the session to the merger for the given format or checks that
    /// it is already bound to it
    pub fn ensure_format(&mut self, format: ChunkFormat) -> Result<(), MergeError> {
        self.bind(format).map(|_| ())
    }

    fn bind(&mut self, format: ChunkFormat) -> Result<&mut BoundMerger, MergeError> {
        let merger = self
            .merger
            .get_or_insert_with(|| BoundMerger::for_format(format));
        if merger.format() != format {
            return Err(conflict(format, merger));
        }
        Ok(merger)
    }

    /// Binds the session to a format given as a MIME type. Unknown types are
    /// rejected.
    pub fn ensure_mime_type(&mut self, mime_type: &str) -> Result<(), MergeError> {
        let format = ChunkFormat::from_mime_type(mime_type)
            .ok_or_else(|| MergeError::UnsupportedChunkType(mime_type.to_string()))?;
        self.ensure_format(format)
    }

    pub fn init(&mut self, meta: &ChunkMeta) -> Result<(), MergeError> {
        match (self.bind(meta.format())?, meta) {
            (BoundMerger::Xml(m), ChunkMeta::Xml(meta)) => m.init(meta)?,
            (BoundMerger::GeoJson(m), ChunkMeta::GeoJson(meta)) => m.init(meta)?,
            (m, meta) => return Err(conflict(meta.format(), m)),
        }
        Ok(())
    }

    pub fn merge<W: Write>(
        &mut self,
        chunk: &[u8],
        meta: &ChunkMeta,
        out: &mut W,
    ) -> Result<(), MergeError> {
        match (self.bind(meta.format())?, meta) {
            (BoundMerger::Xml(m), ChunkMeta::Xml(meta)) => m.merge(chunk, meta, out)?,
            (BoundMerger::GeoJson(m), ChunkMeta::GeoJson(meta)) => m.merge(chunk, meta, out)?,
            (m, meta) => return Err(conflict(meta.format(), m)),
        }
        Ok(())
    }

    /// Finish the merger this session is bound to. Does nothing if no chunk
    /// has been initialized or merged.
    pub fn finish<W: Write>(&mut self, out: &mut W) -> Result<(), MergeError> {
        match self.merger.as_mut() {
            Some(BoundMerger::Xml(m)) => m.finish(out)?,
            Some(BoundMerger::GeoJson(m)) => m.finish(out)?,
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::str::from_utf8;

    use pretty_assertions::assert_eq;

    use crate::meta::{
        ChunkFormat, ChunkMeta, GeoJsonChunkMeta, Prefix, XmlChunkMeta, XmlStartElement,
    };

    use super::{MergeError, MultiMerger};

    fn xml_meta() -> ChunkMeta {
        XmlChunkMeta::new(
            vec![XmlStartElement::plain(Prefix::Default, "root")],
            0,
            0,
        )
        .into()
    }

    fn geo_json_meta() -> ChunkMeta {
        GeoJsonChunkMeta::feature().into()
    }

    #[test]
    fn xml_then_geo_json() {
        let mut out = Vec::new();
        let mut merger = MultiMerger::new();
        merger.merge(b"<a/>", &xml_meta(), &mut out).unwrap();
        let before = out.clone();

        let e = merger
            .merge(br#"{"type":"Feature"}"#, &geo_json_meta(), &mut out)
            .unwrap_err();
        assert_eq!(e.to_string(), "cannot merge GeoJSON chunk into XML document");
        assert!(matches!(
            e,
            MergeError::FormatConflict {
                found: ChunkFormat::GeoJson,
                expected: ChunkFormat::Xml
            }
        ));
        assert_eq!(out, before);
        assert_eq!(merger.format(), Some(ChunkFormat::Xml));
    }

    #[test]
    fn geo_json_then_xml() {
        let mut out = Vec::new();
        let mut merger = MultiMerger::new();
        merger
            .merge(br#"{"type":"Feature"}"#, &geo_json_meta(), &mut out)
            .unwrap();
        let e = merger.merge(b"<a/>", &xml_meta(), &mut out).unwrap_err();
        assert_eq!(e.to_string(), "cannot merge XML chunk into GeoJSON document");
    }

    #[test]
    fn init_binds_format() {
        let mut out = Vec::new();
        let mut merger = MultiMerger::new();
        merger.init(&geo_json_meta()).unwrap();
        assert!(matches!(
            merger.init(&xml_meta()),
            Err(MergeError::FormatConflict { .. })
        ));
        merger.finish(&mut out).unwrap();
        assert_eq!(
            from_utf8(&out).unwrap(),
            r#"{"type":"FeatureCollection","features":[]}"#
        );
    }

    #[test]
    fn finish_unbound() {
        let mut out = Vec::new();
        let mut merger = MultiMerger::new();
        merger.finish(&mut out).unwrap();
        assert!(out.is_empty());
        assert_eq!(merger.format(), None);
    }

    #[test]
    fn unsupported_mime_type() {
        let mut merger = MultiMerger::new();
        match merger.ensure_mime_type("text/csv") {
            Err(MergeError::UnsupportedChunkType(m)) => assert_eq!(m, "text/csv"),
            r => panic!("unexpected result: {r:?}"),
        }
        merger.ensure_mime_type("application/xml").unwrap();
        assert_eq!(merger.format(), Some(ChunkFormat::Xml));
    }

    #[test]
    fn xml_session() {
        let mut out = Vec::new();
        let mut merger = MultiMerger::new();
        merger.merge(b"<a/>", &xml_meta(), &mut out).unwrap();
        merger.merge(b"<b/>", &xml_meta(), &mut out).unwrap();
        merger.finish(&mut out).unwrap();
        assert_eq!(
            from_utf8(&out).unwrap(),
            "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n<root><a/><b/></root>"
        );
    }
}
