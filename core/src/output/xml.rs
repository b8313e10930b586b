use std::{borrow::Cow, collections::BTreeMap, io::Write};

use quick_xml::{
    escape::escape,
    events::{BytesStart, Event},
    name::QName,
    Reader,
};
use thiserror::Error;

use crate::{
    meta::{
        xml::{
            format_schema_location, namespaces_in_scope, parse_schema_location,
            schema_locations_in_scope,
        },
        Prefix, XmlChunkMeta, XmlStartElement,
    },
    output::Merger,
};

const XML_DECLARATION: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\n";

/// Errors that can occur during XML merging
#[derive(Error, Debug)]
pub enum XmlMergerError {
    #[error("chunks without parent elements cannot be merged into one document")]
    MultipleRootElements,

    #[error("chunk is nested {found} levels deep but the document expects {expected}")]
    ParentDepthMismatch { found: usize, expected: usize },

    #[error("mismatching parent element (found `{found}', expected `{expected}')")]
    MismatchingParentElement { found: String, expected: String },

    #[error("parent element is from unexpected namespace (found `{found}', expected `{expected}')")]
    UnexpectedParentNamespace { found: String, expected: String },

    #[error("no namespace found for prefix `{0}'")]
    UnknownNamespacePrefix(Prefix),

    #[error("reached end of chunk without finding a start tag")]
    PrematureEndOfChunk,

    #[error("expected end of chunk but found additional content")]
    UnexpectedContent,

    #[error("the merger has already been initialized")]
    AlreadyInitialized,

    #[error("the merger cannot be initialized after merging has begun")]
    InitAfterMerge,

    #[error("the document has already been finished")]
    Finished,

    #[error("unable to parse chunk")]
    Parser(#[from] quick_xml::Error),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// A merger that merges XML chunks. The parent elements of the first chunk
/// (or of the metadata passed to [`init`](Merger::init)) are written once.
/// Namespaces that later chunks need but that are not in scope in the
/// written document are declared on the chunks' own start tags.
#[derive(Debug, Default)]
pub struct XmlMerger {
    parents: Option<Vec<XmlStartElement>>,
    header_written: bool,
    merged_chunks: usize,
    finished: bool,
}

impl XmlMerger {
    /// Create a new XML merger
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of chunks merged so far
    pub fn merged_chunks(&self) -> usize {
        self.merged_chunks
    }
}

impl Merger<XmlChunkMeta> for XmlMerger {
    type Error = XmlMergerError;

    fn init(&mut self, meta: &XmlChunkMeta) -> Result<(), XmlMergerError> {
        if self.merged_chunks > 0 {
            return Err(XmlMergerError::InitAfterMerge);
        }
        if self.parents.is_some() {
            return Err(XmlMergerError::AlreadyInitialized);
        }
        self.parents = Some(meta.parents.clone());
        Ok(())
    }

    fn merge<W: Write>(
        &mut self,
        chunk: &[u8],
        meta: &XmlChunkMeta,
        out: &mut W,
    ) -> Result<(), XmlMergerError> {
        if self.finished {
            return Err(XmlMergerError::Finished);
        }

        // the first chunk only determines the parents if it can be merged
        let parents = self.parents.as_ref().unwrap_or(&meta.parents);
        if parents.is_empty() && self.merged_chunks > 0 {
            return Err(XmlMergerError::MultipleRootElements);
        }
        check_compatible(parents, &meta.parents)?;

        let mut buf = Vec::with_capacity(chunk.len() + 128);
        if !self.header_written {
            write_header(&mut buf, parents);
        }

        let namespaces = missing_namespaces(parents, &meta.parents);
        let schema_location = missing_schema_locations(parents, &meta.parents);
        if namespaces.is_empty() && schema_location.is_none() {
            buf.extend_from_slice(chunk);
        } else {
            let (start_tag, remainder) = merge_into_chunk(chunk, &namespaces, schema_location)?;
            buf.push(b'<');
            buf.extend_from_slice(&start_tag);
            buf.push(b'>');
            buf.extend_from_slice(&remainder);
        }

        // write everything at once so a failed merge leaves the output untouched
        out.write_all(&buf)?;
        if self.parents.is_none() {
            self.parents = Some(meta.parents.clone());
        }
        self.header_written = true;
        self.merged_chunks += 1;

        Ok(())
    }

    /// Close all parent elements. A session bound to an empty parent chain
    /// without any merged chunk yields no output at all, since there is no
    /// root element to write.
    fn finish<W: Write>(&mut self, out: &mut W) -> Result<(), XmlMergerError> {
        if self.finished {
            return Ok(());
        }

        if let Some(parents) = self.parents.as_ref() {
            let mut buf = Vec::new();
            if !self.header_written {
                write_header(&mut buf, parents);
            }
            for p in parents.iter().rev() {
                buf.extend_from_slice(b"</");
                buf.extend_from_slice(&p.to_bytes_end());
                buf.push(b'>');
            }
            out.write_all(&buf)?;
            out.flush()?;
            self.header_written = true;
            self.finished = true;
        }

        Ok(())
    }
}

/// Write the XML declaration and the start tags of all parents. Chunks
/// without parents are complete documents, so nothing is written for them.
fn write_header(buf: &mut Vec<u8>, parents: &[XmlStartElement]) {
    if parents.is_empty() {
        return;
    }
    buf.extend_from_slice(XML_DECLARATION);
    for p in parents {
        buf.push(b'<');
        buf.extend_from_slice(&p.to_bytes_start());
        buf.push(b'>');
    }
}

/// Get the namespace bound to `prefix` in the given scope. The default
/// namespace may be unbound.
fn resolve_prefix<'a>(
    prefix: &Prefix,
    scope: &'a BTreeMap<Prefix, String>,
) -> Result<Option<&'a String>, XmlMergerError> {
    match prefix {
        Prefix::Default => Ok(scope.get(prefix)),
        Prefix::Named(_) => scope
            .get(prefix)
            .map(Some)
            .ok_or_else(|| XmlMergerError::UnknownNamespacePrefix(prefix.clone())),
    }
}

/// Check if a chunk with the given parents can be merged into a document
/// whose parents have already been written. Both chains must have the same
/// depth and each level must have the same local name and namespace.
fn check_compatible(
    written: &[XmlStartElement],
    parents: &[XmlStartElement],
) -> Result<(), XmlMergerError> {
    if written.len() != parents.len() {
        return Err(XmlMergerError::ParentDepthMismatch {
            found: parents.len(),
            expected: written.len(),
        });
    }

    for i in 0..written.len() {
        let expected = &written[i];
        let found = &parents[i];

        if expected.local_name != found.local_name {
            return Err(XmlMergerError::MismatchingParentElement {
                found: found.qualified_name(),
                expected: expected.qualified_name(),
            });
        }

        let expected_scope = namespaces_in_scope(&written[..=i]);
        let found_scope = namespaces_in_scope(&parents[..=i]);
        let expected_ns = resolve_prefix(&expected.prefix, &expected_scope)?;
        let found_ns = resolve_prefix(&found.prefix, &found_scope)?;
        if expected_ns != found_ns {
            return Err(XmlMergerError::UnexpectedParentNamespace {
                found: found_ns.cloned().unwrap_or_default(),
                expected: expected_ns.cloned().unwrap_or_default(),
            });
        }
    }

    Ok(())
}

/// Namespaces in scope for a chunk with the given parents that are not in
/// scope (or bound to a different URI) in the written document. A default
/// namespace bound in the document but not for the chunk is reset to `""`.
fn missing_namespaces(
    written: &[XmlStartElement],
    parents: &[XmlStartElement],
) -> Vec<(Prefix, String)> {
    let written_scope = namespaces_in_scope(written);
    let mut scope = namespaces_in_scope(parents);
    scope.entry(Prefix::Default).or_default();
    scope
        .into_iter()
        .filter(|(p, ns)| match p {
            Prefix::Default => written_scope.get(p).map_or("", String::as_str) != ns,
            Prefix::Named(_) => written_scope.get(p) != Some(ns),
        })
        .collect()
}

/// Schema locations declared by the chunk's parents but not by the written
/// document, together with the prefix of the innermost `schemaLocation`
/// attribute among the chunk's parents
fn missing_schema_locations(
    written: &[XmlStartElement],
    parents: &[XmlStartElement],
) -> Option<(Prefix, Vec<(String, String)>)> {
    let prefix = parents
        .iter()
        .rev()
        .find_map(|p| p.schema_location.as_ref())
        .map(|(p, _)| p.clone())?;

    let written_locations = schema_locations_in_scope(written);
    let locations = schema_locations_in_scope(parents)
        .into_iter()
        .filter(|l| !written_locations.contains(l))
        .collect::<Vec<_>>();

    if locations.is_empty() {
        None
    } else {
        Some((prefix, locations))
    }
}

/// Split a chunk into its start tag and the remainder after the start tag.
/// Anything before the start tag is skipped.
fn split_chunk<'a>(
    chunk: &'a [u8],
    reader: &mut Reader<&'a [u8]>,
) -> Result<(BytesStart<'a>, Cow<'a, [u8]>), XmlMergerError> {
    loop {
        let e = reader.read_event()?;
        match e {
            Event::Start(bs) => return Ok((bs, Cow::from(&chunk[reader.buffer_position()..]))),

            Event::Empty(bs) => {
                let is_remainder_blank = reader
                    .decoder()
                    .decode(&chunk[reader.buffer_position()..])?
                    .trim()
                    .is_empty();
                if !is_remainder_blank {
                    return Err(XmlMergerError::UnexpectedContent);
                }

                // There is no start tag. The chunk consists of an empty tag
                // only. Generate a corresponding end tag and make this the
                // remainder.
                let mut end = vec![b'<', b'/'];
                end.extend(bs.to_owned().to_end().iter());
                end.push(b'>');
                return Ok((bs, Cow::from(end)));
            }

            Event::Eof => return Err(XmlMergerError::PrematureEndOfChunk),

            _ => {}
        }
    }
}

/// Merge namespaces into the start tag unless the tag already declares the
/// same prefix
fn merge_namespaces_into_start_tag(
    bytes_start: &mut BytesStart,
    namespaces: &[(Prefix, String)],
) -> Result<(), XmlMergerError> {
    for (prefix, ns) in namespaces {
        let key = prefix.xmlns_attribute();
        if bytes_start.try_get_attribute(&key)?.is_none() {
            let val = escape(ns);
            bytes_start.push_attribute((key.as_bytes(), val.as_bytes()));
        }
    }

    Ok(())
}

/// Merge the given schema locations into the `schemaLocation` attribute of
/// the start tag. Locations already specified by the start tag win over the
/// given ones.
fn merge_schema_location_into_start_tag(
    bytes_start: &mut BytesStart,
    schema_location: (Prefix, Vec<(String, String)>),
    reader: &Reader<&[u8]>,
) -> Result<(), XmlMergerError> {
    let (slp, mut schema_locations) = schema_location;

    // find and remove existing schema location value
    let key = slp.qualify("schemaLocation");
    let qname = QName(key.as_bytes());
    let mut dummy = BytesStart::new("a");
    let mut existing_schema_location = None;
    for a in bytes_start.attributes() {
        let a = a.map_err(quick_xml::Error::InvalidAttr)?;
        if a.key == qname {
            existing_schema_location = Some(a.value);
        } else {
            dummy.push_attribute(a);
        }
    }

    // overwrite schema locations from chunk
    if let Some(existing_schema_location) = existing_schema_location {
        let v = reader.decoder().decode(&existing_schema_location)?;
        for psl in parse_schema_location(&v) {
            if let Some(i) = schema_locations.iter().position(|sl| sl.0 == psl.0) {
                schema_locations[i].1 = psl.1;
            } else {
                schema_locations.push(psl);
            }
        }
    }

    if !schema_locations.is_empty() {
        schema_locations.sort_unstable();
        let value = format_schema_location(&schema_locations);
        dummy.push_attribute((key.as_bytes(), escape(&value).as_bytes()));
    }

    // update bytes_start
    bytes_start.clear_attributes();
    for a in dummy.attributes() {
        let a = a.map_err(quick_xml::Error::InvalidAttr)?;
        bytes_start.push_attribute(a);
    }

    Ok(())
}

/// Declare the given namespaces and schema locations on the chunk's start
/// tag. Return the new start tag and the remainder of the chunk.
fn merge_into_chunk<'a>(
    chunk: &'a [u8],
    namespaces: &[(Prefix, String)],
    schema_location: Option<(Prefix, Vec<(String, String)>)>,
) -> Result<(BytesStart<'static>, Cow<'a, [u8]>), XmlMergerError> {
    let mut reader = Reader::from_reader(chunk);
    let (mut bytes_start, remainder) = split_chunk(chunk, &mut reader)?;

    merge_namespaces_into_start_tag(&mut bytes_start, namespaces)?;
    if let Some(schema_location) = schema_location {
        merge_schema_location_into_start_tag(&mut bytes_start, schema_location, &reader)?;
    }

    Ok((bytes_start.into_owned(), remainder))
}

#[cfg(test)]
mod tests {
    use std::str::from_utf8;

    use pretty_assertions::assert_eq;
    use quick_xml::{
        events::Event,
        name::{Namespace, ResolveResult},
        NsReader, Reader,
    };

    use crate::{
        meta::{Prefix, XmlChunkMeta, XmlStartElement},
        output::Merger,
    };

    use super::{XmlMerger, XmlMergerError};

    const DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

    fn named(n: &str) -> Prefix {
        Prefix::Named(n.to_string())
    }

    fn ns(p: Prefix, uri: &str) -> (Prefix, String) {
        (p, uri.to_string())
    }

    fn meta(parents: Vec<XmlStartElement>) -> XmlChunkMeta {
        XmlChunkMeta::new(parents, 0, 0)
    }

    fn root(namespaces: Vec<(Prefix, String)>) -> XmlStartElement {
        XmlStartElement::new(named("foo"), "root", namespaces, None, vec![])
    }

    fn merge_all(chunks: &[(&str, XmlChunkMeta)]) -> String {
        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        for (chunk, meta) in chunks {
            merger.merge(chunk.as_bytes(), meta, &mut s).unwrap();
        }
        merger.finish(&mut s).unwrap();
        String::from_utf8(s).unwrap()
    }

    /// Parse the merged document and collect the names of all start tags
    fn element_names(xml: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut names = Vec::new();
        let mut depth = 0i32;
        loop {
            match reader.read_event().unwrap() {
                Event::Start(bs) => {
                    depth += 1;
                    names.push(from_utf8(bs.name().as_ref()).unwrap().to_string());
                }
                Event::Empty(bs) => {
                    names.push(from_utf8(bs.name().as_ref()).unwrap().to_string());
                }
                Event::End(_) => depth -= 1,
                Event::Eof => break,
                _ => {}
            }
        }
        assert_eq!(depth, 0);
        names
    }

    /// Test if simple chunks can be merged
    #[test]
    fn simple() {
        let chunk1 = r#"<test chunk="1"></test>"#;
        let chunk2 = r#"<test chunk="2"></test>"#;
        let parents = vec![XmlStartElement::plain(Prefix::Default, "root")];

        let s = merge_all(&[(chunk1, meta(parents.clone())), (chunk2, meta(parents))]);
        let expected = format!("{DECL}\n<root>{chunk1}{chunk2}</root>");
        assert_eq!(s, expected);
    }

    /// Test if chunks nested in several parents can be merged and if the
    /// parents' attributes are written only once
    #[test]
    fn nested_parents() {
        let parents = vec![
            XmlStartElement::new(
                named("gml"),
                "FeatureCollection",
                vec![ns(named("gml"), "http://www.opengis.net/gml")],
                None,
                vec![("gml:id".to_string(), "fc1".to_string())],
            ),
            XmlStartElement::plain(named("gml"), "featureMember"),
        ];
        let chunk1 = r#"<Building id="1"/>"#;
        let chunk2 = r#"<Building id="2"/>"#;

        let s = merge_all(&[(chunk1, meta(parents.clone())), (chunk2, meta(parents))]);
        let expected = concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<gml:FeatureCollection xmlns:gml="http://www.opengis.net/gml" gml:id="fc1">"#,
            r#"<gml:featureMember>"#,
            r#"<Building id="1"/><Building id="2"/>"#,
            r#"</gml:featureMember></gml:FeatureCollection>"#,
        );
        assert_eq!(s, expected);
        assert_eq!(
            element_names(&s),
            vec![
                "gml:FeatureCollection",
                "gml:featureMember",
                "Building",
                "Building"
            ]
        );
    }

    /// Test if two chunks with different namespaces but the same root element
    /// (with the same namespace and prefix) can be merged
    #[test]
    fn different_namespaces_same_root() {
        let chunk1 = r#"<test chunk="1"></test>"#;
        let chunk2 = r#"<test chunk="2"></test>"#;

        let meta1 = meta(vec![root(vec![
            ns(named("foo"), "https://foo.com"),
            ns(named("prefix1"), "https://prefix1.com"),
        ])]);
        let meta2 = meta(vec![root(vec![
            ns(named("foo"), "https://foo.com"),
            ns(named("prefix2"), "https://prefix2.com"),
        ])]);

        let s = merge_all(&[(chunk1, meta1), (chunk2, meta2)]);
        let expected = format!(
            "{DECL}\n{}{}{}{}",
            r#"<foo:root xmlns:foo="https://foo.com" xmlns:prefix1="https://prefix1.com">"#,
            r#"<test chunk="1"></test>"#,
            r#"<test chunk="2" xmlns:prefix2="https://prefix2.com"></test>"#,
            r#"</foo:root>"#,
        );
        assert_eq!(s, expected);
    }

    /// Test if a namespace declared on an inner parent is added to a chunk
    /// exactly once and only where it is needed
    #[test]
    fn namespace_from_inner_parent() {
        let outer = XmlStartElement::new(
            Prefix::Default,
            "root",
            vec![ns(Prefix::Default, "https://example.com")],
            None,
            vec![],
        );
        let inner1 = XmlStartElement::plain(Prefix::Default, "member");
        let inner2 = XmlStartElement::new(
            Prefix::Default,
            "member",
            vec![ns(named("x"), "https://x.com")],
            None,
            vec![],
        );

        let s = merge_all(&[
            ("<a/>", meta(vec![outer.clone(), inner1.clone()])),
            ("<x:b/>", meta(vec![outer.clone(), inner2])),
            ("<c/>", meta(vec![outer, inner1])),
        ]);
        let expected = format!(
            "{DECL}\n{}{}{}",
            r#"<root xmlns="https://example.com"><member>"#,
            r#"<a/><x:b xmlns:x="https://x.com"></x:b><c/>"#,
            r#"</member></root>"#,
        );
        assert_eq!(s, expected);
        assert_eq!(element_names(&s), vec!["root", "member", "a", "x:b", "c"]);
    }

    /// Test if two chunks with different namespaces but the same root element
    /// (with the same namespace and prefix) can be merged even if the second
    /// chunk overwrites one of the namespaces
    #[test]
    fn different_namespaces_overwrite() {
        let chunk1 = r#"<test chunk="1"></test>"#;
        let chunk2 = r#"<test chunk="2" xmlns:prefix2="https://overwrite.com"></test>"#;

        let meta1 = meta(vec![root(vec![
            ns(named("foo"), "https://foo.com"),
            ns(named("prefix1"), "https://prefix1.com"),
        ])]);
        let meta2 = meta(vec![root(vec![
            ns(named("foo"), "https://foo.com"),
            ns(named("prefix2"), "https://prefix2.com"),
        ])]);

        let s = merge_all(&[(chunk1, meta1), (chunk2, meta2)]);
        let expected = format!(
            "{DECL}\n{}{}{}{}",
            r#"<foo:root xmlns:foo="https://foo.com" xmlns:prefix1="https://prefix1.com">"#,
            r#"<test chunk="1"></test>"#,
            r#"<test chunk="2" xmlns:prefix2="https://overwrite.com"></test>"#,
            r#"</foo:root>"#,
        );
        assert_eq!(s, expected);
    }

    /// Test what happens if we try to merge two chunks but one of them has
    /// an empty tag followed by additional content
    #[test]
    fn merge_empty_chunk_with_additional_content() {
        let chunk1 = r#"<test chunk="1"></test>"#;
        let chunk2 = "<test chunk=\"2\"/>  \n   ";
        let chunk3 = r#"<test chunk="3"/><another tag />"#;

        let meta1 = meta(vec![root(vec![ns(named("foo"), "https://foo.com")])]);
        let meta2 = meta(vec![root(vec![
            ns(named("foo"), "https://foo.com"),
            ns(named("prefix2"), "https://prefix2.com"),
        ])]);
        let meta3 = meta(vec![root(vec![
            ns(named("foo"), "https://foo.com"),
            ns(named("prefix3"), "https://prefix3.com"),
        ])]);

        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.merge(chunk1.as_bytes(), &meta1, &mut s).unwrap();

        // this should be OK because the chunk's remainder contains whitespace only
        merger.merge(chunk2.as_bytes(), &meta2, &mut s).unwrap();

        let before = s.clone();
        let e = merger.merge(chunk3.as_bytes(), &meta3, &mut s).unwrap_err();
        assert!(matches!(e, XmlMergerError::UnexpectedContent));
        assert_eq!(s, before);

        merger.finish(&mut s).unwrap();
        let expected = format!(
            "{DECL}\n{}{}{}{}",
            r#"<foo:root xmlns:foo="https://foo.com">"#,
            r#"<test chunk="1"></test>"#,
            r#"<test chunk="2" xmlns:prefix2="https://prefix2.com"></test>"#,
            r#"</foo:root>"#,
        );
        assert_eq!(from_utf8(&s).unwrap(), expected);
    }

    /// Test what happens if we try to merge a chunk that does neither have a
    /// start tag nor an empty tag
    #[test]
    fn merge_chunk_without_tag() {
        let meta1 = meta(vec![root(vec![ns(named("foo"), "https://foo.com")])]);
        let meta2 = meta(vec![root(vec![
            ns(named("foo"), "https://foo.com"),
            ns(named("prefix2"), "https://prefix2.com"),
        ])]);

        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.merge(b"<test/>", &meta1, &mut s).unwrap();
        let e = merger.merge(b"", &meta2, &mut s).unwrap_err();
        assert!(matches!(e, XmlMergerError::PrematureEndOfChunk));
    }

    /// Test what happens if we try to merge two chunks with different parent
    /// element names
    #[test]
    fn merge_root_elements_different_names() {
        let meta1 = meta(vec![XmlStartElement::plain(Prefix::Default, "root")]);
        let meta2 = meta(vec![XmlStartElement::plain(Prefix::Default, "other")]);

        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.merge(b"<test/>", &meta1, &mut s).unwrap();
        let before = s.clone();
        let e = merger.merge(b"<test/>", &meta2, &mut s).unwrap_err();
        match e {
            XmlMergerError::MismatchingParentElement { found, expected } => {
                assert_eq!(found, "other");
                assert_eq!(expected, "root");
            }
            e => panic!("unexpected error: {e}"),
        }
        assert_eq!(s, before);
    }

    /// Test what happens if we try to merge two chunks that have root elements
    /// with the same name but from different namespaces
    #[test]
    fn merge_root_elements_different_namespaces() {
        let meta1 = meta(vec![root(vec![ns(named("foo"), "https://foo.com")])]);
        let meta2 = meta(vec![root(vec![ns(named("foo"), "https://bar.com")])]);

        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.merge(b"<test/>", &meta1, &mut s).unwrap();
        let e = merger.merge(b"<test/>", &meta2, &mut s).unwrap_err();
        match e {
            XmlMergerError::UnexpectedParentNamespace { found, expected } => {
                assert_eq!(found, "https://bar.com");
                assert_eq!(expected, "https://foo.com");
            }
            e => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn merge_different_depths() {
        let meta1 = meta(vec![XmlStartElement::plain(Prefix::Default, "root")]);
        let meta2 = meta(vec![
            XmlStartElement::plain(Prefix::Default, "root"),
            XmlStartElement::plain(Prefix::Default, "member"),
        ]);

        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.merge(b"<test/>", &meta1, &mut s).unwrap();
        let e = merger.merge(b"<test/>", &meta2, &mut s).unwrap_err();
        assert!(matches!(
            e,
            XmlMergerError::ParentDepthMismatch {
                found: 2,
                expected: 1
            }
        ));
    }

    #[test]
    fn unknown_prefix() {
        let m = meta(vec![XmlStartElement::plain(named("nope"), "root")]);
        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        let e = merger.merge(b"<test/>", &m, &mut s).unwrap_err();
        assert!(matches!(e, XmlMergerError::UnknownNamespacePrefix(_)));
        assert!(s.is_empty());
    }

    /// Test if a parent chain that fails validation does not bind the
    /// merger, so a later valid chunk still opens the document
    #[test]
    fn rejected_first_chunk() {
        let bad = meta(vec![XmlStartElement::plain(named("nope"), "root")]);
        let good = meta(vec![XmlStartElement::plain(Prefix::Default, "root")]);

        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        let e = merger.merge(b"<test/>", &bad, &mut s).unwrap_err();
        assert!(matches!(e, XmlMergerError::UnknownNamespacePrefix(_)));
        assert_eq!(merger.merged_chunks(), 0);

        merger.merge(b"<test/>", &good, &mut s).unwrap();
        merger.finish(&mut s).unwrap();
        assert_eq!(
            from_utf8(&s).unwrap(),
            format!("{DECL}\n<root><test/></root>")
        );
    }

    /// Test if a default namespace bound by the written parents is reset for
    /// a chunk whose own parents leave it unbound
    #[test]
    fn unbind_default_namespace() {
        let gml = "http://www.opengis.net/gml";
        let fc = |namespaces| {
            vec![XmlStartElement::new(
                named("gml"),
                "FeatureCollection",
                namespaces,
                None,
                vec![],
            )]
        };
        let meta1 = meta(fc(vec![
            ns(named("gml"), gml),
            ns(Prefix::Default, "https://a.com"),
        ]));
        let meta2 = meta(fc(vec![ns(named("gml"), gml)]));

        let s = merge_all(&[("<a/>", meta1), ("<b/>", meta2)]);
        let expected = format!(
            "{DECL}\n{}{}{}",
            r#"<gml:FeatureCollection xmlns="https://a.com" xmlns:gml="http://www.opengis.net/gml">"#,
            r#"<a/><b xmlns=""></b>"#,
            r#"</gml:FeatureCollection>"#,
        );
        assert_eq!(s, expected);

        let mut reader = NsReader::from_str(&s);
        let mut resolved = Vec::new();
        loop {
            match reader.read_resolved_event().unwrap() {
                (ns, Event::Start(bs) | Event::Empty(bs)) => {
                    let name = from_utf8(bs.local_name().as_ref()).unwrap().to_string();
                    let ns = match ns {
                        ResolveResult::Bound(Namespace(uri)) => {
                            Some(from_utf8(uri).unwrap().to_string())
                        }
                        _ => None,
                    };
                    resolved.push((name, ns));
                }
                (_, Event::Eof) => break,
                _ => {}
            }
        }
        assert_eq!(
            resolved,
            vec![
                ("FeatureCollection".to_string(), Some(gml.to_string())),
                ("a".to_string(), Some("https://a.com".to_string())),
                ("b".to_string(), None),
            ]
        );
    }

    /// Test if content before the start tag of a chunk that needs additional
    /// namespaces is not copied into the document
    #[test]
    fn drop_leading_content() {
        let meta1 = meta(vec![root(vec![ns(named("foo"), "https://foo.com")])]);
        let meta2 = meta(vec![root(vec![
            ns(named("foo"), "https://foo.com"),
            ns(named("p"), "https://p.com"),
        ])]);

        let s = merge_all(&[
            ("<test/>", meta1),
            (r#"<?xml version="1.0"?><!-- c --><p:test/>"#, meta2),
        ]);
        let expected = format!(
            "{DECL}\n{}{}{}",
            r#"<foo:root xmlns:foo="https://foo.com">"#,
            r#"<test/><p:test xmlns:p="https://p.com"></p:test>"#,
            r#"</foo:root>"#,
        );
        assert_eq!(s, expected);
        assert_eq!(element_names(&s), vec!["foo:root", "test", "p:test"]);
    }

    /// Test if chunks with different schema location attributes can be merged
    #[test]
    fn schema_location() {
        let xsi = "http://www.w3.org/2001/XMLSchema-instance";
        let root_with_sl = |locations: Vec<(&str, &str)>| {
            XmlStartElement::new(
                Prefix::Default,
                "root",
                vec![ns(named("xsi"), xsi)],
                Some((
                    named("xsi"),
                    locations
                        .into_iter()
                        .map(|(a, b)| (a.to_string(), b.to_string()))
                        .collect(),
                )),
                vec![],
            )
        };

        let s = merge_all(&[
            (
                r#"<test chunk="1"/>"#,
                meta(vec![root_with_sl(vec![("a", "https://a.com")])]),
            ),
            (
                r#"<test chunk="2"/>"#,
                meta(vec![root_with_sl(vec![
                    ("a", "https://a.com"),
                    ("b", "https://b.com"),
                ])]),
            ),
            (
                r#"<test chunk="3" xsi:schemaLocation="b https://other-b.com"></test>"#,
                meta(vec![root_with_sl(vec![("b", "https://b.com")])]),
            ),
        ]);

        let expected = format!(
            "{DECL}\n{}{}{}{}{}",
            r#"<root xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xsi:schemaLocation="a https://a.com">"#,
            r#"<test chunk="1"/>"#,
            r#"<test chunk="2" xsi:schemaLocation="b https://b.com"></test>"#,
            r#"<test chunk="3" xsi:schemaLocation="b https://other-b.com"></test>"#,
            r#"</root>"#,
        );
        assert_eq!(s, expected);
    }

    #[test]
    fn chunks_without_parents() {
        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger
            .merge(b"<doc>1</doc>", &XmlChunkMeta::root(), &mut s)
            .unwrap();
        let e = merger
            .merge(b"<doc>2</doc>", &XmlChunkMeta::root(), &mut s)
            .unwrap_err();
        assert!(matches!(e, XmlMergerError::MultipleRootElements));
        merger.finish(&mut s).unwrap();
        assert_eq!(from_utf8(&s).unwrap(), "<doc>1</doc>");
    }

    #[test]
    fn init_without_chunks() {
        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger
            .init(&meta(vec![root(vec![ns(named("foo"), "https://foo.com")])]))
            .unwrap();
        merger.finish(&mut s).unwrap();

        // finishing twice does not write anything
        merger.finish(&mut s).unwrap();

        let s = from_utf8(&s).unwrap();
        assert_eq!(
            s,
            format!(
                "{DECL}\n{}",
                r#"<foo:root xmlns:foo="https://foo.com"></foo:root>"#
            )
        );
        assert_eq!(element_names(s), vec!["foo:root"]);
    }

    #[test]
    fn init_without_parents_or_chunks() {
        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.init(&XmlChunkMeta::root()).unwrap();
        merger.finish(&mut s).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn finish_without_init() {
        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.finish(&mut s).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn init_twice_or_after_merge() {
        let m = meta(vec![XmlStartElement::plain(Prefix::Default, "root")]);

        let mut merger = XmlMerger::new();
        merger.init(&m).unwrap();
        assert!(matches!(
            merger.init(&m),
            Err(XmlMergerError::AlreadyInitialized)
        ));

        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.merge(b"<a/>", &m, &mut s).unwrap();
        assert!(matches!(merger.init(&m), Err(XmlMergerError::InitAfterMerge)));
        assert_eq!(merger.merged_chunks(), 1);
    }

    #[test]
    fn init_determines_parents() {
        let init_meta = meta(vec![XmlStartElement::new(
            Prefix::Default,
            "root",
            vec![ns(named("a"), "https://a.com")],
            None,
            vec![],
        )]);
        let chunk_meta = meta(vec![XmlStartElement::new(
            Prefix::Default,
            "root",
            vec![
                ns(named("a"), "https://a.com"),
                ns(named("b"), "https://b.com"),
            ],
            None,
            vec![],
        )]);

        let mut s = Vec::new();
        let mut merger = XmlMerger::new();
        merger.init(&init_meta).unwrap();
        merger.merge(b"<b:x/>", &chunk_meta, &mut s).unwrap();
        merger.finish(&mut s).unwrap();

        let expected = format!(
            "{DECL}\n{}",
            r#"<root xmlns:a="https://a.com"><b:x xmlns:b="https://b.com"></b:x></root>"#
        );
        assert_eq!(from_utf8(&s).unwrap(), expected);
    }
}
