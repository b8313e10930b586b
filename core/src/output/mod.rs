use std::io::Write;

pub mod geo_json;
pub mod multi;
pub mod xml;

pub use self::multi::{MergeError, MultiMerger};

/// Merges chunks into a single document. A merge session is one call to
/// [`init`](Merger::init) (optional), any number of calls to
/// [`merge`](Merger::merge) and a final call to [`finish`](Merger::finish).
pub trait Merger<M> {
    type Error;

    /// Register the structure required by the chunks to merge. Must be
    /// called at most once and before the first chunk is merged.
    fn init(&mut self, meta: &M) -> Result<(), Self::Error>;

    /// Merge a chunk with the given metadata object and write the result to
    /// `out`. Nothing is written if the chunk cannot be merged.
    fn merge<W: Write>(&mut self, chunk: &[u8], meta: &M, out: &mut W)
        -> Result<(), Self::Error>;

    /// Finish merging and close the structure opened by the first chunk.
    /// If nothing was merged, the structure registered with `init` is
    /// written on its own. A structure that is empty itself (e.g. an XML
    /// session without parent elements) produces no output in that case.
    fn finish<W: Write>(&mut self, out: &mut W) -> Result<(), Self::Error>;
}
