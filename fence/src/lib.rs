pub mod decode;
pub mod delimiter;
pub mod error;
pub mod extract;

pub use decode::{DecodedBlock, Selection, decode};
pub use delimiter::DelimiterSpec;
pub use error::DecodeError;
pub use extract::{BlockSpan, Blocks, extract};

/// A scanned document: the source text plus every block span found in it.
#[derive(Debug, Clone)]
pub struct Document<'a> {
    pub source: &'a str,
    /// Blocks in order of appearance.
    pub blocks: Vec<BlockSpan<'a>>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl<'a> Document<'a> {
    pub fn scan(source: &'a str, source_id: usize, delimiters: &DelimiterSpec) -> Self {
        Document {
            source,
            blocks: extract(source, delimiters),
            source_id,
        }
    }

    /// Convert a byte offset in the source to a 1-based line number.
    pub fn line_of(&self, offset: usize) -> usize {
        self.source.as_bytes()[..offset.min(self.source.len())]
            .iter()
            .filter(|&&b| b == b'\n')
            .count()
            + 1
    }
}
