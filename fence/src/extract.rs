use std::ops::Range;

use tracing::trace;

use crate::delimiter::DelimiterSpec;

/// One matched open/close pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan<'a> {
    /// Byte offset of the opening marker.
    pub start: usize,
    /// Byte offset just past the closing marker.
    pub end: usize,
    /// Text strictly between the markers.
    pub body: &'a str,
}

impl BlockSpan<'_> {
    /// Byte range of the whole block, markers included.
    pub fn span(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Byte range of `body` within the source.
    pub fn body_range(&self, delimiters: &DelimiterSpec) -> Range<usize> {
        let body_start = self.start + delimiters.open.len();
        body_start..body_start + self.body.len()
    }
}

/// Left-to-right, non-overlapping scan for delimiter pairs.
///
/// After an open marker the scanner seeks the next close marker; the text between
/// them becomes one span and scanning resumes right after the close marker.
/// An open marker with no close marker after it ends the scan without a span.
#[derive(Debug, Clone)]
pub struct Blocks<'a, 'd> {
    source: &'a str,
    delimiters: &'d DelimiterSpec,
    cursor: usize,
}

impl<'a, 'd> Blocks<'a, 'd> {
    pub fn new(source: &'a str, delimiters: &'d DelimiterSpec) -> Self {
        let cursor = if delimiters.is_usable() {
            0
        } else {
            source.len()
        };
        Blocks {
            source,
            delimiters,
            cursor,
        }
    }
}

impl<'a> Iterator for Blocks<'a, '_> {
    type Item = BlockSpan<'a>;

    fn next(&mut self) -> Option<BlockSpan<'a>> {
        let rest = &self.source[self.cursor..];
        let start = self.cursor + rest.find(&self.delimiters.open)?;
        let body_start = start + self.delimiters.open.len();

        let Some(body_len) = self.source[body_start..].find(&self.delimiters.close) else {
            trace!(offset = start, "dropping unmatched open marker");
            self.cursor = self.source.len();
            return None;
        };

        let body_end = body_start + body_len;
        let end = body_end + self.delimiters.close.len();
        self.cursor = end;

        Some(BlockSpan {
            start,
            end,
            body: &self.source[body_start..body_end],
        })
    }
}

/// Collect every block span in `source`, in document order.
pub fn extract<'a>(source: &'a str, delimiters: &DelimiterSpec) -> Vec<BlockSpan<'a>> {
    Blocks::new(source, delimiters).collect()
}
