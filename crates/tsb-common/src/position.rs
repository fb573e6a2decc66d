//! Line/column mapping from byte offsets.
//!
//! Diagnostics report 1-based line and column numbers; internally everything
//! is byte offsets. A `LineMap` is built once per source file.

use crate::span::Span;

/// A 1-based line/column pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

/// Maps byte offsets in a source file to line/column locations.
#[derive(Clone, Debug)]
pub struct LineMap {
    /// Byte offset of the start of each line. `line_starts[0] == 0`.
    line_starts: Vec<u32>,
}

impl LineMap {
    pub fn new(source: &str) -> Self {
        let mut line_starts = vec![0u32];
        for (i, b) in source.bytes().enumerate() {
            if b == b'\n' {
                line_starts.push(i as u32 + 1);
            }
        }
        LineMap { line_starts }
    }

    /// The location of a byte offset. Offsets past the end map to the last line.
    pub fn location(&self, offset: u32) -> Location {
        let line_idx = match self.line_starts.binary_search(&offset) {
            Ok(i) => i,
            Err(i) => i - 1,
        };
        Location {
            line: line_idx as u32 + 1,
            column: offset - self.line_starts[line_idx] + 1,
        }
    }

    pub fn location_of(&self, span: Span) -> Location {
        self.location(span.start)
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_line_is_one_based() {
        let map = LineMap::new("abc\ndef");
        assert_eq!(map.location(0), Location { line: 1, column: 1 });
        assert_eq!(map.location(2), Location { line: 1, column: 3 });
    }

    #[test]
    fn offsets_after_newline_land_on_next_line() {
        let map = LineMap::new("abc\ndef\n");
        assert_eq!(map.location(4), Location { line: 2, column: 1 });
        assert_eq!(map.location(6), Location { line: 2, column: 3 });
        assert_eq!(map.line_count(), 3);
    }
}
