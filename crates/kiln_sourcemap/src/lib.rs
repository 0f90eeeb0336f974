pub mod diag;

use std::{
    io,
    ops::Range,
    path::{Path, PathBuf},
};

// ---------------------------------------------------------------------------
// SourceSpan
// ---------------------------------------------------------------------------

/// A half-open byte range `[start, end)` into a source file.
#[derive(Debug, Default, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct SourceSpan {
    start: u32,
    end: u32,
}

impl SourceSpan {
    /// Returns `None` if `start > end`.
    pub fn new(range: impl Into<Range<u32>>) -> Option<Self> {
        let Range { start, end } = range.into();
        if start > end {
            None
        } else {
            Some(Self { start, end })
        }
    }

    /// An empty span at `pos`.
    pub fn point(pos: u32) -> Self {
        Self {
            start: pos,
            end: pos,
        }
    }

    #[inline]
    pub fn start(&self) -> u32 {
        self.start
    }

    #[inline]
    pub fn end(&self) -> u32 {
        self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn merge(&self, other: &Self) -> Self {
        Self {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

// ---------------------------------------------------------------------------
// SourceLocation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub line: u32,
    pub column: u32,
    pub line_text: &'a str,
}

impl Default for SourceLocation<'_> {
    fn default() -> Self {
        Self {
            line: 1,
            column: 1,
            line_text: "",
        }
    }
}

// ---------------------------------------------------------------------------
// SourceMap
// ---------------------------------------------------------------------------

/// The text of one source file plus its line-start table.
#[derive(Debug)]
pub struct SourceMap {
    data: String,
    path: PathBuf,
    lines: Vec<u32>,
}

impl SourceMap {
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Ok(Self::from_source(path, data))
    }

    pub fn from_source(path: impl AsRef<Path>, data: impl Into<String>) -> Self {
        let data = data.into();
        let mut lines = Vec::with_capacity(data.len() / 80 + 1);
        lines.push(0);
        lines.extend(
            data.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i as u32 + 1),
        );
        Self {
            data,
            lines,
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A span covering the whole file.
    pub fn full_span(&self) -> SourceSpan {
        SourceSpan {
            start: 0,
            end: self.data.len() as u32,
        }
    }

    /// Resolves the first line of `span` to a line/column pair.
    ///
    /// Returns `None` when the span lies outside the file.
    pub fn locate(&self, span: SourceSpan) -> Option<SourceLocation> {
        if span.end as usize > self.data.len() {
            return None;
        }
        let line_index = self
            .lines
            .binary_search(&span.start)
            .unwrap_or_else(|x| x - 1);
        let line_start = self.lines[line_index] as usize;
        let line_end = self
            .lines
            .get(line_index + 1)
            .map(|end| *end as usize)
            .unwrap_or(self.data.len());
        let column = self.data.get(line_start..span.start as usize)?.chars().count() as u32 + 1;
        Some(SourceLocation {
            line: line_index as u32 + 1,
            column,
            line_text: self.data.get(line_start..line_end)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::write;
    use tempfile::NamedTempFile;

    #[test]
    fn span_rejects_inverted_ranges() {
        assert!(SourceSpan::new(10..5).is_none());
        let span = SourceSpan::new(5..10).unwrap();
        assert_eq!(span.len(), 5);
        assert_eq!(span.merge(&SourceSpan::point(2)), SourceSpan::new(2..10).unwrap());
    }

    #[test]
    fn locate_reads_lines_from_disk() {
        let temp = NamedTempFile::new().unwrap();
        write(temp.path(), "fn a() {}\nfn b() {}\n").unwrap();

        let file = SourceMap::new(temp.path()).unwrap();

        let location = file.locate(SourceSpan::new(3..4).unwrap()).unwrap();
        assert_eq!((location.line, location.column), (1, 4));
        assert_eq!(location.line_text, "fn a() {}\n");

        let location = file.locate(SourceSpan::new(13..14).unwrap()).unwrap();
        assert_eq!((location.line, location.column), (2, 4));
        assert_eq!(location.line_text, "fn b() {}\n");
    }

    #[test]
    fn locate_out_of_bounds() {
        let file = SourceMap::from_source("mem.kn", "x");
        assert_eq!(file.locate(SourceSpan::new(0..30).unwrap()), None);
        assert_eq!(file.full_span().len(), 1);
    }
}
