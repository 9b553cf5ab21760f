//! Source spans and location utilities.
//!
//! A [`Span`] ties a byte range to its [`SourceFile`]. Line and column numbers
//! (1-based) are derived on demand; byte ranges are what the compiler stores
//! and compares. [`SpanInfo`] is the same data kept by diagnostics and debug
//! tables after the surrounding structures are gone.

use std::ops::Range;

use crate::file::SourceFile;

/// A region of source code in a specific document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Span {
    /// The source file this span belongs to
    pub file: SourceFile,
    /// The byte range in the source file
    pub position: Range<usize>,
}

impl Span {
    pub fn new(file: SourceFile, position: Range<usize>) -> Self {
        Self { file, position }
    }

    /// The exact source text covered by this span.
    pub fn text(&self) -> &str {
        &self.file.code()[self.position.clone()]
    }

    /// 1-based line and column of the span start.
    pub fn line_column(&self) -> (usize, usize) {
        let mut line = 1;
        let mut column = 1;
        for (offset, ch) in self.file.code().char_indices() {
            if offset >= self.position.start {
                break;
            }
            if ch == '\n' {
                line += 1;
                column = 1;
            } else {
                column += 1;
            }
        }
        (line, column)
    }

    /// A span covering both `self` and `other`. Both must belong to the same
    /// document.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            file: self.file.clone(),
            position: self.position.start.min(other.position.start)
                ..self.position.end.max(other.position.end),
        }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.text())
    }
}

/// Trait for converting spans to byte ranges.
pub trait ToRange {
    fn to_range(&self) -> Range<usize>;
}

impl ToRange for Span {
    fn to_range(&self) -> Range<usize> {
        self.position.clone()
    }
}

/// Span information kept for error reporting and debug tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanInfo {
    pub position: Range<usize>,
    pub file: SourceFile,
}

impl SpanInfo {
    pub fn new(position: Range<usize>, file: SourceFile) -> Self {
        Self { position, file }
    }

    /// Human-readable `name:line:column` origin for message lines.
    pub fn origin(&self) -> String {
        let span = Span::new(self.file.clone(), self.position.clone());
        let (line, column) = span.line_column();
        format!("{}:{}:{}", self.file.name(), line, column)
    }
}

impl From<Span> for SpanInfo {
    fn from(span: Span) -> Self {
        Self {
            position: span.position.clone(),
            file: span.file,
        }
    }
}

impl From<&Span> for SpanInfo {
    fn from(span: &Span) -> Self {
        Self {
            position: span.position.clone(),
            file: span.file.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> SourceFile {
        SourceFile::new(vec!["test".into()], "fun main() {\n    return;\n}".to_string())
    }

    #[test]
    fn span_text_matches_source_slice() {
        let span = Span::new(file(), 4..8);
        assert_eq!(span.text(), "main");
    }

    #[test]
    fn line_column_is_one_based() {
        let span = Span::new(file(), 17..23);
        assert_eq!(span.text(), "return");
        assert_eq!(span.line_column(), (2, 5));
    }

    #[test]
    fn merge_covers_both_spans() {
        let left = Span::new(file(), 4..8);
        let right = Span::new(file(), 17..23);
        assert_eq!(left.merge(&right).position, 4..23);
    }
}
