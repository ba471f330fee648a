use std::fmt;
use std::rc::Rc;

use crate::common::source::Source;

/// A `Span` refers to a byte range of a `Source`, the way a `&str` would,
/// but carrying a reference to the `Source` it came from rather than a
/// reference to a string slice, so it survives being stored in compile-time
/// datastructures that outlive the borrow a `&str` would need.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Span {
    source: Option<Rc<Source>>,
    offset: usize,
    length: usize,
}

impl Span {
    pub fn new(source: &Rc<Source>, offset: usize, length: usize) -> Span {
        Span { source: Some(Rc::clone(source)), offset, length }
    }

    /// A `Span` pointing at a single byte, used for EOF and one-character
    /// tokens.
    pub fn point(source: &Rc<Source>, offset: usize) -> Span {
        Span { source: Some(Rc::clone(source)), offset, length: 1 }
    }

    /// An empty span, with no source. Combining an empty span with any other
    /// just yields the other.
    pub fn empty() -> Span {
        Span { source: None, offset: 0, length: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_none()
    }

    /// Spans the union of two spans from the same source.
    pub fn combine(a: &Span, b: &Span) -> Span {
        if a.is_empty() {
            return b.clone();
        }
        if b.is_empty() {
            return a.clone();
        }
        if a.source != b.source {
            panic!("Can't combine two Spans with separate sources");
        }

        let offset = a.offset.min(b.offset);
        let end = (a.offset + a.length).max(b.offset + b.length);
        Span::new(a.source.as_ref().unwrap(), offset, end - offset)
    }

    pub fn contents(&self) -> &str {
        if self.is_empty() {
            panic!("An empty span does not have any contents");
        }
        let source = self.source.as_ref().unwrap();
        &source.contents[self.offset..self.offset + self.length]
    }

    /// 1-indexed (line, column) of the start of this span.
    pub fn start_line_col(&self) -> (usize, usize) {
        if self.is_empty() {
            panic!("An empty span has no location");
        }
        let source = self.source.as_ref().unwrap();
        let mut line = 1;
        let mut col = 1;
        for ch in source.contents[..self.offset].chars() {
            if ch == '\n' {
                line += 1;
                col = 1;
            } else {
                col += 1;
            }
        }
        (line, col)
    }

    /// The full text of the line this span starts on, for error rendering.
    pub fn line_text(&self) -> &str {
        if self.is_empty() {
            panic!("An empty span has no location");
        }
        let source = self.source.as_ref().unwrap();
        let start = source.contents[..self.offset].rfind('\n').map_or(0, |i| i + 1);
        let end = source.contents[self.offset..]
            .find('\n')
            .map_or(source.contents.len(), |i| self.offset + i);
        &source.contents[start..end]
    }

    pub fn path(&self) -> &std::path::Path {
        if self.is_empty() {
            panic!("An empty span has no location");
        }
        &self.source.as_ref().unwrap().path
    }

    /// How many carets this span should render underneath its line, clamped
    /// to the remainder of that line.
    fn caret_width(&self) -> usize {
        let line_len = self.line_text().len();
        let (_, col) = self.start_line_col();
        self.length.max(1).min(line_len.saturating_sub(col - 1).max(1))
    }
}

impl fmt::Display for Span {
    /// Renders the line a span points to, with a caret underneath the
    /// offending column:
    /// ```plain
    /// 12 | (+ a b c)
    ///         ^
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        let (line, col) = self.start_line_col();
        let line_text = self.line_text();
        let prefix = format!("{} | ", line);
        writeln!(f, "{}{}", prefix, line_text)?;
        write!(
            f,
            "{}{}",
            " ".repeat(prefix.len() + col - 1),
            "^".repeat(self.caret_width()),
        )
    }
}

/// Pairs any value with the `Span` it was parsed/lexed from.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub fn new(item: T, span: Span) -> Spanned<T> {
        Spanned { item, span }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn combination() {
        let source = Source::source("heck, that's awesome");
        let a = Span::new(&source, 0, 5);
        let b = Span::new(&source, 11, 2);
        assert_eq!(Span::combine(&a, &b), Span::new(&source, 0, 13));
    }

    #[test]
    fn start_line_col_tracks_newlines() {
        let source = Source::source("first\nsecond\nthird");
        let span = Span::new(&source, 13, 1);
        assert_eq!(span.start_line_col(), (3, 1));
    }

    #[test]
    fn line_text_isolates_the_offending_line() {
        let source = Source::source("(let a 10)\n(+ a b)\n");
        let span = Span::new(&source, 14, 1);
        assert_eq!(span.line_text(), "(+ a b)");
    }
}
