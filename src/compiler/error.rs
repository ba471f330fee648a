use std::fmt;

use crate::common::span::Span;

/// Which stage raised a [`Syntax`] error. Each stage aborts the ones after
/// it, per the pipeline described in the crate's top-level docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntaxKind {
    Lex,
    Parse,
    Compile,
}

impl SyntaxKind {
    fn tag(&self) -> &'static str {
        match self {
            SyntaxKind::Lex => "lex-error",
            SyntaxKind::Parse => "parse-error",
            SyntaxKind::Compile => "compile-error",
        }
    }
}

/// A static error: one found during lexing, parsing, or compilation, rather
/// than at runtime (see [`crate::vm::trace::Trace`] for those).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    pub kind: SyntaxKind,
    pub span: Span,
    pub message: String,
}

impl Syntax {
    pub fn new(kind: SyntaxKind, span: Span, message: impl Into<String>) -> Syntax {
        Syntax { kind, span, message: message.into() }
    }

    pub fn lex(span: Span, message: impl Into<String>) -> Syntax {
        Syntax::new(SyntaxKind::Lex, span, message)
    }

    pub fn parse(span: Span, message: impl Into<String>) -> Syntax {
        Syntax::new(SyntaxKind::Parse, span, message)
    }

    pub fn compile(span: Span, message: impl Into<String>) -> Syntax {
        Syntax::new(SyntaxKind::Compile, span, message)
    }
}

impl fmt::Display for Syntax {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.span.is_empty() {
            return writeln!(f, "{}: {}", self.kind.tag(), self.message);
        }
        let (line, col) = self.span.start_line_col();
        writeln!(
            f,
            "{}: {}:{}:{}: {}",
            self.kind.tag(),
            self.span.path().display(),
            line,
            col,
            self.message,
        )?;
        write!(f, "{}", self.span)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    #[test]
    fn renders_kind_location_and_caret() {
        let source = Source::source("(+ 1)");
        let span = Span::new(&source, 3, 1);
        let error = Syntax::compile(span, "Missing operands");

        let rendered = format!("{}", error);
        assert!(rendered.starts_with("compile-error: ./source:1:4: Missing operands\n"));
        assert!(rendered.contains("(+ 1)"));
        assert!(rendered.trim_end().ends_with('^'));
    }
}
