use std::fmt;

use crate::common::span::Span;

/// A runtime error. `spans` holds the call stack active at the point of
/// failure, innermost (the instruction that actually faulted) first and
/// each enclosing call site appended as the error unwinds through
/// [`crate::vm::vm::Vm::invoke`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trace {
    pub message: String,
    pub spans: Vec<Span>,
}

impl Trace {
    /// A `Trace` with no location info, for contexts with no `Vm` to ask for
    /// one (unit tests mostly). Prefer [`crate::vm::vm::Vm::error`] when a
    /// `Vm` is in scope.
    pub fn new(message: impl Into<String>) -> Trace {
        Trace { message: message.into(), spans: Vec::new() }
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.spans.first() {
            None => write!(f, "runtime-error: {}", self.message),
            Some(span) if span.is_empty() => write!(f, "runtime-error: {}", self.message),
            Some(span) => {
                let (line, col) = span.start_line_col();
                writeln!(
                    f,
                    "runtime-error: {}:{}:{}: {}",
                    span.path().display(),
                    line,
                    col,
                    self.message,
                )?;
                write!(f, "{}", span)?;
                for frame in self.spans.iter().skip(1).filter(|s| !s.is_empty()) {
                    writeln!(f)?;
                    writeln!(f, "called from:")?;
                    write!(f, "{}", frame)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for Trace {}

#[cfg(test)]
mod test {
    use super::*;
    use crate::common::source::Source;

    #[test]
    fn no_span_falls_back_to_a_bare_message() {
        let trace = Trace::new("assertion failed");
        assert_eq!(trace.to_string(), "runtime-error: assertion failed");
    }

    #[test]
    fn a_single_span_reports_its_location() {
        let source = Source::source("(/ 1 0)");
        let span = Span::new(&source, 0, 7);
        let trace = Trace { message: "Division by zero".to_string(), spans: vec![span] };
        let rendered = trace.to_string();
        assert!(rendered.starts_with("runtime-error:"));
        assert!(rendered.contains("Division by zero"));
        assert!(rendered.contains("(/ 1 0)"));
    }

    #[test]
    fn nested_call_sites_are_appended_as_extra_frames() {
        let source = Source::source("(define f (x) (/ x 0)) (f 1)");
        let fault = Span::new(&source, 15, 6);
        let call_site = Span::new(&source, 23, 5);
        let trace =
            Trace { message: "Division by zero".to_string(), spans: vec![fault, call_site] };
        let rendered = trace.to_string();
        assert_eq!(rendered.matches("called from:").count(), 1);
        assert!(rendered.find("Division by zero").unwrap() < rendered.find("called from:").unwrap());
    }
}
