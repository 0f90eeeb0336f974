use crate::{SourceLocation, SourceMap, SourceSpan};

use std::{fmt::Display, io::Write};

// ---------------------------------------------------------------------------
// Support Functions
// ---------------------------------------------------------------------------

/// Reports a batch of diagnostics from one source file to a buffer.
///
/// Diagnostics are rendered in span order regardless of the order they were
/// collected in.
pub fn report_batch(
    file: &SourceMap,
    buffer: &mut impl Write,
    diagnostics: &[impl Into<Diagnostic> + Clone],
) -> std::io::Result<()> {
    let mut diagnostics: Vec<Diagnostic> = diagnostics.iter().cloned().map(Into::into).collect();
    diagnostics.sort_by_key(|d| d.span);
    diagnostics.iter().try_for_each(|d| d.report(file, buffer))
}

// ---------------------------------------------------------------------------
// Diagnostic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    title: String,
    message: String,
    span: SourceSpan,
    level: DiagnosticLevel,
}

impl Diagnostic {
    fn new(
        span: SourceSpan,
        title: impl Into<String>,
        message: impl Into<String>,
        level: DiagnosticLevel,
    ) -> Self {
        Self {
            span,
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn note(span: SourceSpan, title: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic::new(span, title, message, DiagnosticLevel::Note)
    }

    pub fn error(span: SourceSpan, title: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic::new(span, title, message, DiagnosticLevel::Error)
    }

    pub fn warning(span: SourceSpan, title: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic::new(span, title, message, DiagnosticLevel::Warning)
    }

    /// A compiler bug. Rendered with an `internal compiler error` marker.
    pub fn bug(span: SourceSpan, title: impl Into<String>, message: impl Into<String>) -> Self {
        Diagnostic::new(span, title, message, DiagnosticLevel::Bug)
    }

    pub fn span(&self) -> SourceSpan {
        self.span
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_error(&self) -> bool {
        matches!(self.level, DiagnosticLevel::Error | DiagnosticLevel::Bug)
    }

    pub fn report(&self, file: &SourceMap, buffer: &mut impl Write) -> std::io::Result<()> {
        match file.locate(self.span) {
            Some(location) => self.report_located(file, location, buffer),
            None => writeln!(
                buffer,
                "{}: {}\n --> {}\n {}",
                self.level,
                self.title,
                file.path().display(),
                self.message
            ),
        }
    }

    fn report_located(
        &self,
        file: &SourceMap,
        location: SourceLocation,
        buffer: &mut impl Write,
    ) -> std::io::Result<()> {
        let line_text = location.line_text.trim_end_matches(['\n', '\r']);
        let gutter = " ".repeat(location.line.checked_ilog10().unwrap_or(0) as usize + 1);
        let column = location.column as usize;
        let carets = self
            .span
            .len()
            .min(line_text.chars().count().saturating_sub(column - 1))
            .max(1);

        writeln!(buffer, "{}: {}", self.level, self.title)?;
        writeln!(
            buffer,
            "{}--> {}:{}:{}",
            gutter,
            file.path().display(),
            location.line,
            location.column
        )?;
        writeln!(buffer, "{} |", gutter)?;
        writeln!(buffer, "{} | {}", location.line, line_text)?;
        writeln!(
            buffer,
            "{} | {}{} {}",
            gutter,
            " ".repeat(column - 1),
            "^".repeat(carets),
            self.message
        )
    }
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} at {}: {}",
            self.level, self.title, self.span, self.message
        )
    }
}

// ---------------------------------------------------------------------------
// DiagnosticLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiagnosticLevel {
    Bug,
    Note,
    Error,
    Warning,
}

impl Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::Bug => write!(f, "error: internal compiler error"),
            Self::Note => write!(f, "note"),
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(file: &SourceMap, diagnostic: &Diagnostic) -> String {
        let mut buffer = Vec::new();
        diagnostic.report(file, &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn renders_caret_under_span() {
        let file = SourceMap::from_source("main.kn", "fn f() {\n    break;\n}\n");
        let span = SourceSpan::new(13..18).unwrap();
        let diagnostic = Diagnostic::error(span, "break outside of a loop", "not inside a loop");

        let text = render(&file, &diagnostic);
        assert_eq!(
            text,
            "error: break outside of a loop\n \
             --> main.kn:2:5\n  \
             |\n\
             2 |     break;\n  \
             |     ^^^^^ not inside a loop\n"
        );
    }

    #[test]
    fn bug_level_is_marked() {
        let file = SourceMap::from_source("main.kn", "");
        let diagnostic = Diagnostic::bug(SourceSpan::default(), "phi arity", "bb2");
        assert!(diagnostic.is_error());
        assert!(render(&file, &diagnostic).starts_with("error: internal compiler error: phi arity"));
    }

    #[test]
    fn batch_is_sorted_by_span() {
        let file = SourceMap::from_source("main.kn", "a\nb\n");
        let second = Diagnostic::warning(SourceSpan::new(2..3).unwrap(), "second", "");
        let first = Diagnostic::note(SourceSpan::new(0..1).unwrap(), "first", "");

        let mut buffer = Vec::new();
        report_batch(&file, &mut buffer, &[second, first]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.find("first").unwrap() < text.find("second").unwrap());
    }
}
