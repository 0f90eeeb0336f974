use kiln_sourcemap::{diag::Diagnostic, SourceSpan};

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Sink for recoverable lowering errors.
///
/// The engine keeps going after reporting: the offending construct is
/// replaced by an `undef` value or an `unreachable` terminator.
pub trait Reporter {
    fn report(&mut self, kind: LowerDiagnosticKind, span: SourceSpan, message: &str);
}

impl Reporter for Vec<LowerDiagnostic> {
    fn report(&mut self, kind: LowerDiagnosticKind, span: SourceSpan, message: &str) {
        self.push(LowerDiagnostic {
            kind,
            span,
            message: message.to_string(),
        });
    }
}

/// Discards everything.
impl Reporter for () {
    fn report(&mut self, _: LowerDiagnosticKind, _: SourceSpan, _: &str) {}
}

// ---------------------------------------------------------------------------
// LowerDiagnostic
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LowerDiagnostic {
    pub kind: LowerDiagnosticKind,
    pub span: SourceSpan,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LowerDiagnosticKind {
    BreakOutsideLoop,
    ContinueOutsideLoop,
    UnboundIdentifier,
    MissingReturn,
}

impl LowerDiagnosticKind {
    pub fn title(&self) -> &'static str {
        match self {
            LowerDiagnosticKind::BreakOutsideLoop => "break outside of a loop",
            LowerDiagnosticKind::ContinueOutsideLoop => "continue outside of a loop",
            LowerDiagnosticKind::UnboundIdentifier => "unbound identifier",
            LowerDiagnosticKind::MissingReturn => "missing return value",
        }
    }
}

impl From<LowerDiagnostic> for Diagnostic {
    fn from(diagnostic: LowerDiagnostic) -> Self {
        Diagnostic::error(
            diagnostic.span,
            diagnostic.kind.title(),
            diagnostic.message,
        )
    }
}
