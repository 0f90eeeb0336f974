//! Lowers a type-annotated syntax tree into the SSA IR of [`kiln_ssa`].
//!
//! The pipeline for every function item is: desugar into [`hir`], stamp,
//! consult the [`cache::LoweringCache`], build the CFG with mutable slots
//! ([`lower`]), promote the slots into SSA values ([`ssa`]) and verify the
//! result. [`emit::lower_module`] drives it for a whole module.

pub mod ast;
pub mod cache;
pub mod cli;
pub mod diag;
pub mod emit;
pub mod hir;
pub mod lower;
pub mod profile;
pub mod ssa;

pub use diag::{LowerDiagnostic, LowerDiagnosticKind, Reporter};
pub use emit::{lower_module, LowerOptions};

use kiln_sourcemap::{diag::Diagnostic, SourceSpan};
use kiln_ssa::verify::VerifyError;
use thiserror::Error;

// ---------------------------------------------------------------------------
// LowerError
// ---------------------------------------------------------------------------

/// A bug in the engine or an input the type checker should have rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InternalError {
    pub message: String,
    pub span: SourceSpan,
}

/// Errors that abort the lowering of the whole module.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LowerError {
    #[error("internal compiler error: {0}")]
    Internal(#[from] InternalError),
    #[error("internal compiler error: malformed IR for `{function}`: {source}")]
    Verify {
        function: String,
        #[source]
        source: VerifyError,
    },
    #[error("lowering aborted after {reported} diagnostics")]
    Aborted { reported: usize },
}

impl LowerError {
    /// Renders the error as a diagnostic. Engine bugs carry the internal
    /// compiler error marker.
    pub fn to_diagnostic(&self) -> Diagnostic {
        match self {
            LowerError::Internal(error) => {
                Diagnostic::bug(error.span, "lowering failed", error.message.clone())
            }
            LowerError::Verify { function, source } => Diagnostic::bug(
                SourceSpan::default(),
                format!("malformed IR for `{}`", function),
                source.to_string(),
            ),
            LowerError::Aborted { reported } => Diagnostic::error(
                SourceSpan::default(),
                "too many errors",
                format!("aborting after {} diagnostics", reported),
            ),
        }
    }
}

pub(crate) fn ice(span: SourceSpan, message: impl Into<String>) -> LowerError {
    LowerError::Internal(InternalError {
        message: message.into(),
        span,
    })
}
