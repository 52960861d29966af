//! Diagnostics: source locations, error codes and the per-compilation sink.
//!
//! Parse/type errors are recorded and compilation keeps going while the IR is
//! structurally sound, so a single run can report several problems. The sink
//! latches the first error code; passes consult the latch and short-circuit
//! instead of crashing.

use std::fmt;

/// A position in the source text handed to the frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: u32,
    pub col: u32,
}

impl SourceLocation {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Error kinds surfaced by the compiler core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ErrorCode {
    #[error("parse error")]
    ParseError,
    #[error("type mismatch")]
    TypeMismatch,
    #[error("incompatible types")]
    IncompatibleTypes,
    #[error("invalid lvalue")]
    InvalidLValue,
    #[error("invalid semantic")]
    InvalidSemantic,
    #[error("missing semantic")]
    MissingSemantic,
    #[error("invalid register reservation")]
    InvalidReservation,
    #[error("overlapping register reservations")]
    OverlappingReservations,
    #[error("invalid writemask")]
    InvalidWriteMask,
    #[error("internal compiler error")]
    InternalCompilerError,
    #[error("not implemented")]
    Unimplemented,
    #[error("out of memory")]
    OutOfMemory,
    #[error("invalid shader")]
    InvalidShader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    /// Secondary message anchored at an earlier definition.
    Note,
    /// Unimplemented-feature marker; does not fail the compilation.
    Fixme,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
            Severity::Fixme => "fixme",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<ErrorCode>,
    pub loc: SourceLocation,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.loc, self.severity, self.message)
    }
}

/// Accumulates diagnostics for one compilation and latches the first error.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diags: Vec<Diagnostic>,
    result: Option<ErrorCode>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, loc: SourceLocation, code: ErrorCode, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "diag", %loc, ?code, %message, "error");
        if self.result.is_none() {
            self.result = Some(code);
        }
        self.diags.push(Diagnostic {
            severity: Severity::Error,
            code: Some(code),
            loc,
            message,
        });
    }

    pub fn warning(&mut self, loc: SourceLocation, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(target: "diag", %loc, %message, "warning");
        self.diags.push(Diagnostic {
            severity: Severity::Warning,
            code: None,
            loc,
            message,
        });
    }

    /// Attach a secondary message to the previous error, anchored at `loc`.
    pub fn note(&mut self, loc: SourceLocation, message: impl Into<String>) {
        self.diags.push(Diagnostic {
            severity: Severity::Note,
            code: None,
            loc,
            message: message.into(),
        });
    }

    /// Record an unimplemented-feature marker without failing the compile.
    pub fn fixme(&mut self, loc: SourceLocation, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(target: "diag", %loc, %message, "FIXME");
        self.diags.push(Diagnostic {
            severity: Severity::Fixme,
            code: Some(ErrorCode::Unimplemented),
            loc,
            message,
        });
    }

    /// The latched result code, if any error has been reported.
    pub fn result(&self) -> Option<ErrorCode> {
        self.result
    }

    pub fn failed(&self) -> bool {
        self.result.is_some()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diags
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_error_is_latched() {
        let mut sink = DiagnosticSink::new();
        assert!(!sink.failed());
        sink.warning(SourceLocation::new(1, 1), "harmless");
        assert!(!sink.failed());
        sink.error(SourceLocation::new(2, 1), ErrorCode::TypeMismatch, "bad");
        sink.error(
            SourceLocation::new(3, 1),
            ErrorCode::InvalidLValue,
            "worse",
        );
        assert_eq!(sink.result(), Some(ErrorCode::TypeMismatch));
        assert_eq!(sink.diagnostics().len(), 3);
    }

    #[test]
    fn fixme_does_not_fail_the_compile() {
        let mut sink = DiagnosticSink::new();
        sink.fixme(SourceLocation::default(), "double constants");
        assert!(!sink.failed());
        assert_eq!(sink.diagnostics()[0].code, Some(ErrorCode::Unimplemented));
    }
}
