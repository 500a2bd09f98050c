pub mod diagnostics;

use diagnostics::{DiagnosticEmitter, IntoDiagnostic, Severity};

/// Marker returned when at least one error-severity diagnostic was emitted.
#[derive(Debug, Clone, Copy)]
pub struct ErrorsEmitted;

/// State shared across the compilation of one script.
pub struct Session<D: DiagnosticEmitter> {
    pub diagnostics: D,
}

impl<D: DiagnosticEmitter> Session<D> {
    pub fn new(diagnostics: D) -> Self {
        Self { diagnostics }
    }

    pub fn report(&mut self, diagnostic: impl IntoDiagnostic) -> Result<(), ErrorsEmitted> {
        let diagnostic = diagnostic.into_diagnostic();
        let severity = diagnostic.severity;

        self.diagnostics.emit_diagnostic(diagnostic);

        if severity < Severity::Error {
            Ok(())
        } else {
            Err(ErrorsEmitted)
        }
    }

    pub fn report_all<I>(&mut self, diagnostics: I) -> Result<(), ErrorsEmitted>
    where
        I: IntoIterator,
        I::Item: IntoDiagnostic,
    {
        let mut had_error = false;

        for diagnostic in diagnostics {
            let diagnostic = diagnostic.into_diagnostic();
            had_error |= diagnostic.severity >= Severity::Error;
            self.diagnostics.emit_diagnostic(diagnostic);
        }

        if !had_error {
            Ok(())
        } else {
            Err(ErrorsEmitted)
        }
    }
}
