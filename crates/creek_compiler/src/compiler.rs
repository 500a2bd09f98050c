//! The construct-at-a-time pipeline: each top-level construct is fully
//! lexed, parsed, generated, and (for bare expressions) executed before the
//! next one is read.

use creek_backend::jit::ExecValue;
use creek_backend::{BackendError, Codegen};
use creek_frontend::token::{Keyword, TokenKind};
use creek_frontend::{ParseError, Parser};
use creek_ir::Type;
use creek_session::diagnostics::{Diagnostic, DiagnosticEmitter, IntoDiagnostic, Severity};
use creek_session::Session;

/// Failures that stop the whole run, as opposed to diagnostics that only
/// skip a single construct.
#[derive(thiserror::Error, Debug)]
pub enum CompileError {
    #[error("invalid token on line {0}")]
    InvalidToken(u32),

    #[error("script must define a function of the form `{signature}`")]
    MissingRequired { signature: &'static str },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("errors while compiling")]
    HadErrors,
}

pub type CompileResult<T> = Result<T, CompileError>;

pub struct Compiler<D: DiagnosticEmitter> {
    pub session: Session<D>,
    /// Values produced by executed top-level expressions, oldest first.
    pub values: Vec<ExecValue>,

    codegen: Codegen,
    execute: bool,
    had_errors: bool,
}

impl<D: DiagnosticEmitter> Compiler<D> {
    /// `execute` controls whether bare top-level expressions are invoked
    /// after they compile.
    pub fn new(diagnostics: D, execute: bool) -> CompileResult<Self> {
        Ok(Self {
            session: Session::new(diagnostics),
            values: vec![],
            codegen: Codegen::new()?,
            execute,
            had_errors: false,
        })
    }

    /// Drives the whole script, then checks the entry-point contract.
    pub fn compile(&mut self, source: &str) -> CompileResult<()> {
        let mut parser = Parser::new(source);

        loop {
            let token = parser.peek();
            match token.kind {
                TokenKind::Eof => break,

                TokenKind::Invalid => return Err(CompileError::InvalidToken(token.line)),

                // ignore top-level semicolons
                TokenKind::Punct(';') => parser.bump(),

                // a bare `}` would parse as an empty-block tail without
                // consuming anything, so reject it here to keep moving
                TokenKind::Punct('}') => {
                    self.report(
                        Diagnostic::error("expected a top-level construct, found `}`")
                            .with_line(token.line),
                    );
                    parser.bump();
                }

                TokenKind::Keyword(Keyword::Extern) => self.handle_extern(&mut parser),

                TokenKind::Keyword(keyword) if keyword.ty().is_some() => {
                    self.handle_definition(&mut parser);
                }

                _ => self.handle_top_level_expr(&mut parser),
            }
        }

        self.check_required("init", Type::Bool, "bool init()")?;
        self.check_required("exit", Type::Void, "void exit()")?;

        if self.had_errors {
            return Err(CompileError::HadErrors);
        }
        Ok(())
    }

    fn handle_definition(&mut self, parser: &mut Parser) {
        match parser.parse_definition() {
            Ok(def) => {
                if let Err(err) = self.codegen.gen_definition(&def) {
                    self.report(err.into_diagnostic());
                }
                self.flush_codegen_diagnostics();
            }
            Err(err) => self.recover(parser, err),
        }
    }

    fn handle_extern(&mut self, parser: &mut Parser) {
        match parser.parse_extern() {
            Ok(proto) => {
                if let Err(err) = self.codegen.gen_extern(&proto) {
                    self.report(err.into_diagnostic());
                }
            }
            Err(err) => self.recover(parser, err),
        }
    }

    fn handle_top_level_expr(&mut self, parser: &mut Parser) {
        let def = match parser.parse_top_level_expr() {
            Ok(def) => def,
            Err(err) => return self.recover(parser, err),
        };

        match self.codegen.gen_top_level(&def) {
            Ok((id, ret)) => {
                self.flush_codegen_diagnostics();

                if self.execute {
                    match self.codegen.jit_mut().invoke(id, ret) {
                        Ok(value) => {
                            self.report(Diagnostic::note(format!("evaluated to {value}")));
                            self.values.push(value);
                        }
                        Err(err) => self.report(Diagnostic::error(err.to_string())),
                    }
                }
            }
            Err(err) => {
                self.flush_codegen_diagnostics();
                self.report(err.into_diagnostic());
            }
        }
    }

    /// Reports a syntax error, then skips one token so scanning can resume
    /// at the next construct.
    fn recover(&mut self, parser: &mut Parser, err: ParseError) {
        self.report(err.into_diagnostic());
        parser.bump();
    }

    fn check_required(&self, name: &str, ret: Type, signature: &'static str) -> CompileResult<()> {
        match self.codegen.jit().resolve(name) {
            Some(entry) if entry.proto.ret == ret && entry.proto.params.is_empty() => Ok(()),
            _ => Err(CompileError::MissingRequired { signature }),
        }
    }

    fn flush_codegen_diagnostics(&mut self) {
        let diagnostics = self.codegen.take_diagnostics();
        self.had_errors |= diagnostics
            .iter()
            .any(|d| d.severity >= Severity::Error);
        let _ = self.session.report_all(diagnostics);
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        self.had_errors |= diagnostic.severity >= Severity::Error;
        let _ = self.session.report(diagnostic);
    }
}
