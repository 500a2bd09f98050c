
mod expr;

use creek_ir::ast::{FunctionDef, Param, Prototype};
use creek_ir::Type;
use creek_session::diagnostics::{Diagnostic, IntoDiagnostic};

use crate::lexer::TokenStream;
use crate::token::{Keyword, Token, TokenKind};

/// A syntax error, tagged with the line it was noticed on. The caller is
/// responsible for skipping at least one token before rescanning.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ParseError {
    pub message: String,
    pub line: u32,
}

impl IntoDiagnostic for ParseError {
    fn into_diagnostic(self) -> Diagnostic {
        Diagnostic::error(self.message).with_line(self.line)
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

pub struct Parser<'src> {
    tokens: TokenStream<'src>,
}

impl<'src> Parser<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            tokens: TokenStream::new(source),
        }
    }

    /// The token the next parse step would start from; the driver dispatches
    /// on this.
    pub fn peek(&self) -> Token {
        self.tokens.peek()
    }

    /// Consumes a single token; the driver's error-recovery step.
    pub fn bump(&mut self) {
        self.tokens.next();
    }

    /// definition ::= prototype block
    pub fn parse_definition(&mut self) -> ParseResult<FunctionDef> {
        let proto = self.parse_prototype()?;
        let body = self.parse_block()?;

        Ok(FunctionDef { proto, body })
    }

    /// external ::= 'extern' prototype
    pub fn parse_extern(&mut self) -> ParseResult<Prototype> {
        self.expect_keyword(Keyword::Extern)?;
        self.parse_prototype()
    }

    /// toplevelexpr ::= expression
    ///
    /// The expression is wrapped in an anonymous zero-argument prototype so
    /// the rest of the pipeline only ever sees function definitions.
    pub fn parse_top_level_expr(&mut self) -> ParseResult<FunctionDef> {
        let body = self.parse_expr()?;

        let proto = Prototype {
            name: String::new(),
            ret: Type::Void,
            params: vec![],
        };

        Ok(FunctionDef { proto, body })
    }

    /// prototype ::= type name '(' (type name),* ')'
    pub fn parse_prototype(&mut self) -> ParseResult<Prototype> {
        let ret = self.parse_type("a return type")?;
        let name = self.parse_ident("a function name")?;
        self.expect_punct('(')?;

        let mut params = vec![];
        loop {
            // also tolerates a trailing comma before the closing paren
            if self.eat_punct(')') {
                break;
            }

            let ty = self.parse_param_type()?;
            let name = self.parse_ident("a parameter name")?;
            params.push(Param { ty, name });

            if !self.eat_punct(',') {
                self.expect_punct(')')?;
                break;
            }
        }

        Ok(Prototype { name, ret, params })
    }

    fn parse_type(&mut self, expected: &str) -> ParseResult<Type> {
        let token = self.tokens.peek();
        match token.kind {
            TokenKind::Keyword(keyword) => match keyword.ty() {
                Some(ty) => {
                    self.tokens.next();
                    Ok(ty)
                }
                None => Err(self.error_expected(expected, &token)),
            },
            _ => Err(self.error_expected(expected, &token)),
        }
    }

    fn parse_param_type(&mut self) -> ParseResult<Type> {
        let token = self.tokens.peek();
        match self.parse_type("a parameter type")? {
            Type::Void => Err(ParseError {
                message: "void is not a valid parameter type".to_owned(),
                line: token.line,
            }),
            ty => Ok(ty),
        }
    }

    fn parse_ident(&mut self, expected: &str) -> ParseResult<String> {
        let token = self.tokens.peek();
        match token.kind {
            TokenKind::Identifier(name) => {
                self.tokens.next();
                Ok(name)
            }
            _ => Err(self.error_expected(expected, &token)),
        }
    }

    fn expect_punct(&mut self, ch: char) -> ParseResult<()> {
        if self.eat_punct(ch) {
            Ok(())
        } else {
            let token = self.tokens.peek();
            Err(self.error_expected(&format!("`{ch}`"), &token))
        }
    }

    fn eat_punct(&mut self, ch: char) -> bool {
        if self.tokens.peek().kind == TokenKind::Punct(ch) {
            self.tokens.next();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> ParseResult<()> {
        if self.eat_keyword(keyword) {
            Ok(())
        } else {
            let token = self.tokens.peek();
            Err(self.error_expected(&format!("keyword `{}`", keyword.text()), &token))
        }
    }

    fn eat_keyword(&mut self, keyword: Keyword) -> bool {
        if self.tokens.peek().kind == TokenKind::Keyword(keyword) {
            self.tokens.next();
            true
        } else {
            false
        }
    }

    fn error_expected(&self, expected: &str, found: &Token) -> ParseError {
        ParseError {
            message: format!("expected {expected}, found {}", found.kind.token_name()),
            line: found.line,
        }
    }
}
