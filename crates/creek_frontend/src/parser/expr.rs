use creek_ir::ast::Expr;
use creek_ir::{BinOp, UnOp};

use super::{ParseResult, Parser};
use crate::token::{Keyword, TokenKind};

/// Binding strength of a pending binary-operator token. Anything that cannot
/// continue a binary chain sits at -1.
fn token_precedence(kind: &TokenKind) -> i32 {
    match kind {
        TokenKind::Punct(';') => 2,
        TokenKind::Punct('<') => 10,
        TokenKind::Punct('+' | '-') => 20,
        TokenKind::Punct('*') => 40,
        _ => -1,
    }
}

impl Parser<'_> {
    /// expression ::= primary binoprhs
    pub fn parse_expr(&mut self) -> ParseResult<Expr> {
        let lhs = self.parse_primary()?;
        self.parse_binop_rhs(0, lhs)
    }

    /// binoprhs ::= (binop primary)*
    fn parse_binop_rhs(&mut self, min_prec: i32, mut lhs: Expr) -> ParseResult<Expr> {
        loop {
            let prec = token_precedence(&self.tokens.peek().kind);
            if prec < min_prec {
                return Ok(lhs);
            }

            // the precedence table only admits single-character operators
            let TokenKind::Punct(op_char) = self.tokens.next().kind else {
                return Ok(lhs);
            };

            // `;` separates statements: consumed, but it ends the chain
            // instead of folding
            if op_char == ';' {
                return Ok(lhs);
            }

            let mut rhs = self.parse_primary()?;

            // let a tighter-binding pending operator take `rhs` first
            let next_prec = token_precedence(&self.tokens.peek().kind);
            if prec < next_prec {
                rhs = self.parse_binop_rhs(prec + 1, rhs)?;
            }

            let op = match op_char {
                '+' => BinOp::Add,
                '-' => BinOp::Sub,
                '*' => BinOp::Mul,
                _ => BinOp::Less,
            };

            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        // stray statement separators before a primary are harmless
        while self.tokens.peek().kind == TokenKind::Punct(';') {
            self.tokens.next();
        }

        let token = self.tokens.peek();
        match token.kind {
            TokenKind::Int(value) => {
                self.tokens.next();
                Ok(Expr::Int(value))
            }
            TokenKind::Float(value) => {
                self.tokens.next();
                Ok(Expr::Float(value))
            }
            TokenKind::Str(value) => {
                self.tokens.next();
                Ok(Expr::Str(value))
            }
            TokenKind::Bool(value) => {
                self.tokens.next();
                Ok(Expr::Bool(value))
            }

            TokenKind::Identifier(name) => {
                self.tokens.next();
                self.parse_identifier_expr(name)
            }

            TokenKind::Keyword(Keyword::If) => self.parse_if_expr(),

            TokenKind::Punct('(') => self.parse_paren_expr(),
            TokenKind::Punct('+' | '-') => self.parse_unary_expr(),

            // an empty block tail: the `}` stays put and reads as no value
            TokenKind::Punct('}') => Ok(Expr::Void),

            _ => Err(self.error_expected("an expression", &token)),
        }
    }

    /// identifierexpr ::= identifier | identifier '(' expression,* ')'
    fn parse_identifier_expr(&mut self, name: String) -> ParseResult<Expr> {
        if !self.eat_punct('(') {
            return Ok(Expr::Var(name));
        }

        let mut args = vec![];
        if !self.eat_punct(')') {
            loop {
                args.push(self.parse_expr()?);

                let token = self.tokens.peek();
                match token.kind {
                    TokenKind::Punct(')') => {
                        self.tokens.next();
                        break;
                    }
                    TokenKind::Punct(',') => {
                        self.tokens.next();
                    }
                    _ => return Err(self.error_expected("`)` or `,` in argument list", &token)),
                }
            }
        }

        Ok(Expr::Call { callee: name, args })
    }

    /// parenexpr ::= '(' expression ')'
    fn parse_paren_expr(&mut self) -> ParseResult<Expr> {
        self.tokens.next();
        let expr = self.parse_expr()?;
        self.expect_punct(')')?;
        Ok(expr)
    }

    /// unary ::= ('+' | '-') primary
    fn parse_unary_expr(&mut self) -> ParseResult<Expr> {
        let token = self.tokens.next();
        let op = if token.kind == TokenKind::Punct('-') {
            UnOp::Negate
        } else {
            UnOp::Plus
        };

        let operand = self.parse_primary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    /// ifexpr ::= 'if' expression block ('else' block)?
    fn parse_if_expr(&mut self) -> ParseResult<Expr> {
        self.tokens.next();

        let cond = self.parse_expr()?;
        let then = self.parse_block()?;

        let else_ = if self.eat_keyword(Keyword::Else) {
            self.parse_block()?
        } else {
            Expr::Void
        };

        Ok(Expr::If {
            cond: Box::new(cond),
            then: Box::new(then),
            else_: Box::new(else_),
        })
    }

    /// block ::= '{' expression+ '}'
    ///
    /// The expressions are folded left-to-right into a `Sequence`, so the
    /// block's value is its last expression's value.
    pub(crate) fn parse_block(&mut self) -> ParseResult<Expr> {
        self.expect_punct('{')?;

        let mut expr = self.parse_expr()?;
        while !self.eat_punct('}') {
            let next = self.parse_expr()?;
            expr = Expr::Sequence {
                first: Box::new(expr),
                second: Box::new(next),
            };
        }

        Ok(expr)
    }
}
