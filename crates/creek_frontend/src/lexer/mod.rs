
use std::str::Chars;

use crate::token::{Keyword, Token, TokenKind};

/// A pull lexer over raw script text.
///
/// Holds only the cursor needed to produce the next token, so `peek` can
/// run the scanner on a clone without committing position or line changes.
#[derive(Clone)]
pub struct TokenStream<'src> {
    chars: Chars<'src>,
    line: u32,
    token_line: u32,
}

impl<'src> TokenStream<'src> {
    pub fn new(source: &'src str) -> Self {
        Self {
            chars: source.chars(),
            line: 1,
            token_line: 1,
        }
    }

    /// Consumes and returns the next token. End of input yields `Eof`
    /// tokens indefinitely.
    pub fn next(&mut self) -> Token {
        let token = self.scan();
        self.token_line = token.line;
        token
    }

    /// Returns the token `next` would return, without consuming it.
    pub fn peek(&self) -> Token {
        self.clone().scan()
    }

    /// 1-based line of the most recently consumed token.
    pub fn line(&self) -> u32 {
        self.token_line
    }

    fn scan(&mut self) -> Token {
        loop {
            let line = self.line;

            let Some(ch) = self.bump() else {
                return Token {
                    kind: TokenKind::Eof,
                    line: self.line,
                };
            };

            let kind = match ch {
                ch if ch.is_ascii_whitespace() => continue,

                // comment to end of line
                '#' => {
                    while !matches!(self.bump(), Some('\n' | '\r') | None) {}
                    continue;
                }

                '"' => self.scan_string(),

                ch if ch.is_ascii_alphabetic() => self.scan_alpha(ch),

                ch if ch.is_ascii_digit() || ch == '.' => self.scan_number(ch),

                ch => TokenKind::Punct(ch),
            };

            return Token { kind, line };
        }
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.chars.next()?;
        if ch == '\n' {
            self.line += 1;
        }
        Some(ch)
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.clone().next()
    }

    fn scan_string(&mut self) -> TokenKind {
        let mut text = String::new();
        loop {
            match self.bump() {
                Some('"') => return TokenKind::Str(text),
                // a literal that reaches a newline or the end of input
                // never lexes successfully
                Some('\n' | '\r') | None => return TokenKind::Invalid,
                Some(ch) => text.push(ch),
            }
        }
    }

    fn scan_alpha(&mut self, first: char) -> TokenKind {
        let mut ident = String::from(first);
        while let Some(ch) = self.peek_char() {
            if !ch.is_ascii_alphanumeric() {
                break;
            }
            ident.push(ch);
            self.bump();
        }

        match ident.as_str() {
            "true" => TokenKind::Bool(true),
            "false" => TokenKind::Bool(false),
            _ => match Keyword::from_ident(&ident) {
                Some(keyword) => TokenKind::Keyword(keyword),
                None => TokenKind::Identifier(ident),
            },
        }
    }

    fn scan_number(&mut self, first: char) -> TokenKind {
        let mut text = String::from(first);
        while let Some(ch) = self.peek_char() {
            if !(ch.is_ascii_digit() || ch == '.') {
                break;
            }
            text.push(ch);
            self.bump();
        }

        match text.matches('.').count() {
            0 => match text.parse::<i64>() {
                Ok(value) => TokenKind::Int(value),
                Err(_) => TokenKind::Invalid,
            },
            1 => match text.parse::<f64>() {
                Ok(value) => TokenKind::Float(value),
                Err(_) => TokenKind::Invalid,
            },
            _ => TokenKind::Invalid,
        }
    }
}
