#[macro_use]
extern crate macro_rules_attribute;

mod lexer;
mod parser;

pub mod token;

pub use lexer::TokenStream;
pub use parser::{ParseError, ParseResult, Parser};

derive_alias! {
    #[derive(Node!)] = #[derive(Debug, Clone, PartialEq)];
    #[derive(NodeCopy!)] = #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)];
}
