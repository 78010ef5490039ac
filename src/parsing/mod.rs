//! The configuration language: lexer, parser and the resulting tree.

pub mod lexer;
pub mod parser;
pub mod tree;

pub use lexer::{Location, Token, TokenKind, TokenStream, lex};
pub use parser::{ParseError, Parsed, parse};
pub use tree::{Category, ConfigFile, Section, Subcategory, ValueList, ValuePack};

/// Lex and parse `source`, attributing locations to `file`.
pub fn parse_str(file: &str, source: &str) -> Parsed {
    parse(&mut lex(file, source))
}
