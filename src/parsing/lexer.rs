//! Tokenizer for the project and tool configuration language.
//!
//! The language is line oriented:
//!
//! ```text
//! [target]
//!     name: demo
//!     type: executable
//! > unix
//!     libs: pthread,
//!           dl
//!     fmt {
//!         include-dir: "third party/fmt, v9"
//!     }
//! ```
//!
//! - `[name]` at column 1 opens a category.
//! - `>` at column 1, optionally followed by a platform identifier, opens a subcategory.
//! - Indented `key: v1, v2` lines bind a key to a value list. A trailing comma
//!   continues the list on the next non-blank line.
//! - Indented `name {` ... `}` groups bindings into a named value pack.
//! - Quoted values may contain commas, colons and newlines.
//!
//! Lexing never fails: malformed input becomes an [`TokenKind::Error`] token and
//! the stream always ends with [`TokenKind::Eof`].

use std::fmt;
use std::sync::Arc;

/// Why a chunk of input could not be tokenized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LexErrorKind {
    UnterminatedCategory,
    MissingName,
    MalformedSubcategory,
    UnexpectedTopLevel,
    MissingColon,
    EmptyValue,
    UnterminatedString,
    TrailingInput,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            LexErrorKind::UnterminatedCategory => "category header is missing its closing `]`",
            LexErrorKind::MissingName => "missing name",
            LexErrorKind::MalformedSubcategory => {
                "subcategory marker takes at most one platform identifier"
            }
            LexErrorKind::UnexpectedTopLevel => {
                "expected `[category]` or `> platform` at the start of a line (entries must be indented)"
            }
            LexErrorKind::MissingColon => "expected `key: values` or `name {`",
            LexErrorKind::EmptyValue => "empty value in list",
            LexErrorKind::UnterminatedString => "unterminated quoted value",
            LexErrorKind::TrailingInput => "unexpected trailing input",
        };
        f.write_str(msg)
    }
}

impl LexErrorKind {
    /// Errors raised while scanning the value list of a binding, as opposed
    /// to errors that replace a whole line.
    pub fn within_value_list(self) -> bool {
        matches!(
            self,
            LexErrorKind::EmptyValue | LexErrorKind::UnterminatedString | LexErrorKind::TrailingInput
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Category,
    Subcategory,
    ValuePack,
    ValueName,
    Value,
    Comma,
    CloseBrace,
    Eof,
    Error(LexErrorKind),
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Category => f.write_str("category header"),
            TokenKind::Subcategory => f.write_str("subcategory marker"),
            TokenKind::ValuePack => f.write_str("value pack"),
            TokenKind::ValueName => f.write_str("key"),
            TokenKind::Value => f.write_str("value"),
            TokenKind::Comma => f.write_str("`,`"),
            TokenKind::CloseBrace => f.write_str("`}`"),
            TokenKind::Eof => f.write_str("end of file"),
            TokenKind::Error(kind) => write!(f, "error ({kind})"),
        }
    }
}

/// A source span. Lines and columns are 1-based; the end position is inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

impl Location {
    /// Span covering `start` through `end`.
    pub fn span(start: &Location, end: &Location) -> Location {
        Location {
            file: start.file.clone(),
            line: start.line,
            column: start.column,
            end_line: end.end_line,
            end_column: end.end_column,
        }
    }

    pub fn is_multiline(&self) -> bool {
        self.end_line > self.line
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: Location,
}

/// Flat token sequence produced by [`lex`]. Always terminated by an `Eof` token,
/// which `next` keeps returning once the stream is exhausted.
#[derive(Debug, Clone)]
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    pub fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    pub fn next(&mut self) -> &Token {
        let current = self.pos;
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[current]
    }

    /// Restart from the first token.
    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }
}

#[derive(Clone, Copy)]
struct Mark {
    line: u32,
    column: u32,
}

struct Lexer {
    file: Arc<str>,
    chars: Vec<char>,
    pos: usize,
    line: u32,
    column: u32,
    // position of the last consumed character
    prev: (u32, u32),
    tokens: Vec<Token>,
}

#[derive(PartialEq)]
enum ListState {
    Start,
    AfterValue,
    AfterComma,
}

/// Tokenize `source`, tagging every location with `file`.
pub fn lex(file: &str, source: &str) -> TokenStream {
    let lexer = Lexer {
        file: Arc::from(file),
        chars: source.chars().filter(|&c| c != '\r').collect(),
        pos: 0,
        line: 1,
        column: 1,
        prev: (1, 1),
        tokens: Vec::new(),
    };
    lexer.run()
}

impl Lexer {
    fn run(mut self) -> TokenStream {
        loop {
            self.skip_blanks();
            let indented = self.column > 1;
            match self.peek() {
                None => break,
                Some('\n') => {
                    self.bump();
                }
                Some('#') => {
                    self.consume_line();
                }
                Some('}') => {
                    let start = self.mark();
                    self.bump();
                    self.push(TokenKind::CloseBrace, "}".to_string(), start);
                    self.expect_line_end();
                }
                Some('[') if !indented => self.lex_category(),
                Some('>') if !indented => self.lex_subcategory(),
                Some(_) if !indented => {
                    let start = self.mark();
                    let text = self.consume_line();
                    self.push_error(LexErrorKind::UnexpectedTopLevel, text, start);
                }
                Some(_) => self.lex_entry(),
            }
        }
        let start = self.mark();
        self.tokens.push(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            location: Location {
                file: self.file.clone(),
                line: start.line,
                column: start.column,
                end_line: start.line,
                end_column: start.column,
            },
        });
        TokenStream::new(self.tokens)
    }

    fn lex_category(&mut self) {
        let start = self.mark();
        self.bump();
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c == ']' || c == '\n' {
                break;
            }
            name.push(c);
            self.bump();
        }
        if self.peek() != Some(']') {
            self.push_error(LexErrorKind::UnterminatedCategory, format!("[{name}"), start);
            return;
        }
        self.bump();
        let name = name.trim();
        if name.is_empty() {
            self.push_error(LexErrorKind::MissingName, "[]".to_string(), start);
        } else {
            self.push(TokenKind::Category, name.to_string(), start);
        }
        self.expect_line_end();
    }

    fn lex_subcategory(&mut self) {
        let start = self.mark();
        self.bump();
        let rest = self.consume_line();
        let ident = rest.trim();
        if ident.split_whitespace().count() > 1 {
            self.push_error(LexErrorKind::MalformedSubcategory, format!(">{rest}"), start);
        } else {
            self.push(TokenKind::Subcategory, ident.to_string(), start);
        }
    }

    fn lex_entry(&mut self) {
        let line_end = self.line_end();
        let colon = self.chars[self.pos..line_end]
            .iter()
            .position(|&c| c == ':');

        let start = self.mark();
        match colon {
            Some(offset) => {
                let key = self.advance(offset);
                let key = key.trim();
                if key.is_empty() {
                    self.bump();
                    self.push_error(LexErrorKind::MissingName, ":".to_string(), start);
                } else {
                    self.push(TokenKind::ValueName, key.to_string(), start);
                    self.bump();
                }
                self.lex_values();
            }
            None => {
                let line = self.consume_line();
                match line.trim_end().strip_suffix('{') {
                    Some(name) if !name.trim().is_empty() => {
                        self.push(TokenKind::ValuePack, name.trim().to_string(), start);
                    }
                    Some(_) => self.push_error(LexErrorKind::MissingName, line, start),
                    None => self.push_error(LexErrorKind::MissingColon, line, start),
                }
            }
        }
    }

    fn lex_values(&mut self) {
        let mut state = ListState::Start;
        loop {
            self.skip_blanks();
            match self.peek() {
                None => return,
                Some('\n') => {
                    if state != ListState::AfterComma {
                        return;
                    }
                    // trailing comma: the list continues on the next non-blank line
                    while self.peek() == Some('\n') {
                        self.bump();
                        self.skip_blanks();
                    }
                    if self.peek().is_none() || self.column == 1 {
                        return;
                    }
                }
                Some(',') => {
                    let start = self.mark();
                    self.bump();
                    if state != ListState::AfterValue {
                        self.push_error(LexErrorKind::EmptyValue, ",".to_string(), start);
                    }
                    self.push(TokenKind::Comma, ",".to_string(), start);
                    state = ListState::AfterComma;
                }
                Some(_) if state == ListState::AfterValue => {
                    let start = self.mark();
                    let junk = self.take_until_separator();
                    self.push_error(LexErrorKind::TrailingInput, junk, start);
                }
                Some('"') => {
                    if !self.lex_quoted() {
                        return;
                    }
                    state = ListState::AfterValue;
                }
                Some(_) => {
                    self.lex_plain_value();
                    state = ListState::AfterValue;
                }
            }
        }
    }

    fn lex_plain_value(&mut self) {
        let start = self.mark();
        let raw = self.take_until_separator();
        let value = raw.trim_end();
        let trailing = (raw.chars().count() - value.chars().count()) as u32;
        let mut location = self.location(start);
        location.end_column = location.end_column.saturating_sub(trailing).max(start.column);
        self.tokens.push(Token {
            kind: TokenKind::Value,
            text: value.to_string(),
            location,
        });
    }

    /// Returns false when the quote is never closed (input is exhausted).
    fn lex_quoted(&mut self) -> bool {
        let start = self.mark();
        self.bump();
        let mut value = String::new();
        loop {
            match self.bump() {
                None => {
                    self.push_error(LexErrorKind::UnterminatedString, format!("\"{value}"), start);
                    return false;
                }
                Some('"') => break,
                Some('\\') => match self.peek() {
                    Some(c @ ('"' | '\\')) => {
                        self.bump();
                        value.push(c);
                    }
                    _ => value.push('\\'),
                },
                Some(c) => value.push(c),
            }
        }
        self.push(TokenKind::Value, value, start);
        true
    }

    fn expect_line_end(&mut self) {
        self.skip_blanks();
        match self.peek() {
            None | Some('\n') => {}
            Some('#') => {
                self.consume_line();
            }
            Some(_) => {
                let start = self.mark();
                let text = self.consume_line();
                self.push_error(LexErrorKind::TrailingInput, text, start);
            }
        }
    }

    fn take_until_separator(&mut self) -> String {
        let mut text = String::new();
        while let Some(c) = self.peek() {
            if c == ',' || c == '\n' {
                break;
            }
            text.push(c);
            self.bump();
        }
        text
    }

    fn consume_line(&mut self) -> String {
        let end = self.line_end();
        let count = end - self.pos;
        self.advance(count)
    }

    fn line_end(&self) -> usize {
        self.chars[self.pos..]
            .iter()
            .position(|&c| c == '\n')
            .map_or(self.chars.len(), |offset| self.pos + offset)
    }

    fn advance(&mut self, count: usize) -> String {
        let mut text = String::with_capacity(count);
        for _ in 0..count {
            match self.bump() {
                Some(c) => text.push(c),
                None => break,
            }
        }
        text
    }

    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.bump();
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        self.prev = (self.line, self.column);
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn mark(&self) -> Mark {
        Mark {
            line: self.line,
            column: self.column,
        }
    }

    fn location(&self, start: Mark) -> Location {
        let consumed = (self.line, self.column) != (start.line, start.column);
        let (end_line, end_column) = if consumed {
            self.prev
        } else {
            (start.line, start.column)
        };
        Location {
            file: self.file.clone(),
            line: start.line,
            column: start.column,
            end_line,
            end_column,
        }
    }

    fn push(&mut self, kind: TokenKind, text: String, start: Mark) {
        let location = self.location(start);
        self.tokens.push(Token {
            kind,
            text,
            location,
        });
    }

    fn push_error(&mut self, kind: LexErrorKind, text: String, start: Mark) {
        self.push(TokenKind::Error(kind), text, start);
    }
}
