//! Builds a [`ConfigFile`] from a token stream.
//!
//! Grammar errors are collected rather than returned early, so a malformed
//! section never hides diagnostics for the rest of the file.

use super::lexer::{Location, Token, TokenKind, TokenStream};
use super::tree::ConfigFile;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{location}: {message}")]
pub struct ParseError {
    pub location: Location,
    pub message: String,
}

/// Parser output: the tree plus every error encountered while building it.
#[derive(Debug, Clone, Default)]
pub struct Parsed {
    pub file: ConfigFile,
    pub errors: Vec<ParseError>,
}

impl Parsed {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

struct OpenPack {
    name: String,
    location: Location,
}

struct Parser<'t> {
    tokens: &'t mut TokenStream,
    file: ConfigFile,
    errors: Vec<ParseError>,
    category: Option<String>,
    qualifier: String,
    pack: Option<OpenPack>,
}

pub fn parse(tokens: &mut TokenStream) -> Parsed {
    let mut parser = Parser {
        tokens,
        file: ConfigFile::default(),
        errors: Vec::new(),
        category: None,
        qualifier: String::new(),
        pack: None,
    };
    parser.run();
    Parsed {
        file: parser.file,
        errors: parser.errors,
    }
}

impl Parser<'_> {
    fn run(&mut self) {
        loop {
            let token = self.tokens.next().clone();
            match token.kind {
                TokenKind::Eof => {
                    self.close_unterminated_pack();
                    break;
                }
                TokenKind::Category => {
                    self.close_unterminated_pack();
                    self.file.entry(&token.text);
                    self.category = Some(token.text);
                    self.qualifier.clear();
                }
                TokenKind::Subcategory => {
                    let Some(category) = self.category.clone() else {
                        self.error(&token, "subcategory marker before any category");
                        continue;
                    };
                    self.close_unterminated_pack();
                    self.file.entry(&category).entry(&token.text);
                    self.qualifier = token.text;
                }
                TokenKind::ValuePack => self.open_pack(token),
                TokenKind::CloseBrace => {
                    if self.pack.take().is_none() {
                        self.error(&token, "`}` without an open value pack");
                    }
                }
                TokenKind::ValueName => self.binding(token),
                TokenKind::Value | TokenKind::Comma => {
                    self.error(&token, format!("unexpected {} outside of a key", token.kind));
                }
                TokenKind::Error(kind) => self.error(&token, format!("{kind}: `{}`", token.text)),
            }
        }
    }

    fn open_pack(&mut self, token: Token) {
        let Some(category) = self.category.clone() else {
            self.error(&token, "value pack before any category");
            return;
        };
        if let Some(outer) = &self.pack {
            let message = format!(
                "value pack `{}` opened inside `{}` (opened at {}); packs do not nest",
                token.text, outer.name, outer.location
            );
            self.error(&token, message);
        }
        self.file
            .entry(&category)
            .entry(&self.qualifier)
            .entry(&token.text);
        self.pack = Some(OpenPack {
            name: token.text,
            location: token.location,
        });
    }

    fn binding(&mut self, key: Token) {
        let mut values = Vec::new();
        let mut end = key.location.clone();
        loop {
            let next = self.tokens.peek();
            match next.kind {
                TokenKind::Value => {
                    end = next.location.clone();
                    values.push(next.text.clone());
                    self.tokens.next();
                }
                TokenKind::Comma => {
                    self.tokens.next();
                }
                TokenKind::Error(kind) if kind.within_value_list() => {
                    let token = self.tokens.next().clone();
                    self.error(&token, format!("{kind}: `{}`", token.text));
                }
                // anything else starts a new line; a malformed one is reported by `run`
                _ => break,
            }
        }

        let Some(category) = &self.category else {
            let span = Location::span(&key.location, &end);
            self.errors.push(ParseError {
                location: span,
                message: format!("key `{}` before any category", key.text),
            });
            return;
        };
        let pack = self.pack.as_ref().map_or("", |p| p.name.as_str());
        self.file
            .entry(category)
            .entry(&self.qualifier)
            .entry(pack)
            .entry(&key.text)
            .extend(values);
    }

    fn close_unterminated_pack(&mut self) {
        if let Some(pack) = self.pack.take() {
            self.errors.push(ParseError {
                message: format!("value pack `{}` is never closed with `}}`", pack.name),
                location: pack.location,
            });
        }
    }

    fn error(&mut self, token: &Token, message: impl Into<String>) {
        self.errors.push(ParseError {
            location: token.location.clone(),
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsing::lexer::lex;
    use proptest::prelude::*;

    fn parse_str(src: &str) -> Parsed {
        parse(&mut lex("test.projinfo", src))
    }

    const PROJECT: &str = "\
[target]
    name: demo
    type: static library
    version: 1.2.3.4 beta

[requirements]
    libs: m
> unix
    libs: pthread,
          dl

[commands]
> pre-build
    __always__: echo hi
    unix {
        ${src}/schema.txt: \"python3 gen.py, --all\", echo done
    }
> post-build
    __always__: echo bye
";

    #[test]
    fn test_parse_project_shape() {
        let parsed = parse_str(PROJECT);
        assert!(parsed.is_ok(), "{:?}", parsed.errors);
        let file = &parsed.file;
        assert_eq!(file.first("target", "name"), Some("demo"));
        assert_eq!(file.first("target", "type"), Some("static library"));
        assert_eq!(file.first("target", "version"), Some("1.2.3.4 beta"));
        assert_eq!(file.value("requirements", "", "", "libs"), ["m"]);
        assert_eq!(file.value("requirements", "unix", "", "libs"), ["pthread", "dl"]);
        assert_eq!(
            file.value("commands", "pre-build", "unix", "${src}/schema.txt"),
            ["python3 gen.py, --all", "echo done"]
        );
        assert_eq!(file.value("commands", "pre-build", "", "__always__"), ["echo hi"]);
        assert_eq!(
            file.value("commands", "post-build", "", "__always__"),
            ["echo bye"]
        );
        let categories: Vec<_> = file.keys().collect();
        assert_eq!(categories, vec!["target", "requirements", "commands"]);
    }

    #[test]
    fn test_repeated_keys_append() {
        let parsed = parse_str("[a]\n  k: 1\n  k: 2, 3\n[a]\n  k: 4\n");
        assert!(parsed.is_ok());
        assert_eq!(parsed.file.value("a", "", "", "k"), ["1", "2", "3", "4"]);
    }

    #[test]
    fn test_empty_key_is_present_but_empty() {
        let parsed = parse_str("[a]\n  k:\n");
        assert!(parsed.is_ok());
        assert!(parsed.file.get("a").get("").get("").contains("k"));
        assert!(parsed.file.value("a", "", "", "k").is_empty());
    }

    #[test]
    fn test_errors_do_not_block_later_categories() {
        let src = "  orphan: 1\n[bad\n[a]\n  }\n  k: v\n> unix win\n[b]\n  x: y\n";
        let parsed = parse_str(src);
        assert_eq!(parsed.errors.len(), 4, "{:?}", parsed.errors);
        assert_eq!(parsed.errors[0].location.line, 1);
        assert!(parsed.errors[0].message.contains("before any category"));
        assert_eq!(parsed.errors[1].location.line, 2);
        assert!(parsed.errors[2].message.contains("without an open value pack"));
        assert_eq!(parsed.errors[3].location.line, 6);
        assert_eq!(parsed.file.value("a", "", "", "k"), ["v"]);
        assert_eq!(parsed.file.value("b", "", "", "x"), ["y"]);
    }

    #[test]
    fn test_malformed_line_does_not_extend_previous_key() {
        let parsed = parse_str("[a]\n  k: a\n  : x, y\n  j: b\n");
        assert_eq!(parsed.file.value("a", "", "", "k"), ["a"]);
        assert_eq!(parsed.file.value("a", "", "", "j"), ["b"]);
        assert_eq!(parsed.errors[0].location.line, 3);
        assert!(parsed.errors[0].message.contains("missing name"));
        assert!(
            parsed.errors[1..]
                .iter()
                .all(|e| e.location.line == 3 && e.message.contains("outside of a key")),
            "{:?}",
            parsed.errors
        );
    }

    #[test]
    fn test_list_errors_stay_with_their_key() {
        let parsed = parse_str("[a]\n  k: a, , b\n");
        assert_eq!(parsed.errors.len(), 1, "{:?}", parsed.errors);
        assert!(parsed.errors[0].message.contains("empty value"));
        assert_eq!(parsed.file.value("a", "", "", "k"), ["a", "b"]);
    }

    #[test]
    fn test_unterminated_pack_reported_at_opening() {
        let parsed = parse_str("[c]\n  pre-build {\n    a: b\n[d]\n  x: y\n");
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].location.line, 2);
        assert!(parsed.errors[0].message.contains("never closed"));
        assert_eq!(parsed.file.value("c", "", "pre-build", "a"), ["b"]);
        assert_eq!(parsed.file.value("d", "", "", "x"), ["y"]);
    }

    #[test]
    fn test_unterminated_pack_at_eof() {
        let parsed = parse_str("[c]\n  p {\n    a: b\n");
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn test_nested_pack_is_an_error() {
        let parsed = parse_str("[c]\n  p {\n  q {\n    a: b\n  }\n");
        assert_eq!(parsed.errors.len(), 1);
        assert!(parsed.errors[0].message.contains("do not nest"));
        assert_eq!(parsed.file.value("c", "", "q", "a"), ["b"]);
    }

    #[test]
    fn test_error_display_has_location() {
        let parsed = parse_str("[a]\n  k: \"open\n");
        let shown = parsed.errors[0].to_string();
        assert!(shown.starts_with("test.projinfo:2:6:"), "{shown}");
    }

    fn render(entries: &[(String, Vec<String>)], wraps: &[bool]) -> String {
        let mut out = String::from("[cat]\n");
        let mut wrap = wraps.iter().cycle();
        for (key, values) in entries {
            out.push_str("    ");
            out.push_str(key);
            out.push(':');
            for (i, value) in values.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                    if *wrap.next().unwrap_or(&false) {
                        out.push_str("\n        ");
                    }
                }
                out.push(' ');
                out.push_str(value);
            }
            out.push('\n');
        }
        out
    }

    proptest! {
        #[test]
        fn prop_values_survive_line_wrapping(
            entries in prop::collection::btree_map(
                "[a-z][a-z0-9_-]{0,8}",
                prop::collection::vec("[A-Za-z0-9_./+=-]{1,10}", 0..6),
                1..6,
            ),
            wraps in prop::collection::vec(any::<bool>(), 1..8),
        ) {
            let entries: Vec<(String, Vec<String>)> = entries.into_iter().collect();
            let flat = render(&entries, &[false]);
            let wrapped = render(&entries, &wraps);
            let a = parse_str(&flat);
            let b = parse_str(&wrapped);
            prop_assert!(a.is_ok());
            prop_assert!(b.is_ok());
            for (key, values) in &entries {
                prop_assert_eq!(a.file.value("cat", "", "", key), values.as_slice());
                prop_assert_eq!(b.file.value("cat", "", "", key), values.as_slice());
            }
        }

        #[test]
        fn prop_lookup_is_total(
            category in "[a-z>\\[\\] ]{0,6}",
            qualifier in "[a-z]{0,6}",
            pack in "[a-z-]{0,6}",
            key in "[a-z:]{0,6}",
        ) {
            let parsed = parse_str(PROJECT);
            let values = parsed.file.value(&category, &qualifier, &pack, &key);
            let present = parsed.file.contains(&category)
                && parsed.file.get(&category).contains(&qualifier)
                && parsed.file.get(&category).get(&qualifier).contains(&pack)
                && parsed.file.get(&category).get(&qualifier).get(&pack).contains(&key);
            if !present {
                prop_assert!(values.is_empty());
            }
        }
    }
}
