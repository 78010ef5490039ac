//! Severity-tagged console messages.
//!
//! Every user-facing status line goes through [`message`] so that the
//! `severity: text` layout and coloring stay uniform:
//!
//! ```text
//! info: loading project file - ./pyruvic.projinfo
//! warning: failed saving file dependencies
//! fatal error: could not find C compiler
//! ```

use colored::*;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Info => "info",
            Severity::Note => "note",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal error",
        }
    }

    fn paint(self, text: &str) -> ColoredString {
        match self {
            Severity::Debug => text.magenta(),
            Severity::Info => text.white(),
            Severity::Note => text.cyan(),
            Severity::Warning => text.yellow(),
            Severity::Error => text.bright_red().bold(),
            Severity::Fatal => text.red().bold(),
        }
    }
}

pub fn format(severity: Severity, msg: impl fmt::Display) -> String {
    format!("{}: {}", severity.paint(severity.label()), msg)
}

/// Print `msg` tagged with `severity`. Errors go to stderr.
pub fn message(severity: Severity, msg: impl fmt::Display) {
    let line = format(severity, msg);
    if severity >= Severity::Error {
        eprintln!("{line}");
    } else {
        println!("{line}");
    }
}

pub fn info(msg: impl fmt::Display) {
    message(Severity::Info, msg);
}

pub fn note(msg: impl fmt::Display) {
    message(Severity::Note, msg);
}

pub fn warning(msg: impl fmt::Display) {
    message(Severity::Warning, msg);
}

pub fn error(msg: impl fmt::Display) {
    message(Severity::Error, msg);
}

pub fn fatal(msg: impl fmt::Display) {
    message(Severity::Fatal, msg);
}

/// Green `built <name>` style success line.
pub fn success(msg: impl fmt::Display) {
    println!("{} {}", "✓".green(), msg.to_string().green());
}
