//! # pyruvic - incremental C/C++ builds from a small project file
//!
//! A project is described by `pyruvic.projinfo`, written in a line-oriented
//! configuration language with categories, platform-qualified subcategories
//! and named value packs. `pyr build` recompiles only the translation units
//! whose sources or (transitively) included headers changed since the last
//! successful build, and runs compile commands concurrently.
//!
//! ## Quick Start
//!
//! ```bash
//! pyr new myapp
//! cd myapp
//! pyr run
//! ```
//!
//! ## Module Organization
//!
//! - [`parsing`] - Lexer, parser and the configuration tree
//! - [`history`] / [`includes`] - Staleness tracking persisted under `.pyr/`
//! - [`build`] - Build driver and the concurrent command executor
//! - [`config`] - Project descriptor validation
//! - [`toolchain`] - Compiler and linker discovery

/// Build driver, command executor and helpers.
pub mod build;

/// Project file (`pyruvic.projinfo`) validation.
pub mod config;

/// `[dependencies]` declarations and local resolution.
pub mod deps;

/// File modification history and the last-build marker.
pub mod history;

/// `#include` scanning and the file dependency table.
pub mod includes;

/// Tracing subscriber setup.
pub mod logging;

/// Configuration language front end.
pub mod parsing;

/// Host platform identifiers used to select subcategories.
pub mod platform;

/// Scaffolding for `pyr new`.
pub mod templates;

/// Tool configuration and compiler detection.
pub mod toolchain;

/// Severity-tagged terminal output.
pub mod ui;
