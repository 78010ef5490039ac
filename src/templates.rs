//! Starter files for `pyr new` and the built-in config header template.

use anyhow::{Context, Result, bail};
use colored::*;
use std::fs;
use std::path::Path;

/// Written to `cfg-file` when no `pyruvic-default-cfg-format.cfg` is installed.
pub const CFG_HEADER: &str = "\
#pragma once

#define ${macroname}_NAME \"${name}\"
#define ${macroname}_VERSION_MAJOR ${version_major}
#define ${macroname}_VERSION_MINOR ${version_minor}
#define ${macroname}_VERSION_PATCH ${version_patch}
#define ${macroname}_VERSION_TWEAK ${version_tweak}
#define ${macroname}_VERSION_NAME \"${version_name}\"
";

const GITIGNORE: &str = ".pyr/*\nbuild/*\nsrc/cfg.hpp\n";

const MAIN_CPP: &str = "\
#include <iostream>

int main(int argc, char **argv) {
\t(void)argc; (void)argv;
\tstd::cout << \"Hello Pyruvic world!\" << std::endl;
\treturn 0;
}
";

/// Macro prefix derived from a project name: letters upper-cased, `_` kept,
/// everything else dropped.
pub fn macroname(name: &str) -> String {
    name.chars()
        .filter_map(|c| match c {
            c if c.is_ascii_alphabetic() => Some(c.to_ascii_uppercase()),
            '_' => Some('_'),
            _ => None,
        })
        .collect()
}

pub fn project_file(name: &str) -> String {
    format!(
        "[target]\n\
         \tname: {name}\n\
         \ttype: executable\n\
         \tmacroname: {}\n\
         \tversion: 1.0.0.0\n\
         \tcfg-file: src/cfg.hpp\n\
         \n\
         [requirements]\n\
         \tc++-standard: c++14\n\
         \n\
         [dependencies]\n",
        macroname(name)
    )
}

/// Create a new project directory `path` with a hello-world executable.
pub fn new_project(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("directory '{}' already exists", path.display());
    }

    for dir in [".pyr", "build", "src"] {
        fs::create_dir_all(path.join(dir))
            .with_context(|| format!("Failed to create {}", path.join(dir).display()))?;
    }

    // Use only the final directory name as project name (not the full path)
    let name = path
        .file_name()
        .unwrap_or(path.as_os_str())
        .to_string_lossy();

    fs::write(path.join(".gitignore"), GITIGNORE)?;
    fs::write(path.join("src").join("main.cpp"), MAIN_CPP)?;
    fs::write(path.join(crate::config::PROJECT_FILE), project_file(&name))?;

    println!("{} Created new project: {}", "✓".green(), name.bold());
    println!("  cd {}\n  pyr run", path.display());
    Ok(())
}
