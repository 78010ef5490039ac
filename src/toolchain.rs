//! Compiler discovery.
//!
//! The tool configuration (`pyruvic.cfg`) uses the same language as project
//! files and lists candidate tools in order of preference:
//!
//! ```text
//! [compilation]
//!     c-compiler: cc
//!     c++-compiler: c++
//! > unix
//!     c-compiler: gcc, clang
//!     linker: bfd, gold, lld
//! ```
//!
//! The first candidate that can actually be started wins. The resulting
//! [`Toolchain`] is built once and passed to the build driver.

use crate::config::{ConfigError, ConfigErrors};
use crate::parsing;
use crate::parsing::tree::values_for_platform;
use crate::platform::Platform;
use crate::templates;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

pub const TOOL_CONFIG_FILE: &str = "pyruvic.cfg";
pub const CONFIG_ENV: &str = "PYRUVIC_CONFIG";
pub const CFG_TEMPLATE_FILE: &str = "pyruvic-default-cfg-format.cfg";

pub const DEFAULT_TOOL_CONFIG: &str = "\
[compilation]
    c-compiler: cc
    c++-compiler: c++
    linker: bfd
    archiver: ar
> unix
    c-compiler: gcc, clang
    c++-compiler: g++, clang++
    linker: gold, lld
    archiver: llvm-ar
> win
    c-compiler: gcc, clang
    c++-compiler: g++, clang++
    linker: lld
    archiver: llvm-ar
";

#[derive(Debug, Error)]
pub enum ToolchainError {
    #[error("could not find {tool} (tried: {})", .tried.join(", "))]
    NotFound {
        tool: &'static str,
        tried: Vec<String>,
    },
}

/// Candidate tools listed by the tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolConfig {
    /// File the configuration came from; `None` for the built-in default.
    pub path: Option<PathBuf>,
    pub c_compilers: Vec<String>,
    pub cpp_compilers: Vec<String>,
    pub linkers: Vec<String>,
    pub archivers: Vec<String>,
}

impl ToolConfig {
    /// Paths searched for the tool configuration, in order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Some(path) = env::var_os(CONFIG_ENV) {
            paths.push(PathBuf::from(path));
        }
        if let Ok(exe) = env::current_exe()
            && let Some(dir) = exe.parent()
        {
            paths.push(dir.join(TOOL_CONFIG_FILE));
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("pyruvic").join(TOOL_CONFIG_FILE));
        }
        paths
    }

    pub fn locate() -> Option<PathBuf> {
        if let Some(path) = env::var_os(CONFIG_ENV)
            && !Path::new(&path).is_file()
        {
            warn!(path = ?path, "{CONFIG_ENV} does not name a file");
        }
        Self::search_paths().into_iter().find(|p| p.is_file())
    }

    /// Load the first tool configuration found, or the built-in default.
    pub fn load(platform: &Platform) -> Result<Self, ConfigErrors> {
        match Self::locate() {
            Some(path) => {
                debug!(path = %path.display(), "loading tool config");
                let source = fs::read_to_string(&path).map_err(|source| ConfigErrors {
                    file: path.display().to_string(),
                    errors: vec![ConfigError::Read {
                        path: path.clone(),
                        source,
                    }],
                })?;
                let mut config = Self::from_source(&path.display().to_string(), &source, platform)?;
                config.path = Some(path);
                Ok(config)
            }
            None => {
                debug!("no tool config found, using built-in default");
                Self::from_source("<built-in>", DEFAULT_TOOL_CONFIG, platform)
            }
        }
    }

    pub fn from_source(file: &str, source: &str, platform: &Platform) -> Result<Self, ConfigErrors> {
        let parsed = parsing::parse_str(file, source);
        if !parsed.is_ok() {
            return Err(ConfigErrors {
                file: file.to_string(),
                errors: parsed.errors.into_iter().map(ConfigError::from).collect(),
            });
        }
        let compilation = parsed.file.get("compilation");
        let list = |key| values_for_platform(compilation, "", key, platform);
        Ok(ToolConfig {
            path: None,
            c_compilers: list("c-compiler"),
            cpp_compilers: list("c++-compiler"),
            linkers: list("linker"),
            archivers: list("archiver"),
        })
    }

    /// Template for the generated config header: the file next to the tool
    /// configuration if there is one, otherwise the built-in template.
    pub fn cfg_header_template(&self) -> String {
        self.path
            .as_deref()
            .and_then(Path::parent)
            .map(|dir| dir.join(CFG_TEMPLATE_FILE))
            .and_then(|path| fs::read_to_string(path).ok())
            .unwrap_or_else(|| templates::CFG_HEADER.to_string())
    }
}

/// The tools a build runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub c_compiler: String,
    pub cpp_compiler: String,
    pub linker: String,
    pub archiver: String,
}

impl Toolchain {
    pub fn detect(config: &ToolConfig, needs_archiver: bool) -> Result<Self, ToolchainError> {
        Self::detect_with(config, needs_archiver, is_command_available, is_linker_available)
    }

    /// Pick the first available candidate of each kind using the given availability checks.
    pub fn detect_with(
        config: &ToolConfig,
        needs_archiver: bool,
        command_available: impl Fn(&str) -> bool,
        linker_available: impl Fn(&str) -> bool,
    ) -> Result<Self, ToolchainError> {
        let pick = |tool: &'static str, candidates: &[String], available: &dyn Fn(&str) -> bool| {
            candidates
                .iter()
                .find(|c| available(c.as_str()))
                .cloned()
                .ok_or_else(|| ToolchainError::NotFound {
                    tool,
                    tried: candidates.to_vec(),
                })
        };

        let c_compiler = pick("C compiler", &config.c_compilers, &command_available)?;
        let cpp_compiler = pick("C++ compiler", &config.cpp_compilers, &command_available)?;
        let linker = pick("linker", &config.linkers, &linker_available)?;
        let archiver = if needs_archiver {
            pick("archiver", &config.archivers, &command_available)?
        } else {
            config.archivers.first().cloned().unwrap_or_else(|| "ar".to_string())
        };

        debug!(%c_compiler, %cpp_compiler, %linker, %archiver, "toolchain selected");
        Ok(Toolchain {
            c_compiler,
            cpp_compiler,
            linker,
            archiver,
        })
    }

    /// The C++ compiler driving the selected linker.
    pub fn link_driver(&self) -> String {
        format!("{} -fuse-ld={}", self.cpp_compiler, self.linker)
    }
}

/// True when `cmd` (its first word) can be started with `--version`.
pub fn is_command_available(cmd: &str) -> bool {
    let Some(program) = cmd.split_whitespace().next() else {
        return false;
    };
    Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok()
}

/// A linker is usable through `-fuse-ld=<name>` when `ld.<name>` or `<name>` runs.
pub fn is_linker_available(name: &str) -> bool {
    is_command_available(&format!("ld.{name}")) || is_command_available(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unix() -> Platform {
        Platform::from_idents(["unix", "linux"])
    }

    #[test]
    fn test_default_config_lists_candidates_in_order() {
        let config = ToolConfig::from_source("<built-in>", DEFAULT_TOOL_CONFIG, &unix()).unwrap();
        assert_eq!(config.c_compilers, vec!["cc", "gcc", "clang"]);
        assert_eq!(config.cpp_compilers, vec!["c++", "g++", "clang++"]);
        assert_eq!(config.linkers, vec!["bfd", "gold", "lld"]);
        assert_eq!(config.archivers, vec!["ar", "llvm-ar"]);
    }

    #[test]
    fn test_detect_picks_first_available() {
        let config = ToolConfig::from_source("<built-in>", DEFAULT_TOOL_CONFIG, &unix()).unwrap();
        let tc = Toolchain::detect_with(
            &config,
            true,
            |c| ["clang", "g++", "llvm-ar"].contains(&c),
            |l| l == "lld",
        )
        .unwrap();
        assert_eq!(tc.c_compiler, "clang");
        assert_eq!(tc.cpp_compiler, "g++");
        assert_eq!(tc.linker, "lld");
        assert_eq!(tc.archiver, "llvm-ar");
        assert_eq!(tc.link_driver(), "g++ -fuse-ld=lld");
    }

    #[test]
    fn test_missing_linker_is_reported() {
        let config = ToolConfig::from_source("<built-in>", DEFAULT_TOOL_CONFIG, &unix()).unwrap();
        let err = Toolchain::detect_with(&config, false, |_| true, |_| false).unwrap_err();
        assert_eq!(err.to_string(), "could not find linker (tried: bfd, gold, lld)");
    }

    #[test]
    fn test_archiver_only_required_for_static_libraries() {
        let config = ToolConfig::from_source("<built-in>", DEFAULT_TOOL_CONFIG, &unix()).unwrap();
        let available = |c: &str| c != "ar" && c != "llvm-ar";
        let tc = Toolchain::detect_with(&config, false, available, |_| true).unwrap();
        assert_eq!(tc.archiver, "ar");
        assert!(Toolchain::detect_with(&config, true, available, |_| true).is_err());
    }

    #[test]
    fn test_parse_errors_are_reported() {
        let err = ToolConfig::from_source("t.cfg", "[compilation\n", &unix()).unwrap_err();
        assert_eq!(err.errors.len(), 1);
    }

    #[test]
    fn test_builtin_template_without_config_file() {
        let config = ToolConfig::default();
        assert!(config.cfg_header_template().contains("${macroname}_VERSION_MAJOR"));
    }

    #[test]
    fn test_command_availability() {
        assert!(!is_command_available(""));
        assert!(!is_command_available("pyruvic-no-such-tool-anywhere"));
    }
}
