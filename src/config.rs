//! Project descriptor loaded from `pyruvic.projinfo`.
//!
//! Loading never stops at the first problem: parse errors and invalid or
//! missing keys are accumulated and reported together.

use crate::build::utils::{Variables, replace_vars};
use crate::deps::{self, Dependency};
use crate::parsing::tree::{Category, ConfigFile, packs_for_platform, values_for_platform};
use crate::parsing::{self, ParseError};
use crate::platform::Platform;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::warn;

pub const PROJECT_FILE: &str = "pyruvic.projinfo";

/// Hook trigger that fires on every build.
pub const ALWAYS_TRIGGER: &str = "__always__";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TargetKind {
    #[default]
    Executable,
    StaticLibrary,
    DynamicLibrary,
}

impl TargetKind {
    pub fn extension(self) -> &'static str {
        match self {
            TargetKind::Executable if cfg!(windows) => ".exe",
            TargetKind::Executable => "",
            TargetKind::StaticLibrary => ".a",
            TargetKind::DynamicLibrary if cfg!(windows) => ".dll",
            TargetKind::DynamicLibrary => ".so",
        }
    }

    /// File name of the build artifact for a project called `name`.
    pub fn artifact_name(self, name: &str) -> String {
        let prefix = if self == TargetKind::StaticLibrary && cfg!(unix) {
            "lib"
        } else {
            ""
        };
        format!("{prefix}{name}{}", self.extension())
    }

    pub fn is_runnable(self) -> bool {
        self != TargetKind::StaticLibrary
    }
}

impl FromStr for TargetKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "executable" => Ok(TargetKind::Executable),
            "static library" => Ok(TargetKind::StaticLibrary),
            "dynamic library" => Ok(TargetKind::DynamicLibrary),
            other => Err(ConfigError::UnknownTargetType(other.to_string())),
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TargetKind::Executable => "executable",
            TargetKind::StaticLibrary => "static library",
            TargetKind::DynamicLibrary => "dynamic library",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("too many version components (at most 4)")]
    TooManyComponents,
    #[error("unexpected character '{ch}' at offset {offset}")]
    UnexpectedCharacter { ch: char, offset: usize },
    #[error("version component {index} is empty")]
    EmptyComponent { index: usize },
    #[error("version component {index} is too large")]
    ComponentTooLarge { index: usize },
}

/// `MAJOR.MINOR.PATCH.TWEAK[ name]`; missing trailing components are 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub tweak: u32,
    pub name: Option<String>,
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numbers, name) = match s.split_once(' ') {
            Some((numbers, rest)) => {
                let rest = rest.trim();
                (numbers, (!rest.is_empty()).then(|| rest.to_string()))
            }
            None => (s, None),
        };

        let mut components = [0u32; 4];
        let mut index = 0;
        let mut current: Option<u32> = None;
        for (offset, ch) in numbers.char_indices() {
            match ch {
                '0'..='9' => {
                    let digit = u32::from(ch as u8 - b'0');
                    let value = current
                        .unwrap_or(0)
                        .checked_mul(10)
                        .and_then(|v| v.checked_add(digit))
                        .ok_or(VersionError::ComponentTooLarge { index })?;
                    current = Some(value);
                }
                '.' => {
                    components[index] = current.take().ok_or(VersionError::EmptyComponent { index })?;
                    index += 1;
                    if index == components.len() {
                        return Err(VersionError::TooManyComponents);
                    }
                }
                ch => return Err(VersionError::UnexpectedCharacter { ch, offset }),
            }
        }
        components[index] = current.ok_or(VersionError::EmptyComponent { index })?;

        let [major, minor, patch, tweak] = components;
        Ok(Version {
            major,
            minor,
            patch,
            tweak,
            name,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.patch, self.tweak)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find project file {}", .0.display())]
    MissingFile(PathBuf),
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("[{category}] must have {key}")]
    MissingKey {
        category: &'static str,
        key: &'static str,
    },
    #[error("unknown target type \"{0}\" (expected executable, static library or dynamic library)")]
    UnknownTargetType(String),
    #[error("invalid version \"{value}\": {source}")]
    Version {
        value: String,
        #[source]
        source: VersionError,
    },
    #[error("dependency `{name}` depends on unknown dependency `{missing}`")]
    UnknownDependency { name: String, missing: String },
    #[error(
        "[commands] {0} is not a hook stage (expected `> pre-build`, `> pre-build-parallel`, `> post-build` or `> post-build-parallel`)"
    )]
    MisplacedHooks(String),
}

/// Every error found while loading one configuration file.
#[derive(Debug, Error)]
#[error("{} error(s) in {}", .errors.len(), .file)]
pub struct ConfigErrors {
    pub file: String,
    pub errors: Vec<ConfigError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookStage {
    PreBuild,
    PreBuildParallel,
    PostBuild,
    PostBuildParallel,
}

impl HookStage {
    pub const ALL: [HookStage; 4] = [
        HookStage::PreBuild,
        HookStage::PreBuildParallel,
        HookStage::PostBuild,
        HookStage::PostBuildParallel,
    ];

    /// Name of the `[commands]` subcategory holding this stage's hooks.
    pub fn name(self) -> &'static str {
        match self {
            HookStage::PreBuild => "pre-build",
            HookStage::PreBuildParallel => "pre-build-parallel",
            HookStage::PostBuild => "post-build",
            HookStage::PostBuildParallel => "post-build-parallel",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|stage| stage.name() == name)
    }

    pub fn is_parallel(self) -> bool {
        matches!(self, HookStage::PreBuildParallel | HookStage::PostBuildParallel)
    }

    pub(crate) fn index(self) -> usize {
        self as usize
    }
}

/// Commands bound to a trigger file, with variables already substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hook {
    pub trigger: String,
    pub commands: Vec<String>,
}

impl Hook {
    pub fn is_always(&self) -> bool {
        self.trigger == ALWAYS_TRIGGER
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Hooks {
    stages: [Vec<Hook>; 4],
}

impl Hooks {
    pub fn stage(&self, stage: HookStage) -> &[Hook] {
        &self.stages[stage.index()]
    }

    pub fn push(&mut self, stage: HookStage, hook: Hook) {
        self.stages[stage.index()].push(hook);
    }
}

/// The validated contents of a project file.
#[derive(Debug, Clone, Default)]
pub struct ProjectInfo {
    pub name: String,
    pub kind: TargetKind,
    pub macroname: String,
    pub version: Version,
    pub cfg_file: Option<PathBuf>,
    pub c_standard: Option<String>,
    pub cpp_standard: Option<String>,
    pub libs: Vec<String>,
    pub hooks: Hooks,
    pub dependencies: Vec<Dependency>,
}

impl ProjectInfo {
    pub fn load(path: &Path, platform: &Platform) -> Result<Self, ConfigErrors> {
        let file = path.display().to_string();
        let fail = |error| ConfigErrors {
            file: file.clone(),
            errors: vec![error],
        };
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(fail(ConfigError::MissingFile(path.to_path_buf())));
            }
            Err(source) => {
                return Err(fail(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                }));
            }
        };
        Self::from_source(&file, &source, platform)
    }

    pub fn from_source(file: &str, source: &str, platform: &Platform) -> Result<Self, ConfigErrors> {
        let parsed = parsing::parse_str(file, source);
        let mut errors: Vec<ConfigError> = parsed.errors.into_iter().map(ConfigError::from).collect();
        let info = match Self::from_config(&parsed.file, platform) {
            Ok(info) => Some(info),
            Err(more) => {
                errors.extend(more);
                None
            }
        };
        match info {
            Some(info) if errors.is_empty() => Ok(info),
            _ => Err(ConfigErrors {
                file: file.to_string(),
                errors,
            }),
        }
    }

    pub fn from_config(config: &ConfigFile, platform: &Platform) -> Result<Self, Vec<ConfigError>> {
        let mut errors = Vec::new();
        let mut required = |key: &'static str| {
            let value = config.first("target", key).map(str::to_string);
            if value.is_none() {
                errors.push(ConfigError::MissingKey {
                    category: "target",
                    key,
                });
            }
            value.unwrap_or_default()
        };
        let name = required("name");
        let kind = required("type");
        let macroname = required("macroname");
        let version = required("version");

        let mut info = ProjectInfo {
            name,
            macroname,
            ..ProjectInfo::default()
        };
        if !kind.is_empty() {
            match kind.parse() {
                Ok(kind) => info.kind = kind,
                Err(e) => errors.push(e),
            }
        }
        if !version.is_empty() {
            match version.parse() {
                Ok(parsed) => info.version = parsed,
                Err(source) => errors.push(ConfigError::Version {
                    value: version,
                    source,
                }),
            }
        }

        let vars = Variables::for_project(&info);
        info.cfg_file = config
            .first("target", "cfg-file")
            .map(|f| PathBuf::from(replace_vars(f, &vars)));
        info.c_standard = config.first("requirements", "c-standard").map(str::to_string);
        info.cpp_standard = config.first("requirements", "c++-standard").map(str::to_string);
        info.libs = values_for_platform(config.get("requirements"), "", "libs", platform);

        let (hooks, hook_errors) = parse_hooks(config.get("commands"), platform, &vars);
        info.hooks = hooks;
        errors.extend(hook_errors);

        let (dependencies, dep_errors) = deps::parse_dependencies(config.get("dependencies"), platform);
        info.dependencies = dependencies;
        errors.extend(dep_errors);

        if errors.is_empty() { Ok(info) } else { Err(errors) }
    }

    pub fn variables(&self) -> Variables {
        Variables::for_project(self)
    }

    pub fn artifact_name(&self) -> String {
        self.kind.artifact_name(&self.name)
    }
}

/// Read hooks laid out as `> stage`, then an optional platform pack, then
/// `trigger: commands` bindings. Packs for other platforms are skipped.
fn parse_hooks(commands: &Category, platform: &Platform, vars: &Variables) -> (Hooks, Vec<ConfigError>) {
    let mut errors = Vec::new();
    for (qualifier, sub) in commands.iter() {
        if HookStage::from_name(qualifier).is_some() {
            for pack in sub.keys().filter(|p| !p.is_empty() && !Platform::is_known(p)) {
                warn!(stage = qualifier, pack, "ignoring hooks for unknown platform");
            }
        } else if qualifier.is_empty() {
            if !sub.is_empty() {
                errors.push(ConfigError::MisplacedHooks("entries before any `> stage` marker".into()));
            }
        } else {
            errors.push(ConfigError::MisplacedHooks(format!("`> {qualifier}`")));
        }
    }

    let mut hooks = Hooks::default();
    for stage in HookStage::ALL {
        for pack in packs_for_platform(commands.get(stage.name()), platform) {
            for (trigger, cmds) in pack.iter() {
                hooks.push(
                    stage,
                    Hook {
                        trigger: replace_vars(trigger, vars),
                        commands: cmds.iter().map(|c| replace_vars(c, vars)).collect(),
                    },
                );
            }
        }
    }
    (hooks, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unix() -> Platform {
        Platform::from_idents(["unix", "linux"])
    }

    const PROJECT: &str = "\
[target]
\tname: demo
\ttype: dynamic library
\tmacroname: DEMO
\tversion: 2.0.1 rc1
\tcfg-file: ${src}/${name}_cfg.hpp

[requirements]
\tc++-standard: c++17
\tlibs: m
> unix
\tlibs: pthread
> win
\tlibs: ws2_32

[commands]
> pre-build
\t__always__: echo ${name} ${version_major}
> post-build
\tunix {
\t\t${src}/schema.txt: gen ${src}/schema.txt, touch done
\t}
\twin {
\t\t__always__: never
\t}
";

    #[test]
    fn test_load_full_project() {
        let info = ProjectInfo::from_source("p", PROJECT, &unix()).unwrap();
        assert_eq!(info.name, "demo");
        assert_eq!(info.kind, TargetKind::DynamicLibrary);
        assert_eq!(info.macroname, "DEMO");
        assert_eq!(info.version.to_string(), "2.0.1.0 rc1");
        assert_eq!(info.cfg_file, Some(PathBuf::from("./src/demo_cfg.hpp")));
        assert_eq!(info.cpp_standard.as_deref(), Some("c++17"));
        assert_eq!(info.c_standard, None);
        assert_eq!(info.libs, vec!["m", "pthread"]);

        let pre = info.hooks.stage(HookStage::PreBuild);
        assert_eq!(pre.len(), 1);
        assert!(pre[0].is_always());
        assert_eq!(pre[0].commands, vec!["echo demo 2"]);

        let post = info.hooks.stage(HookStage::PostBuild);
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].trigger, "./src/schema.txt");
        assert_eq!(post[0].commands, vec!["gen ./src/schema.txt", "touch done"]);
        assert!(info.hooks.stage(HookStage::PostBuildParallel).is_empty());
    }

    #[test]
    fn test_all_errors_are_reported() {
        let src = "[target]\n\ttype: shared object\n\tversion: 1.x\n[requirements\n";
        let err = ProjectInfo::from_source("p", src, &unix()).unwrap_err();
        let messages: Vec<String> = err.errors.iter().map(ToString::to_string).collect();
        assert_eq!(err.errors.len(), 5, "{messages:#?}");
        assert!(matches!(err.errors[0], ConfigError::Parse(_)));
        assert!(messages.contains(&"[target] must have name".to_string()));
        assert!(messages.contains(&"[target] must have macroname".to_string()));
        assert!(messages.iter().any(|m| m.contains("unknown target type \"shared object\"")));
        assert!(messages.iter().any(|m| m.contains("unexpected character 'x'")));
        assert_eq!(err.to_string(), "5 error(s) in p");
    }

    #[test]
    fn test_hooks_read_from_stage_subcategories() {
        let src = "[target]\n\tname: h\n\ttype: executable\n\tmacroname: H\n\tversion: 1\n\
            [commands]\n> pre-build\n\t__always__: echo hi\n\tlinux {\n\t\tgen.txt: echo gen\n\t}\n\
            > post-build-parallel\n\tmacos {\n\t\t__always__: echo mac\n\t}\n";
        let info = ProjectInfo::from_source("p", src, &unix()).unwrap();
        let pre = info.hooks.stage(HookStage::PreBuild);
        assert_eq!(pre.len(), 2);
        assert_eq!(pre[0].commands, vec!["echo hi"]);
        assert_eq!(pre[1].trigger, "gen.txt");
        assert!(info.hooks.stage(HookStage::PostBuildParallel).is_empty());
    }

    #[test]
    fn test_hooks_outside_a_stage_are_errors() {
        let src = "[target]\n\tname: h\n\ttype: executable\n\tmacroname: H\n\tversion: 1\n\
            [commands]\n\t__always__: echo lost\n> unix\n\tpre-build {\n\t\t__always__: echo old\n\t}\n";
        let err = ProjectInfo::from_source("p", src, &unix()).unwrap_err();
        let messages: Vec<String> = err.errors.iter().map(ToString::to_string).collect();
        assert_eq!(err.errors.len(), 2, "{messages:#?}");
        assert!(messages[0].contains("before any `> stage` marker"));
        assert!(messages[1].contains("[commands] `> unix` is not a hook stage"));
    }

    #[test]
    fn test_missing_file() {
        let err = ProjectInfo::load(Path::new("/definitely/not/here.projinfo"), &unix()).unwrap_err();
        assert!(matches!(err.errors[..], [ConfigError::MissingFile(_)]));
    }

    #[test]
    fn test_version_scanner() {
        let v: Version = "1.2.3.4 release candidate".parse().unwrap();
        assert_eq!((v.major, v.minor, v.patch, v.tweak), (1, 2, 3, 4));
        assert_eq!(v.name.as_deref(), Some("release candidate"));

        let v: Version = "7".parse().unwrap();
        assert_eq!(v, Version { major: 7, ..Version::default() });

        assert_eq!("1.2.3.4.5".parse::<Version>(), Err(VersionError::TooManyComponents));
        assert_eq!(
            "1.2a".parse::<Version>(),
            Err(VersionError::UnexpectedCharacter { ch: 'a', offset: 3 })
        );
        assert_eq!("1..2".parse::<Version>(), Err(VersionError::EmptyComponent { index: 1 }));
        assert_eq!("1.2.".parse::<Version>(), Err(VersionError::EmptyComponent { index: 2 }));
        assert_eq!("".parse::<Version>(), Err(VersionError::EmptyComponent { index: 0 }));
        assert_eq!(
            "99999999999".parse::<Version>(),
            Err(VersionError::ComponentTooLarge { index: 0 })
        );
        let v: Version = "3.1 ".parse().unwrap();
        assert_eq!(v.name, None);
    }

    #[test]
    fn test_target_kind() {
        assert_eq!("static library".parse::<TargetKind>().unwrap(), TargetKind::StaticLibrary);
        assert!("library".parse::<TargetKind>().is_err());
        assert!(!TargetKind::StaticLibrary.is_runnable());
        if cfg!(unix) {
            assert_eq!(TargetKind::Executable.artifact_name("app"), "app");
            assert_eq!(TargetKind::StaticLibrary.artifact_name("z"), "libz.a");
            assert_eq!(TargetKind::DynamicLibrary.artifact_name("z"), "z.so");
        }
    }
}
