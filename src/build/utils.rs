use crate::config::ProjectInfo;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::LazyLock;

static VARIABLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z0-9_]+)\}").expect("Invalid variable regex"));

/// Values substituted for `${name}` tokens in project strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    values: BTreeMap<&'static str, String>,
}

impl Variables {
    pub fn for_project(info: &ProjectInfo) -> Self {
        let v = &info.version;
        let mut values = BTreeMap::new();
        values.insert("src", "./src".to_string());
        values.insert("build", "./build".to_string());
        values.insert("name", info.name.clone());
        values.insert("macroname", info.macroname.clone());
        values.insert("version_major", v.major.to_string());
        values.insert("version_minor", v.minor.to_string());
        values.insert("version_patch", v.patch.to_string());
        values.insert("version_tweak", v.tweak.to_string());
        values.insert("version_name", v.name.clone().unwrap_or_default());
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

/// Substitute every known `${var}` in `text`. Unknown tokens are kept as written.
pub fn replace_vars(text: &str, vars: &Variables) -> String {
    VARIABLE
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Get the GCC/Clang-compatible standard flag for a given language standard
pub fn std_flag(standard: &str) -> String {
    let normalized = standard.trim().to_lowercase();
    let clean = normalized.strip_prefix("-std=").unwrap_or(&normalized);

    let canonical = match clean {
        "c89" | "c90" => "c89",
        "c17" | "c18" => "c17",
        "c23" | "c2x" => "c23",
        "c++98" | "c++03" => "c++03",
        "c++11" | "c++0x" => "c++11",
        "c++14" | "c++1y" => "c++14",
        "c++17" | "c++1z" => "c++17",
        "c++20" | "c++2a" => "c++20",
        "c++23" | "c++2b" => "c++23",
        "c++26" | "c++2c" => "c++26",
        "gnu89" | "gnu90" => "gnu89",
        "gnu17" | "gnu18" => "gnu17",
        "gnu++98" | "gnu++03" => "gnu++03",
        "gnu++11" | "gnu++0x" => "gnu++11",
        "gnu++14" | "gnu++1y" => "gnu++14",
        "gnu++17" | "gnu++1z" => "gnu++17",
        "gnu++20" | "gnu++2a" => "gnu++20",
        other => other,
    };
    format!("-std={canonical}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    C,
    Cpp,
    Header,
}

impl SourceKind {
    pub fn classify(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "c" => Some(SourceKind::C),
            "cpp" | "cc" | "cxx" => Some(SourceKind::Cpp),
            "h" | "hpp" | "hh" | "hxx" => Some(SourceKind::Header),
            _ => None,
        }
    }

    pub fn is_compiled(self) -> bool {
        matches!(self, SourceKind::C | SourceKind::Cpp)
    }
}

/// Object file name for a source path relative to the source directory.
/// Separators become `_`; a literal `_` in a component is written `@_` (and
/// `@` as `@@`), so two distinct paths never map to the same object.
pub fn object_name(relative: &Path) -> String {
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(escape_component(&part.to_string_lossy())),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    format!("{}.o", parts.join("_"))
}

fn escape_component(part: &str) -> String {
    let mut out = String::with_capacity(part.len());
    for ch in part.chars() {
        if matches!(ch, '_' | '@') {
            out.push('@');
        }
        out.push(ch);
    }
    out
}

/// Double-quote a path for a shell command line.
pub fn quote(path: &Path) -> String {
    format!("\"{}\"", path.display())
}
