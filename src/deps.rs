//! Project dependencies declared under `[dependencies]`.
//!
//! Two spellings are accepted:
//!
//! ```text
//! [dependencies]
//!     zlib: https://github.com/madler/zlib
//!     fmt {
//!         repo: https://github.com/fmtlib/fmt
//!         include-dir: third_party/fmt/include
//!         link-libs: fmt
//!     }
//! ```
//!
//! Fetching and building dependencies is not supported. Resolution only picks
//! up include directories that already exist on disk and the declared link
//! libraries.

use crate::config::ConfigError;
use crate::parsing::tree::{Category, applicable};
use crate::platform::Platform;
use crate::ui;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Dependency {
    pub name: String,
    pub repo: Option<String>,
    pub alias: Option<String>,
    pub build_system: Option<String>,
    pub include_dirs: Vec<PathBuf>,
    pub link_libs: Vec<String>,
    pub depends_on: Vec<String>,
}

/// Collect dependencies from every subcategory that applies on `platform`.
/// Later subcategories extend or override what earlier ones declared.
pub fn parse_dependencies(
    category: &Category,
    platform: &Platform,
) -> (Vec<Dependency>, Vec<ConfigError>) {
    let mut deps: IndexMap<String, Dependency> = IndexMap::new();

    for sub in applicable(category, platform) {
        for (pack, bindings) in sub.iter() {
            if pack.is_empty() {
                for (name, values) in bindings.iter() {
                    if let Some(repo) = values.first() {
                        entry(&mut deps, name).repo = Some(repo.clone());
                    }
                }
                continue;
            }
            let dep = entry(&mut deps, pack);
            for (key, values) in bindings.iter() {
                let first = values.first().cloned();
                match key {
                    "repo" => dep.repo = first.or(dep.repo.take()),
                    "alias" => dep.alias = first.or(dep.alias.take()),
                    "build-system" => dep.build_system = first.or(dep.build_system.take()),
                    "include-dir" => dep.include_dirs.extend(values.iter().map(PathBuf::from)),
                    "link-libs" => dep.link_libs.extend(values.iter().cloned()),
                    "depends-on" => dep.depends_on.extend(values.iter().cloned()),
                    other => warn!(dependency = pack, key = other, "ignoring unknown dependency key"),
                }
            }
        }
    }

    let mut errors = Vec::new();
    for dep in deps.values() {
        for needed in &dep.depends_on {
            if !deps.contains_key(needed) {
                errors.push(ConfigError::UnknownDependency {
                    name: dep.name.clone(),
                    missing: needed.clone(),
                });
            }
        }
    }
    (deps.into_values().collect(), errors)
}

fn entry<'a>(deps: &'a mut IndexMap<String, Dependency>, name: &str) -> &'a mut Dependency {
    deps.entry(name.to_string()).or_insert_with(|| Dependency {
        name: name.to_string(),
        ..Dependency::default()
    })
}

/// Compiler and linker inputs contributed by dependencies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub include_dirs: Vec<PathBuf>,
    pub link_libs: Vec<String>,
}

/// Resolve `deps` against the project at `root` without fetching anything.
/// Link libraries are ordered so that a library precedes the ones it depends on.
pub fn resolve(deps: &[Dependency], root: &Path) -> Resolved {
    let mut resolved = Resolved::default();
    let order = load_order(deps);

    for dep in &order {
        for dir in &dep.include_dirs {
            let full = root.join(dir);
            if full.is_dir() {
                debug!(dependency = %dep.name, dir = %dir.display(), "using include dir");
                resolved.include_dirs.push(dir.clone());
            } else if let Some(repo) = &dep.repo {
                ui::warning(format!(
                    "dependency `{}`: {} does not exist and fetching from {} is not supported",
                    dep.name,
                    dir.display(),
                    repo
                ));
            } else {
                ui::warning(format!(
                    "dependency `{}`: include dir {} does not exist",
                    dep.name,
                    dir.display()
                ));
            }
        }
    }
    for dep in order.iter().rev() {
        resolved.link_libs.extend(dep.link_libs.iter().cloned());
    }
    resolved
}

/// Dependencies ordered so that each one comes after everything it depends on.
fn load_order(deps: &[Dependency]) -> Vec<&Dependency> {
    fn visit<'a>(
        dep: &'a Dependency,
        by_name: &IndexMap<&str, &'a Dependency>,
        visiting: &mut HashSet<&'a str>,
        done: &mut HashSet<&'a str>,
        out: &mut Vec<&'a Dependency>,
    ) {
        if done.contains(dep.name.as_str()) {
            return;
        }
        if !visiting.insert(dep.name.as_str()) {
            warn!(dependency = %dep.name, "dependency cycle");
            return;
        }
        for needed in &dep.depends_on {
            if let Some(&next) = by_name.get(needed.as_str()) {
                visit(next, by_name, visiting, done, out);
            }
        }
        visiting.remove(dep.name.as_str());
        done.insert(dep.name.as_str());
        out.push(dep);
    }

    let by_name: IndexMap<&str, &Dependency> = deps.iter().map(|d| (d.name.as_str(), d)).collect();
    let mut visiting = HashSet::new();
    let mut done = HashSet::new();
    let mut out = Vec::with_capacity(deps.len());
    for dep in deps {
        visit(dep, &by_name, &mut visiting, &mut done, &mut out);
    }
    out
}
