//! Header dependency tracking.
//!
//! Maps each scanned source or header file to the quoted `#include` paths it
//! names. System (`<...>`) includes are not tracked. The scan is purely
//! syntactic: no macro expansion and no conditional compilation.
//!
//! `.pyr/filedeps` stores one `<path>:<dep1>:<dep2>:` record per line.

use crate::history::{PersistError, normalize_path, read_optional, write_atomic};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileDependencies {
    entries: BTreeMap<String, Vec<String>>,
}

impl FileDependencies {
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        Ok(read_optional(path)?
            .map(|text| Self::parse(&text))
            .unwrap_or_default())
    }

    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for line in text.lines() {
            let mut fields = line.split(':');
            let Some(file) = fields.next().filter(|f| !f.trim().is_empty()) else {
                continue;
            };
            let deps = fields
                .filter(|d| !d.is_empty())
                .map(str::to_string)
                .collect();
            entries.insert(file.to_string(), deps);
        }
        Self { entries }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (file, deps) in &self.entries {
            out.push_str(file);
            out.push(':');
            for dep in deps {
                out.push_str(dep);
                out.push(':');
            }
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        write_atomic(path, &self.render())
    }

    /// Include paths recorded for `file`, relative to its directory.
    pub fn get(&self, file: &Path) -> &[String] {
        self.entries
            .get(&normalize_path(file))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn insert(&mut self, file: &Path, deps: Vec<String>) {
        self.entries.insert(normalize_path(file), deps);
    }

    /// Re-read `file` and replace its recorded includes.
    pub fn rescan(&mut self, file: &Path) -> io::Result<()> {
        let bytes = fs::read(file)?;
        let deps = scan_includes(&String::from_utf8_lossy(&bytes));
        debug!(file = %file.display(), ?deps, "scanned includes");
        self.insert(file, deps);
        Ok(())
    }

    /// Forget files that no longer exist. Returns how many were dropped.
    pub fn prune_missing(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|file, _| Path::new(file).exists());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Quoted include paths named by `source`, in order of appearance.
pub fn scan_includes(source: &str) -> Vec<String> {
    source.lines().filter_map(quoted_include).collect()
}

fn quoted_include(line: &str) -> Option<String> {
    let rest = line.trim().strip_prefix('#')?;
    let rest = rest.trim_start().strip_prefix("include")?;
    let rest = rest.trim_start().strip_prefix('"')?;
    let (path, _) = rest.split_once('"')?;
    (!path.is_empty()).then(|| path.to_string())
}
