//! File modification history.
//!
//! Tracks the last modification time at which each file was successfully
//! processed, and answers whether a file (or anything it includes) changed
//! since then. Also owns the last-build marker that forces a full rebuild
//! when the build mode changes.
//!
//! ## On-disk format
//!
//! `.pyr/filehist` holds one `<path> <mtime>` record per line, the mtime being
//! nanoseconds since the Unix epoch. Paths may contain spaces; the record is
//! split at the last one.

use crate::includes::FileDependencies;
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::{debug, warn};

/// Transitive staleness checks give up (and report stale) past this depth.
pub const MAX_DEPENDENCY_DEPTH: usize = 50;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to read {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHistory {
    entries: BTreeMap<String, u64>,
}

impl FileHistory {
    /// Load the table at `path`. A missing file yields an empty table.
    pub fn load(path: &Path) -> Result<Self, PersistError> {
        match read_optional(path)? {
            Some(text) => Ok(Self::parse(&text)),
            None => Ok(Self::default()),
        }
    }

    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let record = line
                .rsplit_once(' ')
                .and_then(|(path, ts)| Some((path, ts.trim().parse::<u64>().ok()?)));
            match record {
                Some((path, ts)) if !path.is_empty() => {
                    entries.insert(path.to_string(), ts);
                }
                // dropping the record only makes the file look stale
                _ => warn!(line = index + 1, record = line, "ignoring malformed history record"),
            }
        }
        Self { entries }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for (path, ts) in &self.entries {
            out.push_str(path);
            out.push(' ');
            out.push_str(&ts.to_string());
            out.push('\n');
        }
        out
    }

    pub fn save(&self, path: &Path) -> Result<(), PersistError> {
        write_atomic(path, &self.render())
    }

    /// True when `file` has no record, no longer exists, or was modified after
    /// its recorded time.
    pub fn was_updated(&self, file: &Path) -> bool {
        let key = normalize_path(file);
        match (self.entries.get(&key), modified_nanos(file)) {
            (Some(&recorded), Ok(current)) => current > recorded,
            _ => true,
        }
    }

    /// Like [`was_updated`](Self::was_updated), but also true when any file
    /// reachable through `deps` is stale. Include paths resolve against the
    /// including file's directory.
    pub fn was_updated_transitive(
        &self,
        file: &Path,
        deps: &FileDependencies,
        depth: usize,
    ) -> bool {
        if depth > MAX_DEPENDENCY_DEPTH {
            warn!(
                file = %file.display(),
                "include chain deeper than {MAX_DEPENDENCY_DEPTH}, possible include cycle; treating as changed"
            );
            return true;
        }
        if self.was_updated(file) {
            debug!(file = %file.display(), depth, "changed");
            return true;
        }
        let dir = file.parent().unwrap_or_else(|| Path::new(""));
        deps.get(file)
            .iter()
            .any(|dep| self.was_updated_transitive(&dir.join(dep), deps, depth + 1))
    }

    /// Record the current modification time of `file`.
    pub fn mark_current(&mut self, file: &Path) -> io::Result<()> {
        let ts = modified_nanos(file)?;
        self.entries.insert(normalize_path(file), ts);
        Ok(())
    }

    pub fn recorded(&self, file: &Path) -> Option<u64> {
        self.entries.get(&normalize_path(file)).copied()
    }

    pub fn forget(&mut self, file: &Path) {
        self.entries.remove(&normalize_path(file));
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop the records of files that no longer exist. Returns how many went.
    pub fn prune_missing(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| Path::new(path).exists());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The compilation mode a build was produced with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildMode {
    pub release: bool,
    pub obfuscate: bool,
}

impl BuildMode {
    pub fn encode(self) -> u8 {
        (u8::from(self.obfuscate) << 1) | u8::from(self.release)
    }

    pub fn decode(value: u8) -> Option<Self> {
        (value <= 3).then_some(Self {
            release: value & 1 != 0,
            obfuscate: value & 2 != 0,
        })
    }

    /// Mode recorded by the last successful build, if any.
    pub fn load_marker(path: &Path) -> Option<Self> {
        let text = fs::read_to_string(path).ok()?;
        let mode = text.trim().parse::<u8>().ok().and_then(Self::decode);
        if mode.is_none() {
            warn!(path = %path.display(), "unreadable last-build marker");
        }
        mode
    }

    pub fn save_marker(self, path: &Path) -> Result<(), PersistError> {
        write_atomic(path, &format!("{}\n", self.encode()))
    }
}

/// Modification time of `path` in nanoseconds since the Unix epoch.
pub fn modified_nanos(path: &Path) -> io::Result<u64> {
    let modified = fs::metadata(path)?.modified()?;
    let nanos = modified
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());
    Ok(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Lexically normalize `path` into the string used as a record key:
/// `.` components are dropped and `..` cancels the preceding component.
pub fn normalize_path(path: &Path) -> String {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let can_pop = matches!(out.components().next_back(), Some(Component::Normal(_)));
                if can_pop {
                    out.pop();
                } else {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out.to_string_lossy().into_owned()
}

pub(crate) fn read_optional(path: &Path) -> Result<Option<String>, PersistError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(PersistError::Read {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write through a temporary sibling and rename over `path`.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<(), PersistError> {
    let wrap = |source| PersistError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, contents).map_err(wrap)?;
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        wrap(e)
    })
}
