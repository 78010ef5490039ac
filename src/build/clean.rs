//! `--clean`: forget all incremental state.
//!
//! Removing `.pyr/` drops the object files, the file history, the include
//! table and the last-build marker, so the next build compiles everything.
//! The `build/` directory and the generated config header are left alone.

use anyhow::{Context, Result};
use colored::*;
use std::fs;
use std::path::Path;

/// Remove the `.pyr/` state directory under `root`. Returns whether anything
/// was removed.
pub fn clean(root: &Path) -> Result<bool> {
    let state = root.join(".pyr");
    if !state.exists() {
        println!("{} Nothing to clean", "!".yellow());
        return Ok(false);
    }
    fs::remove_dir_all(&state)
        .with_context(|| format!("Failed to remove {}", state.display()))?;
    println!("{} Removed {}", "✓".green(), state.display());
    Ok(true)
}
