//! Removal of intermediate files once the COGs exist.

use glob::Pattern;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::Result;

/// Regular files directly inside `dir` whose name matches the glob
/// `pattern`, sorted. Subdirectories are never returned.
pub fn matching_files(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = Pattern::new(pattern)?;
    let mut files = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if pattern.matches(name) {
            files.push(entry.path());
        }
    }

    files.sort();
    Ok(files)
}

/// Deletes every file [`matching_files`] returns for `dir` and `pattern`.
///
/// Stops at the first filesystem error; files removed before it stay
/// removed.
pub fn remove_matching(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let files = matching_files(dir, pattern)?;

    for path in &files {
        fs::remove_file(path)?;
        debug!("Removed {:?}", path);
    }

    info!(
        "cleanup: removed {} files matching '{}' in {:?}",
        files.len(),
        pattern,
        dir
    );
    Ok(files)
}
