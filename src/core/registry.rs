//! Registered-folders whitelist.
//!
//! The only persisted state: a text file listing every folder the pipeline
//! tracks, one key per line. Changed top-level paths outside this set are
//! deliberately ignored during change-set resolution.

use std::collections::BTreeSet;
use std::path::Path;

use crate::error::{Error, Result};

pub fn registered_folders(repo_dir: &Path, folders_file: &str) -> Result<BTreeSet<String>> {
    let path = repo_dir.join(folders_file);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::internal_io(e.to_string(), Some(format!("read {}", path.display()))).with_hint(
            format!("Create {} with one image folder per line", folders_file),
        )
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
