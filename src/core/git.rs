use std::path::Path;
use std::process::Command;

use crate::error::{Error, Result};

fn execute_git(repo_dir: &Path, args: &[&str]) -> std::io::Result<std::process::Output> {
    Command::new("git").args(args).current_dir(repo_dir).output()
}

/// List file paths changed between two revisions (`from` exclusive, `to`
/// inclusive). Fails when a revision is unreachable, e.g. in a shallow clone
/// after a force-push; callers fall back to the remote compare API.
pub fn diff_name_only(repo_dir: &Path, from: &str, to: &str) -> Result<Vec<String>> {
    let range = format!("{}..{}", from, to);
    let output = execute_git(repo_dir, &["diff", "--name-only", &range])
        .map_err(|e| Error::git_command_failed(format!("Failed to run git diff: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::git_command_failed(format!(
            "git diff {} failed: {}",
            range,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(stdout.lines().map(|l| l.to_string()).collect())
}

/// Hash of the most recent commit touching a folder, used as the vcs-ref
/// provenance label on built images. Empty history yields None.
pub fn folder_head_hash(repo_dir: &Path, folder: &str) -> Result<Option<String>> {
    let output = execute_git(
        repo_dir,
        &["log", "-n", "1", "--pretty=format:%H", "--", folder],
    )
    .map_err(|e| Error::git_command_failed(format!("Failed to run git log: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::git_command_failed(format!(
            "git log failed: {}",
            stderr.trim()
        )));
    }

    let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if hash.is_empty() {
        Ok(None)
    } else {
        Ok(Some(hash))
    }
}
