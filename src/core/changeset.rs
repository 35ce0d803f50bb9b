//! Change-set resolution between two revisions.
//!
//! The local diff is the fast path. When the local history cannot produce it
//! (shallow clone, force-pushed base) the remote compare API is queried in
//! both orders and the file lists unioned, since remote ancestor search can
//! return different results depending on argument order.

use std::collections::BTreeSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::gh;
use crate::git;
use crate::github::CompareClient;

pub trait ChangeSource {
    fn local_diff(&self, from: &str, to: &str) -> Result<Vec<String>>;
    fn remote_compare(&self, base: &str, head: &str) -> Result<Vec<String>>;
}

/// Production source: `git diff` locally, the configured compare endpoint
/// remotely. The compare client is built lazily so runs whose local history
/// is intact never require a credential.
pub struct GitChangeSource {
    repo_dir: PathBuf,
    compare: Option<crate::config::CompareConfig>,
}

impl GitChangeSource {
    pub fn new(repo_dir: &Path, config: &PipelineConfig) -> Self {
        Self {
            repo_dir: repo_dir.to_path_buf(),
            compare: config.compare.clone(),
        }
    }
}

impl ChangeSource for GitChangeSource {
    fn local_diff(&self, from: &str, to: &str) -> Result<Vec<String>> {
        git::diff_name_only(&self.repo_dir, from, to)
    }

    fn remote_compare(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let compare = self.compare.as_ref().ok_or_else(|| {
            Error::config_missing_key("compare", None).with_hint(
                "Local diff failed and no compare endpoint is configured in kiln.json",
            )
        })?;

        let token = env::var(&compare.token_env).map_err(|_| {
            Error::config_missing_key(compare.token_env.clone(), None).with_hint(format!(
                "The remote compare fallback needs a credential in ${}",
                compare.token_env
            ))
        })?;

        let client = CompareClient::new(&compare.url_template, &token)?;
        client.changed_files(base, head)
    }
}

/// Resolve the set of registered folders touched between `from` (exclusive)
/// and `to` (inclusive). No partial result: any failure aborts resolution.
pub fn resolve(
    from: &str,
    to: &str,
    registered: &BTreeSet<String>,
    source: &dyn ChangeSource,
) -> Result<BTreeSet<String>> {
    validate_revision(from)?;
    validate_revision(to)?;

    let files = match source.local_diff(from, to) {
        Ok(files) => files,
        Err(local_err) => {
            gh::warning(&format!(
                "Local diff {}..{} failed ({}); falling back to remote compare",
                from, to, local_err.message
            ));
            remote_union(from, to, source)?
        }
    };

    Ok(files
        .iter()
        .map(|path| top_level_segment(path).to_string())
        .filter(|segment| registered.contains(segment))
        .collect())
}

/// Union of both query orders. Exposed separately so the pre-whitelist
/// behavior is testable on its own.
pub fn remote_union(from: &str, to: &str, source: &dyn ChangeSource) -> Result<Vec<String>> {
    let mut files = source.remote_compare(from, to)?;
    for file in source.remote_compare(to, from)? {
        if !files.contains(&file) {
            files.push(file);
        }
    }
    Ok(files)
}

fn validate_revision(revision: &str) -> Result<()> {
    if revision.trim().is_empty() {
        return Err(Error::revision_invalid(revision, "revision is empty"));
    }
    if revision.chars().any(char::is_whitespace) {
        return Err(Error::revision_invalid(
            revision,
            "revision contains whitespace",
        ));
    }
    if revision.starts_with('-') {
        return Err(Error::revision_invalid(
            revision,
            "revision starts with '-'",
        ));
    }
    Ok(())
}

fn top_level_segment(path: &str) -> &str {
    path.split('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    struct MockSource {
        local: std::result::Result<Vec<String>, Error>,
        remote: HashMap<(String, String), Vec<String>>,
        remote_calls: RefCell<Vec<(String, String)>>,
    }

    impl MockSource {
        fn local_ok(files: &[&str]) -> Self {
            Self {
                local: Ok(files.iter().map(|s| s.to_string()).collect()),
                remote: HashMap::new(),
                remote_calls: RefCell::new(Vec::new()),
            }
        }

        fn local_failing() -> Self {
            Self {
                local: Err(Error::git_command_failed("unknown revision")),
                remote: HashMap::new(),
                remote_calls: RefCell::new(Vec::new()),
            }
        }

        fn with_remote(mut self, base: &str, head: &str, files: &[&str]) -> Self {
            self.remote.insert(
                (base.to_string(), head.to_string()),
                files.iter().map(|s| s.to_string()).collect(),
            );
            self
        }
    }

    impl ChangeSource for MockSource {
        fn local_diff(&self, _from: &str, _to: &str) -> Result<Vec<String>> {
            self.local.clone()
        }

        fn remote_compare(&self, base: &str, head: &str) -> Result<Vec<String>> {
            self.remote_calls
                .borrow_mut()
                .push((base.to_string(), head.to_string()));
            self.remote
                .get(&(base.to_string(), head.to_string()))
                .cloned()
                .ok_or_else(|| Error::config_missing_key("compare", None))
        }
    }

    fn registered(folders: &[&str]) -> BTreeSet<String> {
        folders.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn intersects_changed_paths_with_whitelist() {
        let source = MockSource::local_ok(&["a/x", "d/y"]);
        let resolved = resolve("r1", "r2", &registered(&["a", "b", "c"]), &source).unwrap();
        assert_eq!(resolved, registered(&["a"]));
    }

    #[test]
    fn reduces_nested_paths_to_top_segment() {
        let source = MockSource::local_ok(&["app/deep/nested/file.txt", "app/Dockerfile"]);
        let resolved = resolve("r1", "r2", &registered(&["app"]), &source).unwrap();
        assert_eq!(resolved, registered(&["app"]));
    }

    #[test]
    fn top_level_files_do_not_match_folders() {
        let source = MockSource::local_ok(&["README.md"]);
        let resolved = resolve("r1", "r2", &registered(&["app"]), &source).unwrap();
        assert!(resolved.is_empty());
    }

    #[test]
    fn local_success_never_queries_remote() {
        let source = MockSource::local_ok(&["a/x"]);
        resolve("r1", "r2", &registered(&["a"]), &source).unwrap();
        assert!(source.remote_calls.borrow().is_empty());
    }

    #[test]
    fn fallback_unions_both_query_orders() {
        let source = MockSource::local_failing()
            .with_remote("r1", "r2", &["a/x"])
            .with_remote("r2", "r1", &["b/y", "a/x"]);

        let files = remote_union("r1", "r2", &source).unwrap();
        assert_eq!(files, vec!["a/x", "b/y"]);

        let resolved = resolve("r1", "r2", &registered(&["a", "b"]), &source).unwrap();
        assert_eq!(resolved, registered(&["a", "b"]));
    }

    #[test]
    fn fallback_without_compare_config_is_fatal() {
        let source = MockSource::local_failing();
        let err = resolve("r1", "r2", &registered(&["a"]), &source).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::ConfigMissingKey);
    }

    #[test]
    fn malformed_revisions_abort_before_any_diff() {
        let source = MockSource::local_ok(&["a/x"]);
        assert!(resolve("", "r2", &registered(&["a"]), &source).is_err());
        assert!(resolve("r1", "two words", &registered(&["a"]), &source).is_err());
        assert!(resolve("-rf", "r2", &registered(&["a"]), &source).is_err());
    }
}
