//! Per-image stage sequence and run-level failure aggregation.
//!
//! Stage order is cost- and blast-radius-driven: cheap local checks first
//! (files, metadata, collision, published-tag existence), then the expensive
//! build, then post-build verification, then the irreversible publication
//! steps last. A failed stage short-circuits the rest of that image's
//! sequence only; the run always completes the full image set before
//! deciding the overall result.

use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::collision::TagRegistry;
use crate::config::PipelineConfig;
use crate::docker::ImageTools;
use crate::error::{Error, Result};
use crate::gh;
use crate::metadata::{self, METADATA_FILE};
use crate::tags::TagPlan;

pub const DOCKERFILE: &str = "Dockerfile";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitResult {
    pub folder: String,
    pub succeeded: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineReport {
    pub results: Vec<UnitResult>,
    pub failed: Vec<String>,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn exit_code(&self) -> i32 {
        if self.succeeded() {
            0
        } else {
            1
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Deliberate re-publication: skips the published-tag existence check and
    /// lint/scan gating. The in-run collision guard is always enforced.
    pub force: bool,
    /// Destination for `docker save` tarballs; save only runs when set.
    pub save_dir: Option<String>,
}

pub struct Pipeline<'a> {
    repo_dir: PathBuf,
    config: &'a PipelineConfig,
    plan: TagPlan,
    tools: &'a dyn ImageTools,
    options: PipelineOptions,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        repo_dir: &Path,
        config: &'a PipelineConfig,
        tools: &'a dyn ImageTools,
        options: PipelineOptions,
    ) -> Result<Self> {
        Ok(Self {
            repo_dir: repo_dir.to_path_buf(),
            config,
            plan: TagPlan::from_config(config)?,
            tools,
            options,
        })
    }

    /// Drive every folder in `changed` through the full stage sequence.
    ///
    /// The collision registry is seeded from `unchanged` (their tags are
    /// already live) before the first claim is evaluated.
    pub fn run(&self, changed: &BTreeSet<String>, unchanged: &BTreeSet<String>) -> PipelineReport {
        let mut registry = TagRegistry::seed(&self.repo_dir, unchanged);

        self.run_units(changed, |folder| self.run_unit(folder, &mut registry))
    }

    /// Files + metadata + lint stages only.
    pub fn lint(&self, folders: &BTreeSet<String>) -> PipelineReport {
        self.run_units(folders, |folder| {
            self.required_files(folder)?;
            metadata::load(&self.repo_dir, folder, true)?;
            gh::stage("Lint Dockerfile");
            self.tools.lint(folder, self.config.lint_fail_threshold)?;
            gh::info(">> Lint successful! <<");
            Ok(())
        })
    }

    fn run_units(
        &self,
        folders: &BTreeSet<String>,
        mut run: impl FnMut(&str) -> Result<()>,
    ) -> PipelineReport {
        let mut results = Vec::with_capacity(folders.len());
        let mut failed = Vec::new();

        for folder in folders {
            let outcome = {
                let _group = gh::Group::open(folder);
                run(folder)
            };

            match outcome {
                Ok(()) => results.push(UnitResult {
                    folder: folder.clone(),
                    succeeded: true,
                }),
                Err(err) => {
                    gh::error(&format!("{}: {}", folder, err.message));
                    for hint in &err.hints {
                        gh::info(&hint.message);
                    }
                    results.push(UnitResult {
                        folder: folder.clone(),
                        succeeded: false,
                    });
                    failed.push(folder.clone());
                }
            }
        }

        if !failed.is_empty() {
            gh::error(&format!(
                "The following images failed to build: {}",
                failed.join(", ")
            ));
        }

        PipelineReport { results, failed }
    }

    fn run_unit(&self, folder: &str, registry: &mut TagRegistry) -> Result<()> {
        self.required_files(folder)?;
        let meta = metadata::load(&self.repo_dir, folder, true)?;

        // In-run uniqueness is enforced unconditionally; force mode only
        // bypasses checks against the already-published state.
        registry.claim(&meta)?;

        let tags = self.plan.resolve(&meta);

        if !self.options.force {
            gh::stage("Check Published Tags");
            for tag in &tags.existence {
                if self.tools.manifest_exists(tag) {
                    return Err(Error::tag_already_published(tag, folder));
                }
            }
        }

        if !self.options.force {
            gh::stage("Lint Dockerfile");
            self.tools.lint(folder, self.config.lint_fail_threshold)?;
            gh::info(">> Lint successful! <<");
        }

        gh::stage("Build Image");
        self.tools
            .build(folder, &meta, &tags.build_tags(), &tags.cache)?;
        gh::info(">> Successfully built! <<");

        if !self.options.force {
            for scanner in &self.config.scanners {
                gh::stage("Scan Image for Vulnerabilities");
                self.tools.scan(scanner, &tags.local)?;
            }
        }

        if let Some(save_dir) = &self.options.save_dir {
            if !tags.save.is_empty() {
                gh::stage("Save Image");
                self.tools.save(save_dir, &meta.name, &tags.save)?;
                gh::info(">> Successfully saved! <<");
            }
        }

        if !tags.push.is_empty() {
            gh::stage("Push Image");
            self.tools.push(folder, &tags.push)?;
            gh::info(">> Successfully pushed! <<");
        }

        Ok(())
    }

    fn required_files(&self, folder: &str) -> Result<()> {
        let folder_path = self.repo_dir.join(folder);
        if !folder_path.join(DOCKERFILE).is_file() {
            return Err(Error::required_file_missing(folder, DOCKERFILE));
        }
        if !folder_path.join(METADATA_FILE).is_file() {
            return Err(Error::required_file_missing(folder, METADATA_FILE));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LintThreshold, ScannerConfig};
    use crate::error::ErrorCode;
    use crate::metadata::ImageMetadata;
    use std::cell::RefCell;
    use std::collections::HashSet;

    #[derive(Default)]
    struct MockTools {
        calls: RefCell<Vec<String>>,
        fail_lint_for: HashSet<String>,
        fail_build_for: HashSet<String>,
        published: HashSet<String>,
    }

    impl MockTools {
        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }

        fn record(&self, call: String) {
            self.calls.borrow_mut().push(call);
        }
    }

    impl ImageTools for MockTools {
        fn lint(&self, folder: &str, _threshold: LintThreshold) -> Result<()> {
            self.record(format!("lint:{}", folder));
            if self.fail_lint_for.contains(folder) {
                return Err(Error::stage_failed(
                    ErrorCode::StageLintFailed,
                    folder,
                    "Dockerfile failed linter test!",
                    Some(1),
                    String::new(),
                ));
            }
            Ok(())
        }

        fn build(
            &self,
            folder: &str,
            _meta: &ImageMetadata,
            tags: &[String],
            _cache_from: &[String],
        ) -> Result<()> {
            self.record(format!("build:{}:{}", folder, tags.join("+")));
            if self.fail_build_for.contains(folder) {
                return Err(Error::stage_failed(
                    ErrorCode::StageBuildFailed,
                    folder,
                    "Failed to build!",
                    Some(1),
                    String::new(),
                ));
            }
            Ok(())
        }

        fn scan(&self, scanner: &ScannerConfig, tag: &str) -> Result<()> {
            let tool = match scanner {
                ScannerConfig::Trivy { .. } => "trivy",
                ScannerConfig::Dockle { .. } => "dockle",
            };
            self.record(format!("scan:{}:{}", tool, tag));
            Ok(())
        }

        fn push(&self, folder: &str, tags: &[String]) -> Result<()> {
            self.record(format!("push:{}:{}", folder, tags.join("+")));
            Ok(())
        }

        fn save(&self, dir: &str, tar_name: &str, tags: &[String]) -> Result<()> {
            self.record(format!("save:{}:{}:{}", dir, tar_name, tags.join("+")));
            Ok(())
        }

        fn manifest_exists(&self, tag: &str) -> bool {
            self.record(format!("exists:{}", tag));
            self.published.contains(tag)
        }
    }

    fn write_unit(repo: &Path, folder: &str, name: &str, version: &str) {
        let path = repo.join(folder);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(DOCKERFILE), "FROM scratch\n").unwrap();
        std::fs::write(
            path.join(METADATA_FILE),
            format!("name: {}\nversion: {}\n", name, version),
        )
        .unwrap();
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            push_templates: vec!["reg.example/{name}:{version}".to_string()],
            existence_templates: vec!["reg.example/{name}:{version}".to_string()],
            scanners: vec![
                ScannerConfig::Trivy {
                    fail_threshold: crate::config::TrivySeverity::High,
                },
                ScannerConfig::Dockle {
                    fail_threshold: crate::config::DockleLevel::Warn,
                },
            ],
            ..PipelineConfig::default()
        }
    }

    fn folders(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn successful_unit_runs_all_stages_in_order() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "app", "app", "1.0.0");

        let tools = MockTools::default();
        let cfg = config();
        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();
        let report = pipeline.run(&folders(&["app"]), &BTreeSet::new());

        assert!(report.succeeded());
        assert_eq!(
            tools.calls(),
            vec![
                "exists:reg.example/app:1.0.0",
                "lint:app",
                "build:app:app:1.0.0+reg.example/app:1.0.0",
                "scan:trivy:app:1.0.0",
                "scan:dockle:app:1.0.0",
                "push:app:reg.example/app:1.0.0",
            ]
        );
    }

    #[test]
    fn lint_failure_short_circuits_remaining_stages() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "app", "app", "1.0.0");

        let tools = MockTools {
            fail_lint_for: ["app".to_string()].into_iter().collect(),
            ..MockTools::default()
        };
        let cfg = config();
        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();
        let report = pipeline.run(&folders(&["app"]), &BTreeSet::new());

        assert_eq!(report.failed, vec!["app"]);
        let calls = tools.calls();
        assert!(calls.iter().all(|c| !c.starts_with("build:")));
        assert!(calls.iter().all(|c| !c.starts_with("scan:")));
        assert!(calls.iter().all(|c| !c.starts_with("push:")));
        assert!(calls.iter().all(|c| !c.starts_with("save:")));
    }

    #[test]
    fn unit_failure_does_not_abort_siblings() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "bad", "bad", "1.0.0");
        write_unit(dir.path(), "good", "good", "2.0.0");

        let tools = MockTools {
            fail_build_for: ["bad".to_string()].into_iter().collect(),
            ..MockTools::default()
        };
        let cfg = config();
        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();
        let report = pipeline.run(&folders(&["bad", "good"]), &BTreeSet::new());

        assert_eq!(report.failed, vec!["bad"]);
        assert_eq!(report.results.len(), 2);
        assert!(tools
            .calls()
            .contains(&"push:good:reg.example/good:2.0.0".to_string()));
    }

    #[test]
    fn published_tag_fails_unit_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "app", "app", "1.0.0");

        let tools = MockTools {
            published: ["reg.example/app:1.0.0".to_string()].into_iter().collect(),
            ..MockTools::default()
        };
        let cfg = config();

        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();
        let report = pipeline.run(&folders(&["app"]), &BTreeSet::new());
        assert_eq!(report.failed, vec!["app"]);
        assert!(tools.calls().iter().all(|c| !c.starts_with("build:")));
    }

    #[test]
    fn force_skips_existence_lint_and_scan_but_not_collision() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "app", "app", "1.0.0");
        // An unchanged folder already owns the version tag 1.0.0.
        let live = dir.path().join("live");
        std::fs::create_dir_all(&live).unwrap();
        std::fs::write(live.join(METADATA_FILE), "name: live\nversion: 1.0.0\n").unwrap();

        let tools = MockTools {
            published: ["reg.example/app:1.0.0".to_string()].into_iter().collect(),
            ..MockTools::default()
        };
        let cfg = config();
        let pipeline = Pipeline::new(
            dir.path(),
            &cfg,
            &tools,
            PipelineOptions {
                force: true,
                save_dir: None,
            },
        )
        .unwrap();

        // Collision with the seeded folder still fails the unit in force mode.
        let report = pipeline.run(&folders(&["app"]), &folders(&["live"]));
        assert_eq!(report.failed, vec!["app"]);
        assert!(tools.calls().is_empty());

        // Without the collision, force mode goes straight to build and push.
        let tools = MockTools {
            published: ["reg.example/app:1.0.0".to_string()].into_iter().collect(),
            ..MockTools::default()
        };
        let pipeline = Pipeline::new(
            dir.path(),
            &cfg,
            &tools,
            PipelineOptions {
                force: true,
                save_dir: None,
            },
        )
        .unwrap();
        let report = pipeline.run(&folders(&["app"]), &BTreeSet::new());
        assert!(report.succeeded());
        assert_eq!(
            tools.calls(),
            vec![
                "build:app:app:1.0.0+reg.example/app:1.0.0",
                "push:app:reg.example/app:1.0.0",
            ]
        );
    }

    #[test]
    fn save_runs_before_push_when_both_configured() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "app", "app", "1.0.0");

        let tools = MockTools::default();
        let mut cfg = config();
        cfg.save_templates = vec!["{name}:{version}".to_string()];
        let pipeline = Pipeline::new(
            dir.path(),
            &cfg,
            &tools,
            PipelineOptions {
                force: false,
                save_dir: Some("/tmp/artifacts".to_string()),
            },
        )
        .unwrap();

        let report = pipeline.run(&folders(&["app"]), &BTreeSet::new());
        assert!(report.succeeded());

        let calls = tools.calls();
        let save_pos = calls.iter().position(|c| c.starts_with("save:")).unwrap();
        let push_pos = calls.iter().position(|c| c.starts_with("push:")).unwrap();
        assert!(save_pos < push_pos);
        assert_eq!(calls[save_pos], "save:/tmp/artifacts:app:app:1.0.0");
    }

    #[test]
    fn save_skipped_without_destination() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "app", "app", "1.0.0");

        let tools = MockTools::default();
        let mut cfg = config();
        cfg.save_templates = vec!["{name}:{version}".to_string()];
        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();

        pipeline.run(&folders(&["app"]), &BTreeSet::new());
        assert!(tools.calls().iter().all(|c| !c.starts_with("save:")));
    }

    #[test]
    fn two_changed_units_cannot_claim_the_same_tag() {
        let dir = tempfile::tempdir().unwrap();
        // Different folders, same image name and version: identical tags.
        write_unit(dir.path(), "first", "dup", "1.0.0");
        write_unit(dir.path(), "second", "dup", "1.0.0");

        let tools = MockTools::default();
        let cfg = config();
        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();
        let report = pipeline.run(&folders(&["first", "second"]), &BTreeSet::new());

        assert_eq!(report.failed, vec!["second"]);
        let builds: Vec<_> = tools
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("build:"))
            .collect();
        assert_eq!(builds.len(), 1);
    }

    #[test]
    fn missing_dockerfile_fails_before_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(METADATA_FILE), "name: app\nversion: 1.0.0\n").unwrap();

        let tools = MockTools::default();
        let cfg = config();
        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();
        let report = pipeline.run(&folders(&["app"]), &BTreeSet::new());

        assert_eq!(report.failed, vec!["app"]);
        assert!(tools.calls().is_empty());
    }

    #[test]
    fn lint_mode_runs_only_lint_stages() {
        let dir = tempfile::tempdir().unwrap();
        write_unit(dir.path(), "app", "app", "1.0.0");

        let tools = MockTools::default();
        let cfg = config();
        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();
        let report = pipeline.lint(&folders(&["app"]));

        assert!(report.succeeded());
        assert_eq!(tools.calls(), vec!["lint:app"]);
    }

    #[test]
    fn lint_mode_reports_invalid_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app");
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(DOCKERFILE), "FROM scratch\n").unwrap();
        std::fs::write(path.join(METADATA_FILE), "name: app\nversion: nope\n").unwrap();

        let tools = MockTools::default();
        let cfg = config();
        let pipeline =
            Pipeline::new(dir.path(), &cfg, &tools, PipelineOptions::default()).unwrap();
        let report = pipeline.lint(&folders(&["app"]));

        assert_eq!(report.failed, vec!["app"]);
        assert!(tools.calls().is_empty());
    }
}
