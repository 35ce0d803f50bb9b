//! External tool invocations: hadolint, docker buildx, trivy, dockle.
//!
//! The orchestrator only sees the `ImageTools` trait; `DockerTools` is the
//! production implementation shelling out to the real tools. Every call is a
//! blocking subprocess with no core-enforced timeout.

use chrono::Utc;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::{LintThreshold, PipelineConfig, ScannerConfig};
use crate::error::{Error, ErrorCode, Result};
use crate::gh;
use crate::git;
use crate::metadata::ImageMetadata;

pub trait ImageTools {
    fn lint(&self, folder: &str, threshold: LintThreshold) -> Result<()>;
    fn build(
        &self,
        folder: &str,
        meta: &ImageMetadata,
        tags: &[String],
        cache_from: &[String],
    ) -> Result<()>;
    fn scan(&self, scanner: &ScannerConfig, tag: &str) -> Result<()>;
    fn push(&self, folder: &str, tags: &[String]) -> Result<()>;
    fn save(&self, dir: &str, tar_name: &str, tags: &[String]) -> Result<()>;
    fn manifest_exists(&self, tag: &str) -> bool;
}

pub struct DockerTools {
    repo_dir: PathBuf,
    vendor: Option<String>,
    vcs_url: Option<String>,
}

impl DockerTools {
    pub fn new(repo_dir: &Path, config: &PipelineConfig) -> Self {
        Self {
            repo_dir: repo_dir.to_path_buf(),
            vendor: config.vendor.clone(),
            vcs_url: config.vcs_url.clone(),
        }
    }

    fn folder_path(&self, folder: &str) -> PathBuf {
        self.repo_dir.join(folder)
    }

    /// Run a tool streaming its output into the job log.
    fn run_streamed(&self, program: &str, args: &[&str], cwd: Option<&Path>) -> Result<i32> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }

        let status = command.status().map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("run {}", program)))
        })?;

        Ok(status.code().unwrap_or(1))
    }
}

impl ImageTools for DockerTools {
    fn lint(&self, folder: &str, threshold: LintThreshold) -> Result<()> {
        let output = Command::new("hadolint")
            .args(["--failure-threshold", threshold.as_str(), "Dockerfile"])
            .current_dir(self.folder_path(folder))
            .output()
            .map_err(|e| Error::internal_io(e.to_string(), Some("run hadolint".to_string())))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            gh::info(stdout.trim());
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::stage_failed(
                ErrorCode::StageLintFailed,
                folder,
                "Dockerfile failed linter test!",
                output.status.code(),
                stderr,
            ));
        }

        Ok(())
    }

    fn build(
        &self,
        folder: &str,
        meta: &ImageMetadata,
        tags: &[String],
        cache_from: &[String],
    ) -> Result<()> {
        // Several images may build in a single run; prune first so the
        // runner's storage is not exhausted by earlier build caches.
        if self.run_streamed("docker", &["buildx", "prune", "-a", "-f"], None)? != 0 {
            return Err(Error::stage_failed(
                ErrorCode::StageBuildFailed,
                folder,
                "Failed to clean build cache!",
                None,
                String::new(),
            ));
        }
        if self.run_streamed("docker", &["image", "prune", "-f"], None)? != 0 {
            return Err(Error::stage_failed(
                ErrorCode::StageBuildFailed,
                folder,
                "Failed to prune images!",
                None,
                String::new(),
            ));
        }

        let vcs_ref = git::folder_head_hash(&self.repo_dir, folder)?.unwrap_or_default();
        let labels = build_labels(meta, self.vendor.as_deref(), self.vcs_url.as_deref(), &vcs_ref);

        let mut args: Vec<String> = vec![
            "buildx".to_string(),
            "build".to_string(),
            ".".to_string(),
            "--file".to_string(),
            "Dockerfile".to_string(),
            "--output=type=image,push=false".to_string(),
            "--cache-to=type=inline".to_string(),
        ];
        for cache_tag in cache_from {
            args.push(format!("--cache-from=type=registry,ref={}", cache_tag));
        }
        for (key, value) in &labels {
            args.push("--label".to_string());
            args.push(format!("{}={}", key, value));
        }
        for tag in tags {
            args.push("--tag".to_string());
            args.push(tag.clone());
        }

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let folder_path = self.folder_path(folder);
        let exit_code = self.run_streamed("docker", &arg_refs, Some(folder_path.as_path()))?;

        if exit_code != 0 {
            return Err(Error::stage_failed(
                ErrorCode::StageBuildFailed,
                folder,
                "Failed to build!",
                Some(exit_code),
                String::new(),
            ));
        }

        Ok(())
    }

    fn scan(&self, scanner: &ScannerConfig, tag: &str) -> Result<()> {
        let (program, args): (&str, Vec<String>) = match scanner {
            ScannerConfig::Trivy { fail_threshold } => (
                "trivy",
                vec![
                    "image".to_string(),
                    "--exit-code".to_string(),
                    "1".to_string(),
                    "--severity".to_string(),
                    fail_threshold.at_or_above(),
                    tag.to_string(),
                ],
            ),
            ScannerConfig::Dockle { fail_threshold } => (
                "dockle",
                vec![
                    "--exit-code".to_string(),
                    "1".to_string(),
                    "--exit-level".to_string(),
                    fail_threshold.as_str().to_string(),
                    tag.to_string(),
                ],
            ),
        };

        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let exit_code = self.run_streamed(program, &arg_refs, None)?;

        if exit_code != 0 {
            return Err(Error::stage_failed(
                ErrorCode::StageScanFailed,
                tag,
                format!("Image failed {} vulnerability scan!", program),
                Some(exit_code),
                String::new(),
            ));
        }

        Ok(())
    }

    fn push(&self, folder: &str, tags: &[String]) -> Result<()> {
        for tag in tags {
            let exit_code = self.run_streamed("docker", &["push", tag], None)?;
            if exit_code != 0 {
                return Err(Error::stage_failed(
                    ErrorCode::StagePushFailed,
                    folder,
                    format!("Failed to push {}!", tag),
                    Some(exit_code),
                    String::new(),
                ));
            }
        }
        Ok(())
    }

    fn save(&self, dir: &str, tar_name: &str, tags: &[String]) -> Result<()> {
        let expanded = shellexpand::tilde(dir);
        let dir_path = PathBuf::from(expanded.as_ref());
        std::fs::create_dir_all(&dir_path).map_err(|e| {
            Error::internal_io(e.to_string(), Some(format!("create {}", dir_path.display())))
        })?;

        let tar_path = dir_path.join(format!("{}.tar", tar_name));
        let tar_str = tar_path.to_string_lossy().to_string();
        let mut args: Vec<&str> = vec!["save", "-o", &tar_str];
        args.extend(tags.iter().map(String::as_str));

        let exit_code = self.run_streamed("docker", &args, None)?;
        if exit_code != 0 {
            return Err(Error::stage_failed(
                ErrorCode::StageSaveFailed,
                tar_name,
                format!("Failed to save images in {}!", tar_path.display()),
                Some(exit_code),
                String::new(),
            ));
        }

        Ok(())
    }

    fn manifest_exists(&self, tag: &str) -> bool {
        Command::new("docker")
            .args(["manifest", "inspect", tag])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

const LABEL_SCHEMA_PREFIX: &str = "org.label-schema";

/// Provenance labels attached to every built image.
pub fn build_labels(
    meta: &ImageMetadata,
    vendor: Option<&str>,
    vcs_url: Option<&str>,
    vcs_ref: &str,
) -> Vec<(String, String)> {
    let mut labels = Vec::new();

    let fields = [
        ("name", Some(meta.name.as_str())),
        ("version", Some(meta.version.as_str())),
        ("description", meta.description.as_deref()),
        ("maintainer", meta.maintainer.as_deref()),
        ("usage", meta.usage.as_deref()),
        ("url", meta.url.as_deref()),
    ];
    for (field, value) in fields {
        if let Some(value) = value {
            labels.push((format!("{}.{}", LABEL_SCHEMA_PREFIX, field), value.to_string()));
        }
    }

    if let Some(vendor) = vendor {
        labels.push((format!("{}.vendor", LABEL_SCHEMA_PREFIX), vendor.to_string()));
    }
    labels.push((
        format!("{}.build-date", LABEL_SCHEMA_PREFIX),
        Utc::now().to_rfc3339(),
    ));
    if let Some(vcs_url) = vcs_url {
        labels.push((format!("{}.vcs-url", LABEL_SCHEMA_PREFIX), vcs_url.to_string()));
    }
    if !vcs_ref.is_empty() {
        labels.push((format!("{}.vcs-ref", LABEL_SCHEMA_PREFIX), vcs_ref.to_string()));
    }

    labels
}
