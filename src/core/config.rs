//! Pipeline configuration (`kiln.json`).
//!
//! Read once from the monorepo root at run start. A missing file means
//! defaults; a malformed file or invalid value is a fatal configuration
//! error, reported before any image folder is processed.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::template;

pub const CONFIG_FILE: &str = "kiln.json";

const DEFAULT_FOLDERS_FILE: &str = "build_folders.txt";
const DEFAULT_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Registered-folders whitelist file, one folder key per line.
    #[serde(default = "default_folders_file")]
    pub folders_file: String,

    /// Template lists for the four purpose-specific tag sets.
    #[serde(default)]
    pub push_templates: Vec<String>,
    #[serde(default)]
    pub save_templates: Vec<String>,
    #[serde(default)]
    pub existence_templates: Vec<String>,
    #[serde(default)]
    pub cache_templates: Vec<String>,

    /// Provenance labels attached to built images.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcs_url: Option<String>,

    #[serde(default)]
    pub lint_fail_threshold: LintThreshold,

    #[serde(default = "default_scanners")]
    pub scanners: Vec<ScannerConfig>,

    /// Remote compare fallback for change-set resolution. Optional: without
    /// it, a failed local diff is fatal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compare: Option<CompareConfig>,

    /// Default save destination; the --save-dir flag overrides it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_dir: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            folders_file: default_folders_file(),
            push_templates: Vec::new(),
            save_templates: Vec::new(),
            existence_templates: Vec::new(),
            cache_templates: Vec::new(),
            vendor: None,
            vcs_url: None,
            lint_fail_threshold: LintThreshold::default(),
            scanners: default_scanners(),
            compare: None,
            save_dir: None,
        }
    }
}

fn default_folders_file() -> String {
    DEFAULT_FOLDERS_FILE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareConfig {
    /// Endpoint with `{base}` and `{head}` placeholders, e.g. the GitHub
    /// compare API for the monorepo.
    pub url_template: String,
    /// Environment variable holding the access credential.
    #[serde(default = "default_token_env")]
    pub token_env: String,
}

fn default_token_env() -> String {
    DEFAULT_TOKEN_ENV.to_string()
}

/// hadolint failure threshold: findings at or above this severity fail lint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LintThreshold {
    #[default]
    Error,
    Warning,
    Info,
    Style,
}

impl LintThreshold {
    pub fn as_str(&self) -> &'static str {
        match self {
            LintThreshold::Error => "error",
            LintThreshold::Warning => "warning",
            LintThreshold::Info => "info",
            LintThreshold::Style => "style",
        }
    }
}

/// Trivy severity scale, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrivySeverity {
    Unknown,
    Low,
    Medium,
    High,
    Critical,
}

impl TrivySeverity {
    const ALL: [TrivySeverity; 5] = [
        TrivySeverity::Unknown,
        TrivySeverity::Low,
        TrivySeverity::Medium,
        TrivySeverity::High,
        TrivySeverity::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TrivySeverity::Unknown => "UNKNOWN",
            TrivySeverity::Low => "LOW",
            TrivySeverity::Medium => "MEDIUM",
            TrivySeverity::High => "HIGH",
            TrivySeverity::Critical => "CRITICAL",
        }
    }

    /// Comma-separated severity list at or above this threshold, the shape
    /// trivy's `--severity` flag expects.
    pub fn at_or_above(&self) -> String {
        Self::ALL
            .iter()
            .filter(|s| *s >= self)
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Dockle exit level scale, ordered weakest to strongest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DockleLevel {
    Info,
    Warn,
    Fatal,
}

impl DockleLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DockleLevel::Info => "info",
            DockleLevel::Warn => "warn",
            DockleLevel::Fatal => "fatal",
        }
    }
}

/// One configured vulnerability scanner with its failure threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "tool", rename_all = "lowercase")]
pub enum ScannerConfig {
    Trivy {
        #[serde(default = "default_trivy_threshold")]
        fail_threshold: TrivySeverity,
    },
    Dockle {
        #[serde(default = "default_dockle_threshold")]
        fail_threshold: DockleLevel,
    },
}

fn default_trivy_threshold() -> TrivySeverity {
    TrivySeverity::High
}

fn default_dockle_threshold() -> DockleLevel {
    DockleLevel::Warn
}

fn default_scanners() -> Vec<ScannerConfig> {
    vec![
        ScannerConfig::Trivy {
            fail_threshold: default_trivy_threshold(),
        },
        ScannerConfig::Dockle {
            fail_threshold: default_dockle_threshold(),
        },
    ]
}

/// Read `kiln.json` from the monorepo root. A missing file yields defaults.
pub fn load(repo_dir: &Path) -> Result<PipelineConfig> {
    let path = repo_dir.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(PipelineConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::internal_io(e.to_string(), Some(format!("read {}", path.display()))))?;

    let config: PipelineConfig = serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))?;

    validate(&config)?;
    Ok(config)
}

/// Fail fast on values that would otherwise surface mid-run: bad templates
/// and a compare endpoint missing its placeholders.
fn validate(config: &PipelineConfig) -> Result<()> {
    for (key, templates) in [
        ("push_templates", &config.push_templates),
        ("save_templates", &config.save_templates),
        ("existence_templates", &config.existence_templates),
        ("cache_templates", &config.cache_templates),
    ] {
        template::parse_all(templates).map_err(|e| {
            Error::config_invalid_value(key, None, e.message)
        })?;
    }

    if let Some(compare) = &config.compare {
        if !compare.url_template.contains("{base}") || !compare.url_template.contains("{head}") {
            return Err(Error::config_invalid_value(
                "compare.url_template",
                Some(compare.url_template.clone()),
                "template must contain {base} and {head} placeholders",
            ));
        }
        if compare.token_env.trim().is_empty() {
            return Err(Error::config_invalid_value(
                "compare.token_env",
                None,
                "token environment variable name cannot be empty",
            ));
        }
    }

    Ok(())
}
