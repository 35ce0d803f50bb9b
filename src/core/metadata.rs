//! Image folder metadata (`metadata.yml`).

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Error, Result};
use crate::gh;

pub const METADATA_FILE: &str = "metadata.yml";

/// One independently versioned image definition, parsed once per run and
/// immutable afterwards.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadata {
    /// Folder key identifying the image within the monorepo.
    pub folder: String,
    pub name: String,
    pub version: String,
    pub mutable_tags: Vec<String>,
    pub immutable_tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintainer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    name: Option<String>,
    version: Option<String>,
    #[serde(default)]
    mutable_tags: Vec<String>,
    #[serde(default)]
    immutable_tags: Vec<String>,
    description: Option<String>,
    maintainer: Option<String>,
    usage: Option<String>,
    url: Option<String>,
}

impl ImageMetadata {
    /// Every tag the image declares for itself: version plus the mutable and
    /// immutable suffix lists. This is the identifier set the collision
    /// registry operates on.
    pub fn declared_tags(&self) -> Vec<String> {
        let mut tags = Vec::with_capacity(1 + self.mutable_tags.len() + self.immutable_tags.len());
        tags.push(self.version.clone());
        tags.extend(self.mutable_tags.iter().cloned());
        tags.extend(self.immutable_tags.iter().cloned());
        tags
    }
}

/// Load and validate a folder's metadata.
///
/// `quiet` suppresses workflow-log error output for speculative loads (the
/// collision-seed phase loads every unchanged folder and tolerates failures);
/// the returned error is the same either way.
pub fn load(repo_dir: &Path, folder: &str, quiet: bool) -> Result<ImageMetadata> {
    let result = parse(repo_dir, folder);
    if let Err(err) = &result {
        if !quiet {
            gh::error(&err.message);
        }
    }
    result
}

fn parse(repo_dir: &Path, folder: &str) -> Result<ImageMetadata> {
    let path = repo_dir.join(folder).join(METADATA_FILE);
    let content = std::fs::read_to_string(&path).map_err(|e| {
        Error::metadata_missing(folder, format!("Failed to read {}: {}", path.display(), e))
    })?;

    let raw: RawMetadata = serde_yml::from_str(&content).map_err(|e| {
        Error::metadata_invalid(folder, None, format!("Unexpected metadata.yml format: {}", e))
    })?;

    let name = raw
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| {
            Error::metadata_invalid(
                folder,
                Some("name".to_string()),
                "'name' field missing in metadata.yml",
            )
        })?;

    let version = raw
        .version
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            Error::metadata_invalid(
                folder,
                Some("version".to_string()),
                "'version' field missing in metadata.yml",
            )
        })?;

    if version == "latest" {
        return Err(Error::metadata_invalid(
            folder,
            Some("version".to_string()),
            "'version' field is prohibited to be 'latest'",
        ));
    }

    let version_pattern = Regex::new(r"^\d+\.\d+\.\d+$").expect("Invalid regex pattern");
    if !version_pattern.is_match(&version) {
        return Err(Error::metadata_invalid(
            folder,
            Some("version".to_string()),
            format!("'version' must be major.minor.patch, got '{}'", version),
        ));
    }

    Ok(ImageMetadata {
        folder: folder.to_string(),
        name,
        version,
        mutable_tags: raw.mutable_tags,
        immutable_tags: raw.immutable_tags,
        description: raw.description.filter(|s| !s.is_empty()),
        maintainer: raw.maintainer.filter(|s| !s.is_empty()),
        usage: raw.usage.filter(|s| !s.is_empty()),
        url: raw.url.filter(|s| !s.is_empty()),
    })
}
