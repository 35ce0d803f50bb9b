//! Purpose-specific tag sets per image.
//!
//! Four independently configured template lists (existence-check, cache
//! source, push, save) plus one unconditional local identifier
//! (`name:version`, never templated). The build set is the union of push,
//! save, and local: an image is always at least locally tagged even when
//! nothing is published.

use serde::Serialize;
use std::collections::HashSet;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::metadata::ImageMetadata;
use crate::template::{self, TagTemplate};

/// Parsed template lists, built once per run from the pipeline config.
pub struct TagPlan {
    push: Vec<TagTemplate>,
    save: Vec<TagTemplate>,
    existence: Vec<TagTemplate>,
    cache: Vec<TagTemplate>,
}

impl TagPlan {
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            push: template::parse_all(&config.push_templates)?,
            save: template::parse_all(&config.save_templates)?,
            existence: template::parse_all(&config.existence_templates)?,
            cache: template::parse_all(&config.cache_templates)?,
        })
    }

    pub fn resolve(&self, meta: &ImageMetadata) -> ResolvedTags {
        ResolvedTags {
            folder: meta.folder.clone(),
            local: format!("{}:{}", meta.name, meta.version),
            push: template::expand_all(&self.push, meta),
            save: template::expand_all(&self.save, meta),
            existence: template::expand_all(&self.existence, meta),
            cache: template::expand_all(&self.cache, meta),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedTags {
    pub folder: String,
    pub local: String,
    pub push: Vec<String>,
    pub save: Vec<String>,
    pub existence: Vec<String>,
    pub cache: Vec<String>,
}

impl ResolvedTags {
    /// Identifiers attached to the artifact at build time: local plus
    /// everything that will be pushed or saved.
    pub fn build_tags(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(1 + self.push.len() + self.save.len());
        let mut seen = HashSet::new();
        for tag in std::iter::once(&self.local)
            .chain(self.push.iter())
            .chain(self.save.iter())
        {
            if seen.insert(tag.clone()) {
                out.push(tag.clone());
            }
        }
        out
    }
}
