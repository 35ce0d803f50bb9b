//! Cross-image tag claim registry.
//!
//! Two folders publishing the same identifier is undefined behavior for
//! downstream consumers, so every declared tag has exactly one owner for the
//! lifetime of a run. The registry is seeded from the folders *not* being
//! rebuilt (their tags are already live) before any changed folder claims.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use crate::error::{Error, Result};
use crate::metadata::{self, ImageMetadata};

#[derive(Debug, Default)]
pub struct TagRegistry {
    claims: HashMap<String, String>,
}

impl TagRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry with every declared tag of the unchanged folders.
    ///
    /// Metadata is loaded quietly and folders with invalid or missing
    /// metadata are skipped: they are not part of this run, and the seed
    /// phase must not spam the workflow log with their errors.
    pub fn seed(repo_dir: &Path, unchanged: &BTreeSet<String>) -> Self {
        let mut registry = Self::new();
        for folder in unchanged {
            let Ok(meta) = metadata::load(repo_dir, folder, true) else {
                continue;
            };
            for tag in meta.declared_tags() {
                registry.claims.entry(tag).or_insert_with(|| folder.clone());
            }
        }
        registry
    }

    /// Claim every declared tag for one image, atomically.
    ///
    /// If any single tag is already owned by a different folder the whole
    /// claim fails without registering anything, naming the colliding
    /// identifier and its owner. On success all tags are registered, so two
    /// changed folders processed in the same run cannot collide either.
    pub fn claim(&mut self, meta: &ImageMetadata) -> Result<()> {
        let tags = meta.declared_tags();

        for tag in &tags {
            if let Some(owner) = self.claims.get(tag) {
                if owner != &meta.folder {
                    return Err(Error::tag_collision(tag, &meta.folder, owner));
                }
            }
        }

        for tag in tags {
            self.claims.insert(tag, meta.folder.clone());
        }

        Ok(())
    }

    pub fn owner(&self, tag: &str) -> Option<&str> {
        self.claims.get(tag).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.claims.len()
    }

    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}
