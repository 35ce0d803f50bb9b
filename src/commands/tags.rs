use clap::Args;
use serde::Serialize;

use kiln::config;
use kiln::metadata;
use kiln::tags::{ResolvedTags, TagPlan};

use crate::commands::{repo_dir, CmdResult};

#[derive(Args)]
pub struct TagsArgs {
    /// Image folder to resolve tags for
    pub folder: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsOutput {
    #[serde(flatten)]
    pub tags: ResolvedTags,
    pub build: Vec<String>,
}

pub fn run(args: TagsArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<TagsOutput> {
    let repo = repo_dir()?;
    let config = config::load(&repo)?;

    let meta = metadata::load(&repo, &args.folder, true)?;
    let plan = TagPlan::from_config(&config)?;
    let tags = plan.resolve(&meta);
    let build = tags.build_tags();

    Ok((TagsOutput { tags, build }, 0))
}
