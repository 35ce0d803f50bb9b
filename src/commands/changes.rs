use clap::Args;
use serde::Serialize;

use kiln::changeset::{self, GitChangeSource};
use kiln::config;
use kiln::registry;

use crate::commands::{repo_dir, CmdResult};

#[derive(Args)]
pub struct ChangesArgs {
    /// Commit SHA from which to search for changes (exclusive)
    pub from_rev: String,

    /// Commit SHA to which to search for changes (inclusive)
    pub to_rev: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangesOutput {
    pub from_rev: String,
    pub to_rev: String,
    pub changed: Vec<String>,
}

pub fn run(args: ChangesArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<ChangesOutput> {
    let repo = repo_dir()?;
    let config = config::load(&repo)?;
    let registered = registry::registered_folders(&repo, &config.folders_file)?;

    let source = GitChangeSource::new(&repo, &config);
    let changed = changeset::resolve(&args.from_rev, &args.to_rev, &registered, &source)?;

    Ok((
        ChangesOutput {
            from_rev: args.from_rev,
            to_rev: args.to_rev,
            changed: changed.into_iter().collect(),
        },
        0,
    ))
}
