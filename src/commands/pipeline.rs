use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;

use kiln::changeset::{self, GitChangeSource};
use kiln::config;
use kiln::docker::DockerTools;
use kiln::gh;
use kiln::pipeline::{Pipeline, PipelineOptions, UnitResult};
use kiln::registry;

use crate::commands::{repo_dir, CmdResult};

#[derive(Args)]
pub struct PipelineArgs {
    /// Commit SHA from which to search for changes (exclusive)
    pub from_rev: String,

    /// Commit SHA to which to search for changes (inclusive)
    pub to_rev: String,

    /// Save built images to DIR (overrides save_dir in kiln.json)
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<String>,

    /// Republish deliberately: skip the published-tag check and lint/scan gating
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRunOutput {
    pub changed: Vec<String>,
    pub results: Vec<UnitResult>,
    pub failed: Vec<String>,
}

pub fn run(args: PipelineArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<PipelineRunOutput> {
    let repo = repo_dir()?;
    let config = config::load(&repo)?;
    let registered = registry::registered_folders(&repo, &config.folders_file)?;

    let source = GitChangeSource::new(&repo, &config);
    let changed = changeset::resolve(&args.from_rev, &args.to_rev, &registered, &source)?;

    kiln::log_status!(
        "pipeline",
        "{} of {} registered folders changed",
        changed.len(),
        registered.len()
    );
    gh::info(&format!(
        "Detected changes in folders: {}",
        changed.iter().cloned().collect::<Vec<_>>().join(", ")
    ));

    let unchanged: BTreeSet<String> = registered.difference(&changed).cloned().collect();

    let tools = DockerTools::new(&repo, &config);
    let options = PipelineOptions {
        force: args.force,
        save_dir: args.save_dir.or_else(|| config.save_dir.clone()),
    };
    let pipeline = Pipeline::new(&repo, &config, &tools, options)?;
    let report = pipeline.run(&changed, &unchanged);

    if report.succeeded() {
        gh::info("Successfully built all images!");
    }

    let exit_code = report.exit_code();
    Ok((
        PipelineRunOutput {
            changed: changed.into_iter().collect(),
            results: report.results,
            failed: report.failed,
        },
        exit_code,
    ))
}
