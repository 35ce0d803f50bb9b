use clap::Args;
use serde::Serialize;

use kiln::config;
use kiln::docker::DockerTools;
use kiln::gh;
use kiln::pipeline::{Pipeline, PipelineOptions, UnitResult};
use kiln::registry;

use crate::commands::{repo_dir, CmdResult};

#[derive(Args)]
pub struct LintArgs {
    /// Image folders to lint
    pub folders: Vec<String>,

    /// Lint every registered folder
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LintOutput {
    pub folders: Vec<String>,
    pub results: Vec<UnitResult>,
    pub failed: Vec<String>,
}

pub fn run(args: LintArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<LintOutput> {
    let repo = repo_dir()?;
    let config = config::load(&repo)?;
    let registered = registry::registered_folders(&repo, &config.folders_file)?;

    let selected = super::build::select_folders(&args.folders, args.all, &registered)?;

    let tools = DockerTools::new(&repo, &config);
    let pipeline = Pipeline::new(&repo, &config, &tools, PipelineOptions::default())?;
    let report = pipeline.lint(&selected);

    if report.succeeded() {
        gh::info("Successfully linted all images!");
    }

    let exit_code = report.exit_code();
    Ok((
        LintOutput {
            folders: selected.into_iter().collect(),
            results: report.results,
            failed: report.failed,
        },
        exit_code,
    ))
}
