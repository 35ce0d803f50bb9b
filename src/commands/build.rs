use clap::Args;
use serde::Serialize;
use std::collections::BTreeSet;

use kiln::config;
use kiln::docker::DockerTools;
use kiln::pipeline::{Pipeline, PipelineOptions, UnitResult};
use kiln::registry;

use crate::commands::{repo_dir, CmdResult};

#[derive(Args)]
pub struct BuildArgs {
    /// Image folders to force build
    pub folders: Vec<String>,

    /// Force build every registered folder
    #[arg(long)]
    pub all: bool,

    /// Save built images to DIR (overrides save_dir in kiln.json)
    #[arg(long, value_name = "DIR")]
    pub save_dir: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildOutput {
    pub folders: Vec<String>,
    pub results: Vec<UnitResult>,
    pub failed: Vec<String>,
}

/// Force build: rebuild and republish the selected folders, skipping the
/// published-tag check and lint/scan gating. The in-run collision guard is
/// still enforced.
pub fn run(args: BuildArgs, _global: &crate::commands::GlobalArgs) -> CmdResult<BuildOutput> {
    let repo = repo_dir()?;
    let config = config::load(&repo)?;
    let registered = registry::registered_folders(&repo, &config.folders_file)?;

    let selected = select_folders(&args.folders, args.all, &registered)?;
    let unchanged: BTreeSet<String> = registered.difference(&selected).cloned().collect();

    kiln::log_status!("build", "Force building {} folders", selected.len());

    let tools = DockerTools::new(&repo, &config);
    let options = PipelineOptions {
        force: true,
        save_dir: args.save_dir.or_else(|| config.save_dir.clone()),
    };
    let pipeline = Pipeline::new(&repo, &config, &tools, options)?;
    let report = pipeline.run(&selected, &unchanged);

    let exit_code = report.exit_code();
    Ok((
        BuildOutput {
            folders: selected.into_iter().collect(),
            results: report.results,
            failed: report.failed,
        },
        exit_code,
    ))
}

/// Intersect the requested folders with the registered whitelist; only
/// registered folders are ever built.
pub(crate) fn select_folders(
    requested: &[String],
    all: bool,
    registered: &BTreeSet<String>,
) -> kiln::Result<BTreeSet<String>> {
    if all {
        return Ok(registered.clone());
    }

    if requested.is_empty() {
        return Err(kiln::Error::validation_missing_argument(vec![
            "folders".to_string(),
        ])
        .with_hint("Name folders to build, or pass --all for every registered folder"));
    }

    let selected: BTreeSet<String> = requested
        .iter()
        .filter(|f| registered.contains(*f))
        .cloned()
        .collect();

    if selected.is_empty() {
        return Err(kiln::Error::validation_invalid_argument(
            "folders",
            "None of the specified folders are registered",
            None,
            Some(registered.iter().cloned().collect()),
        ));
    }

    Ok(selected)
}
