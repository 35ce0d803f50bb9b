use clap::{Parser, Subcommand};

use commands::GlobalArgs;

mod commands;
mod output;
mod tty;

use commands::{build, changes, lint, pipeline, tags};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "kiln")]
#[command(version = VERSION)]
#[command(about = "CI pipeline for building and publishing container images from a monorepo")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint / build / publish folders that changed between two commits
    Pipeline(pipeline::PipelineArgs),
    /// Force build and publish folders, ignoring lint, tag existence, and scan errors
    Build(build::BuildArgs),
    /// Lint image folders
    Lint(lint::LintArgs),
    /// Show registered folders that changed between two commits
    Changes(changes::ChangesArgs),
    /// Show the resolved tag sets for one image folder
    Tags(tags::TagsArgs),
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    let global = GlobalArgs {};

    let (json_result, exit_code) = commands::run_json(cli.command, &global);
    let _ = output::print_json_result(json_result);

    std::process::ExitCode::from(exit_code_to_u8(exit_code))
}

fn exit_code_to_u8(code: i32) -> u8 {
    if code <= 0 {
        0
    } else if code >= 255 {
        255
    } else {
        code as u8
    }
}
