use std::path::PathBuf;

pub type CmdResult<T> = kiln::Result<(T, i32)>;

pub(crate) struct GlobalArgs {}

pub mod build;
pub mod changes;
pub mod lint;
pub mod pipeline;
pub mod tags;

/// All commands operate on the monorepo at the current working directory.
pub(crate) fn repo_dir() -> kiln::Result<PathBuf> {
    std::env::current_dir()
        .map_err(|e| kiln::Error::internal_io(e.to_string(), Some("get current directory".to_string())))
}

/// Dispatch a command to its handler and map result to JSON.
macro_rules! dispatch {
    ($args:expr, $global:expr, $module:ident) => {
        crate::output::map_cmd_result_to_json($module::run($args, $global))
    };
}

pub(crate) fn run_json(
    command: crate::Commands,
    global: &GlobalArgs,
) -> (kiln::Result<serde_json::Value>, i32) {
    crate::tty::status("kiln is working...");

    match command {
        crate::Commands::Pipeline(args) => dispatch!(args, global, pipeline),
        crate::Commands::Build(args) => dispatch!(args, global, build),
        crate::Commands::Lint(args) => dispatch!(args, global, lint),
        crate::Commands::Changes(args) => dispatch!(args, global, changes),
        crate::Commands::Tags(args) => dispatch!(args, global, tags),
    }
}
