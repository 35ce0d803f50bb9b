//! GitHub Actions workflow log output.
//!
//! Emits `::keyword::` workflow commands on stdout so the Actions runner
//! picks them up. See
//! https://docs.github.com/en/actions/reference/workflow-commands-for-github-actions

use std::io::Write;

fn emit(line: &str) {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    // The runner parses commands line-by-line; flush so interleaved child
    // process output cannot split a command across buffers.
    let _ = writeln!(handle, "{}", line);
    let _ = handle.flush();
}

pub fn error(msg: &str) {
    emit(&format!("::error::{}", msg));
}

pub fn warning(msg: &str) {
    emit(&format!("::warning::{}", msg));
}

pub fn info(msg: &str) {
    emit(msg);
}

/// Stage banner in the pipeline log, e.g. `>>>> Build Image <<<<`.
pub fn stage(name: &str) {
    emit(&format!(">>>> {} <<<<", name));
}

/// Collapsible log group. The end marker is emitted on every exit path,
/// including early returns and panics during a stage.
pub struct Group {
    _private: (),
}

impl Group {
    pub fn open(title: &str) -> Self {
        emit(&format!("::group::{}", title));
        Group { _private: () }
    }
}

impl Drop for Group {
    fn drop(&mut self) {
        emit("::endgroup::");
    }
}
