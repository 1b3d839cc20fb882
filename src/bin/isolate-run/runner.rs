use isolate_rs::{IsolateError, ProcessExecutor, ProcessOutcome, ProcessSpec};
use log::debug;
use std::collections::BTreeMap;

use crate::cli::Cli;

/// Turn parsed arguments into a process spec
pub fn build_spec(cli: Cli) -> Result<ProcessSpec, IsolateError> {
    let mut args = vec![cli.program];
    args.extend(cli.args);

    let mut spec = ProcessSpec::new(args)
        .verbose(!cli.quiet)
        .check(!cli.no_check);

    if cli.clear_env {
        spec = spec.env(BTreeMap::new());
    }

    for pair in &cli.env {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            IsolateError::InvalidConfig(format!("Expected KEY=VALUE, got {}", pair))
        })?;
        debug!("Setting {}", key);
        spec = spec.env_add(key, value);
    }

    if let Some(input) = cli.input {
        spec = spec.input(input);
    }

    if let Some(cwd) = cli.cwd {
        spec = spec.current_dir(cwd);
    }

    Ok(spec)
}

pub fn run(spec: ProcessSpec) -> Result<ProcessOutcome, IsolateError> {
    debug!("Running {:?}", spec);
    ProcessExecutor::run(spec)
}

/// Exit status for a finished run; signal codes above 255 are capped
pub fn exit_status(code: i32) -> i32 {
    code.clamp(0, 255)
}

/// Exit status for a strict-mode failure, never 0
pub fn failure_status(code: i32) -> i32 {
    code.clamp(1, 255)
}
