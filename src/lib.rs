//! isolate-rs: process execution and process isolation
//!
//! Runs external commands while draining their output live, and runs units
//! of test checks inside separate OS processes, relaying their outcome back
//! to the caller.
//!
//! # Modules
//!
//! - **execution**: External commands with concurrent stdout/stderr draining
//! - **isolation**: Fork or re-exec isolation with outcome replay
//! - **helpers**: Hashing, version and image tag helpers for release tooling
//!
//! # Example
//!
//! ```no_run
//! use isolate_rs::{ProcessExecutor, ProcessSpec};
//!
//! let outcome = ProcessExecutor::run(ProcessSpec::from_command_line("git status --short"))?;
//! println!("{}", outcome.stdout);
//! # Ok::<(), isolate_rs::IsolateError>(())
//! ```

pub mod errors;
pub mod execution;
pub mod helpers;
pub mod isolation;

pub use errors::{IsolateError, Result};
pub use execution::{EnvBase, ProcessExecutor, ProcessOutcome, ProcessSpec, run_process};
pub use isolation::{
    IsolatedContext, IsolatedUnit, IsolationMode, IsolationReport, OutcomeRecord,
    ResultCollector, Suite, TestResult,
};
